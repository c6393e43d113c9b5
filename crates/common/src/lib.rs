//! SceneCast Common Utilities
//!
//! Shared infrastructure for all SceneCast crates:
//! - Error types and result aliases
//! - Clock and pacing utilities for the tick loop and stream worker
//! - Tracing/logging initialization
//! - Configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
