//! SceneCast Scene Model
//!
//! Defines the data contracts shared by the compositor and the CLI:
//! - **Sources:** kind, free-form properties, visibility and placement
//! - **Scenes:** ordered source lists (list order is back-to-front z-order)
//! - **Document:** the persisted scene collection and current-scene pointer
//!
//! Positions and sizes are in canvas pixels.

pub mod document;
pub mod scene;
pub mod source;

pub use document::*;
pub use scene::*;
pub use source::*;
