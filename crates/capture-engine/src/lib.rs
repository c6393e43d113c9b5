//! SceneCast Capture Engine
//!
//! Pull-based frame providers for the compositor. Each provider returns at
//! most one frame per request and degrades to `None` on any failure.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │ CaptureSource (screen / region / window)          │
//! │   └── GrabBackend ──► GrabStream (bg thread)      │
//! │                         └── ffmpeg -f x11grab     │
//! ├──────────────────────────────────────────────────┤
//! │ ImageSource  ──► image::open                      │
//! │ VideoSource  ──► VideoDecoder ──► ffmpeg rawvideo │
//! └──────────────────────────────────────────────────┘
//! ```

pub mod capture;
pub mod grab;
pub mod media;
pub mod process;

pub use capture::*;
pub use grab::{GrabBackend, GrabStream, GrabbedFrame, X11GrabBackend};
pub use media::*;
