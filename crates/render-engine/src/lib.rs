//! SceneCast Render Engine
//!
//! Live scene graph and compositor. Each tick the current scene's sources
//! are pulled for frames and painted back-to-front onto a fixed-size canvas.
//!
//! # Composition
//!
//! ```text
//! SceneManager ── current LiveScene
//!                     │
//!     LiveSource ─────┤  provider frame ─┐
//!     LiveSource ─────┤  cached frame ───┼── fit ── center ── clip ──┐
//!     LiveSource ─────┘  placeholder ────┘                           │
//!                                                                    ▼
//!                                                         canvas (RgbImage)
//!                                                                    │
//!                                   Transition (cut / fade) ─────────┤
//!                                                                    ▼
//!                                                    presentation / stream
//! ```

pub mod compositor;
pub mod placeholder;
pub mod scene;
pub mod snapshot;
pub mod source;
pub mod transition;

#[cfg(test)]
mod testing;

pub use compositor::{center_offset, clip_to_canvas, fit_within, Blit, Compositor};
pub use scene::{LiveScene, SceneManager, SourceLayout};
pub use snapshot::save_snapshot;
pub use source::{DecoderFactory, FrameOrigin, LiveSource, ProviderContext, SourceProvider};
pub use transition::{blend, switch_scene, Transition};
