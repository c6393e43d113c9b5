//! SceneCast Stream Engine
//!
//! Hands composited canvases (and audio) from the tick thread to an encoder
//! subprocess for live publishing or local recording. The hand-off is a pair
//! of bounded drop-on-full queues, so producers never block and memory never
//! grows past the queue capacity.

pub mod encoder;
pub mod pipeline;
pub mod queue;

pub use encoder::{
    AbortHandle, EncoderLauncher, EncoderSettings, EncoderSink, FfmpegLauncher, StreamTarget,
};
pub use pipeline::{StreamPipeline, StreamState, StreamStatus};
pub use queue::DropQueue;
