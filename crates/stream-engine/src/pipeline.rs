//! Streaming pipeline: bounded hand-off queues drained by one worker thread
//! into an encoder session.
//!
//! ```text
//! tick thread                         worker thread
//! push_video_frame ──► DropQueue ──┐
//!                                   ├─► EncoderSink (video, audio)
//! push_audio_chunk ──► DropQueue ──┘         paced at canvas fps
//! ```
//!
//! Any encoder failure inside the worker ends the session and returns the
//! pipeline to idle on its own; `stop` stays safe to call afterwards.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use image::RgbImage;
use scenecast_common::clock::{FramePacer, SessionClock};
use scenecast_common::config::{CanvasConfig, StreamConfig};
use scenecast_common::error::{ScenecastError, ScenecastResult};
use serde::Serialize;

use crate::encoder::{
    AbortHandle, EncoderLauncher, EncoderSettings, EncoderSink, FfmpegLauncher, StreamTarget,
};
use crate::queue::DropQueue;

/// Pipeline lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamState {
    Idle,
    Starting,
    Streaming,
    Stopping,
}

/// Point-in-time view for status displays.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamStatus {
    pub state: StreamState,
    pub streaming: bool,
    pub video_queue_depth: usize,
    pub audio_queue_depth: usize,
    /// Destination with the stream key masked.
    pub destination: Option<String>,
    pub frames_written: u64,
    pub video_dropped: u64,
    pub audio_dropped: u64,
    pub uptime_secs: f64,
    pub last_error: Option<String>,
}

/// State shared between the caller and the worker.
struct Shared {
    state: Mutex<StreamState>,
    stop: AtomicBool,
    video: DropQueue<Vec<u8>>,
    audio: DropQueue<Vec<f32>>,
    frames_written: AtomicU64,
    destination: Mutex<Option<String>>,
    clock: Mutex<Option<SessionClock>>,
    last_error: Mutex<Option<String>>,
    abort: Mutex<Option<AbortHandle>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Shared {
    fn state(&self) -> StreamState {
        *lock(&self.state)
    }

    fn set_state(&self, state: StreamState) {
        let mut current = lock(&self.state);
        if *current != state {
            tracing::debug!(from = ?*current, to = ?state, "Stream state");
            *current = state;
        }
    }

    fn discard_queued(&self) {
        let video = self.video.clear();
        let audio = self.audio.clear();
        if video + audio > 0 {
            tracing::debug!(video, audio, "Discarded unsent stream data");
        }
    }
}

/// Non-blocking producer side of a streaming or recording session.
pub struct StreamPipeline {
    settings: EncoderSettings,
    launcher: Arc<dyn EncoderLauncher>,
    stop_grace: Duration,
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl StreamPipeline {
    /// Pipeline encoding with `ffmpeg`.
    pub fn new(canvas: &CanvasConfig, stream: &StreamConfig) -> Self {
        Self::with_launcher(
            canvas,
            stream,
            Arc::new(FfmpegLauncher::new(stream.ffmpeg_bin.clone())),
        )
    }

    pub fn with_launcher(
        canvas: &CanvasConfig,
        stream: &StreamConfig,
        launcher: Arc<dyn EncoderLauncher>,
    ) -> Self {
        Self {
            settings: EncoderSettings::from_config(canvas, stream),
            launcher,
            stop_grace: Duration::from_millis(stream.stop_grace_ms),
            shared: Arc::new(Shared {
                state: Mutex::new(StreamState::Idle),
                stop: AtomicBool::new(false),
                video: DropQueue::new(stream.queue_capacity),
                audio: DropQueue::new(stream.queue_capacity),
                frames_written: AtomicU64::new(0),
                destination: Mutex::new(None),
                clock: Mutex::new(None),
                last_error: Mutex::new(None),
                abort: Mutex::new(None),
            }),
            worker: None,
        }
    }

    pub fn settings(&self) -> &EncoderSettings {
        &self.settings
    }

    pub fn state(&self) -> StreamState {
        self.shared.state()
    }

    /// Whether a session is starting or running.
    pub fn is_active(&self) -> bool {
        matches!(
            self.state(),
            StreamState::Starting | StreamState::Streaming
        )
    }

    /// Begin a session to `target`. A no-op while one is already active.
    ///
    /// Encoder launch happens on the worker; a failed launch leaves the
    /// pipeline idle with `last_error` set.
    pub fn start(&mut self, target: StreamTarget) -> ScenecastResult<()> {
        if self.state() != StreamState::Idle {
            tracing::debug!(state = ?self.state(), "Stream already active, ignoring start");
            return Ok(());
        }
        // A worker that ended on its own still has to be reaped.
        self.join_worker();

        let shared = &self.shared;
        shared.stop.store(false, Ordering::SeqCst);
        shared.discard_queued();
        shared.video.reset_dropped();
        shared.audio.reset_dropped();
        shared.frames_written.store(0, Ordering::Relaxed);
        *lock(&shared.last_error) = None;
        *lock(&shared.clock) = None;
        *lock(&shared.destination) = Some(target.display_destination());
        shared.set_state(StreamState::Starting);

        let worker = Worker {
            settings: self.settings.clone(),
            launcher: Arc::clone(&self.launcher),
            shared: Arc::clone(&self.shared),
            target,
        };
        let handle = std::thread::Builder::new()
            .name("scenecast-stream".to_string())
            .spawn(move || worker.run());

        match handle {
            Ok(handle) => {
                self.worker = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.shared.set_state(StreamState::Idle);
                Err(ScenecastError::stream(format!(
                    "Failed to spawn stream worker: {e}"
                )))
            }
        }
    }

    /// End the session: signal the worker, give the encoder `stop_grace` to
    /// flush, then force it down. Queued data is discarded. Idempotent.
    pub fn stop(&mut self) {
        if self.worker.is_none() {
            self.shared.discard_queued();
            self.shared.set_state(StreamState::Idle);
            return;
        }

        if self.is_active() {
            self.shared.set_state(StreamState::Stopping);
        }
        self.shared.stop.store(true, Ordering::SeqCst);

        let deadline = Instant::now() + self.stop_grace;
        while self.worker.as_ref().is_some_and(|h| !h.is_finished()) {
            if Instant::now() >= deadline {
                tracing::warn!(
                    grace_ms = self.stop_grace.as_millis() as u64,
                    "Stream worker did not stop in time"
                );
                if let Some(abort) = lock(&self.shared.abort).clone() {
                    abort.abort();
                }
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }

        self.join_worker();
        self.shared.discard_queued();
        self.shared.set_state(StreamState::Idle);
        tracing::info!("Stream stopped");
    }

    /// Offer a canvas frame. Never blocks; returns `false` when the frame was
    /// dropped (queue full or wrong size).
    pub fn push_video_frame(&self, frame: RgbImage) -> bool {
        let (width, height) = frame.dimensions();
        if (width, height) != (self.settings.width, self.settings.height) {
            tracing::warn!(
                width,
                height,
                expected_width = self.settings.width,
                expected_height = self.settings.height,
                "Dropping frame with wrong size"
            );
            return false;
        }
        let accepted = self.shared.video.push(frame.into_raw());
        if !accepted {
            tracing::trace!(dropped = self.shared.video.dropped(), "Video queue full");
        }
        accepted
    }

    /// Offer interleaved `f32` samples. Never blocks; returns `false` when
    /// the chunk was dropped.
    pub fn push_audio_chunk(&self, samples: Vec<f32>) -> bool {
        let accepted = self.shared.audio.push(samples);
        if !accepted {
            tracing::trace!(dropped = self.shared.audio.dropped(), "Audio queue full");
        }
        accepted
    }

    pub fn status(&self) -> StreamStatus {
        let shared = &self.shared;
        let state = shared.state();
        StreamStatus {
            state,
            streaming: state == StreamState::Streaming,
            video_queue_depth: shared.video.len(),
            audio_queue_depth: shared.audio.len(),
            destination: lock(&shared.destination).clone(),
            frames_written: shared.frames_written.load(Ordering::Relaxed),
            video_dropped: shared.video.dropped(),
            audio_dropped: shared.audio.dropped(),
            uptime_secs: lock(&shared.clock)
                .as_ref()
                .filter(|_| state == StreamState::Streaming)
                .map(SessionClock::elapsed_secs)
                .unwrap_or(0.0),
            last_error: lock(&shared.last_error).clone(),
        }
    }

    fn join_worker(&mut self) {
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                tracing::error!("Stream worker panicked");
            }
        }
    }
}

impl Drop for StreamPipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Worker {
    settings: EncoderSettings,
    launcher: Arc<dyn EncoderLauncher>,
    shared: Arc<Shared>,
    target: StreamTarget,
}

impl Worker {
    fn run(self) {
        let shared = Arc::clone(&self.shared);

        let mut encoder = match self.launcher.launch(&self.settings, &self.target) {
            Ok(encoder) => encoder,
            Err(e) => {
                tracing::error!(destination = %self.target, error = %e, "Encoder launch failed");
                *lock(&shared.last_error) = Some(e.to_string());
                shared.discard_queued();
                shared.set_state(StreamState::Idle);
                return;
            }
        };
        *lock(&shared.abort) = Some(encoder.abort_handle());

        if shared.stop.load(Ordering::SeqCst) {
            self.shutdown(encoder.as_mut(), None);
            return;
        }
        *lock(&shared.clock) = Some(SessionClock::start());
        shared.set_state(StreamState::Streaming);
        tracing::info!(destination = %self.target, "Streaming");

        let fatal = self.pump(encoder.as_mut()).err();
        self.shutdown(encoder.as_mut(), fatal);
    }

    /// Drain at most one item per queue per tick until asked to stop.
    fn pump(&self, encoder: &mut dyn EncoderSink) -> ScenecastResult<()> {
        let shared = &self.shared;
        let mut pacer = FramePacer::new(self.settings.fps);
        let silence = silence_bytes(self.settings.audio_samples_per_frame());

        while !shared.stop.load(Ordering::SeqCst) {
            encoder.poll_exit()?;

            if let Some(frame) = shared.video.pop() {
                encoder.write_video(&frame)?;
                shared.frames_written.fetch_add(1, Ordering::Relaxed);
            }

            if self.settings.audio_enabled {
                match shared.audio.pop() {
                    Some(samples) => encoder.write_audio(&f32_le_bytes(&samples))?,
                    None => encoder.write_audio(&silence)?,
                }
            }

            pacer.wait();
        }
        Ok(())
    }

    /// Release the encoder on every exit path.
    fn shutdown(&self, encoder: &mut dyn EncoderSink, fatal: Option<ScenecastError>) {
        let shared = &self.shared;
        match fatal {
            // Writes fail once `stop` kills a hung encoder; that is the
            // requested shutdown, not a stream failure.
            Some(e) if shared.stop.load(Ordering::SeqCst) => {
                tracing::debug!(error = %e, "Encoder error during requested stop");
                encoder.abort_handle().abort();
                let _ = encoder.finish();
            }
            Some(e) => {
                let message = if e.is_broken_pipe() {
                    "Encoder closed its input".to_string()
                } else {
                    e.to_string()
                };
                tracing::error!(destination = %self.target, error = %message, "Stream failed");
                *lock(&shared.last_error) = Some(message);
                encoder.abort_handle().abort();
                let _ = encoder.finish();
            }
            None => {
                if let Err(e) = encoder.finish() {
                    tracing::warn!(error = %e, "Encoder did not exit cleanly");
                }
            }
        }

        *lock(&shared.abort) = None;
        shared.discard_queued();
        shared.set_state(StreamState::Idle);
        tracing::info!(
            frames = shared.frames_written.load(Ordering::Relaxed),
            video_dropped = shared.video.dropped(),
            "Stream session ended"
        );
    }
}

fn f32_le_bytes(samples: &[f32]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

fn silence_bytes(samples: usize) -> Vec<u8> {
    vec![0u8; samples * std::mem::size_of::<f32>()]
}
