//! Media sources: still images and looping video files.

use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use image::RgbImage;
use scenecast_common::clock::RateController;
use scenecast_common::config::CaptureConfig;
use scenecast_common::error::{ScenecastError, ScenecastResult};

use crate::process;

/// A still image decoded from disk on every request.
#[derive(Debug, Clone)]
pub struct ImageSource {
    path: PathBuf,
}

impl ImageSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Decode the file as RGB, `None` on any failure.
    pub fn get_frame(&self) -> Option<RgbImage> {
        match image::open(&self.path) {
            Ok(img) => Some(img.to_rgb8()),
            Err(e) => {
                tracing::debug!(path = %self.path.display(), error = %e, "Image decode failed");
                None
            }
        }
    }
}

/// Random-access frame decoder.
pub trait VideoDecoder: Send {
    /// Decode frame `index`. `Ok(None)` means the index is past the last frame.
    fn decode(&mut self, index: u64) -> ScenecastResult<Option<RgbImage>>;
}

/// Opens a decoder for a file.
pub type DecoderOpener = Box<dyn Fn(&Path) -> ScenecastResult<Box<dyn VideoDecoder>> + Send>;

/// A video file played in a loop, one frame per request.
pub struct VideoSource {
    path: PathBuf,
    opener: DecoderOpener,
    decoder: Option<Box<dyn VideoDecoder>>,
    cursor: u64,
    open_retry: RateController,
}

impl VideoSource {
    /// Video source decoding through an `ffmpeg` child.
    pub fn new(path: impl Into<PathBuf>, config: &CaptureConfig) -> Self {
        let config = config.clone();
        Self::with_opener(
            path,
            Box::new(move |path: &Path| {
                FfmpegVideoDecoder::open(path, &config)
                    .map(|d| Box::new(d) as Box<dyn VideoDecoder>)
            }),
        )
    }

    /// Video source with a custom decoder factory.
    pub fn with_opener(path: impl Into<PathBuf>, opener: DecoderOpener) -> Self {
        Self {
            path: path.into(),
            opener,
            decoder: None,
            cursor: 0,
            open_retry: RateController::with_interval(Duration::from_secs(1)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Index of the next frame to decode.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Decode the frame at the cursor and advance, wrapping to the first
    /// frame past the end. A decode error leaves the cursor in place.
    pub fn next_frame(&mut self) -> Option<RgbImage> {
        if !self.ensure_decoder() {
            return None;
        }
        let decoder = self.decoder.as_mut()?;

        match decoder.decode(self.cursor) {
            Ok(Some(frame)) => {
                self.cursor += 1;
                Some(frame)
            }
            Ok(None) => {
                tracing::trace!(path = %self.path.display(), frames = self.cursor, "Video looped");
                self.cursor = 0;
                match decoder.decode(0) {
                    Ok(Some(frame)) => {
                        self.cursor = 1;
                        Some(frame)
                    }
                    Ok(None) => None,
                    Err(e) => {
                        tracing::debug!(path = %self.path.display(), error = %e, "Video decode failed");
                        None
                    }
                }
            }
            Err(e) => {
                tracing::debug!(
                    path = %self.path.display(),
                    cursor = self.cursor,
                    error = %e,
                    "Video decode failed"
                );
                None
            }
        }
    }

    /// Drop the decoder; the next request reopens from the current cursor.
    pub fn close(&mut self) {
        self.decoder = None;
    }

    /// Open the decoder if needed, at most once per retry interval.
    fn ensure_decoder(&mut self) -> bool {
        if self.decoder.is_some() {
            return true;
        }
        if !self.open_retry.should_tick(Instant::now()) {
            return false;
        }
        match (self.opener)(&self.path) {
            Ok(decoder) => {
                tracing::debug!(path = %self.path.display(), "Video decoder opened");
                self.decoder = Some(decoder);
                true
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to open video");
                false
            }
        }
    }
}

/// Sequential `ffmpeg` decoder, restarted for non-sequential requests.
pub struct FfmpegVideoDecoder {
    path: PathBuf,
    ffmpeg_bin: String,
    width: u32,
    height: u32,
    session: Option<DecodeSession>,
}

struct DecodeSession {
    child: Child,
    stdout: BufReader<ChildStdout>,
    stderr: Option<JoinHandle<String>>,
    next_index: u64,
}

impl DecodeSession {
    /// Reap the child after end of stream, surfacing a failed exit.
    fn finish(mut self) -> ScenecastResult<()> {
        let status = self
            .child
            .wait()
            .map_err(|e| ScenecastError::media(format!("Failed to wait on ffmpeg: {e}")))?;
        let stderr = self
            .stderr
            .take()
            .and_then(|h| h.join().ok())
            .unwrap_or_default();

        if status.success() {
            Ok(())
        } else {
            Err(ScenecastError::media(format!(
                "ffmpeg decode failed (status {status}): {}",
                stderr.trim()
            )))
        }
    }
}

impl Drop for DecodeSession {
    fn drop(&mut self) {
        process::terminate(&mut self.child);
    }
}

impl FfmpegVideoDecoder {
    /// Probe the file and prepare to decode it.
    pub fn open(path: &Path, config: &CaptureConfig) -> ScenecastResult<Self> {
        if !path.exists() {
            return Err(ScenecastError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let (width, height) = process::probe_video_dimensions(path, &config.ffprobe_bin)
            .ok_or_else(|| {
                ScenecastError::media(format!("Could not probe video size of {}", path.display()))
            })?;

        Ok(Self {
            path: path.to_path_buf(),
            ffmpeg_bin: config.ffmpeg_bin.clone(),
            width,
            height,
            session: None,
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn spawn_session(&self) -> ScenecastResult<DecodeSession> {
        let args = process::decode_args(&self.path);
        let mut child = Command::new(&self.ffmpeg_bin)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                ScenecastError::media(format!("Failed to start {}: {e}", self.ffmpeg_bin))
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ScenecastError::media("Failed to capture ffmpeg stdout"))?;
        let stderr = child.stderr.take().map(process::collect_stderr);

        tracing::debug!(pid = child.id(), path = %self.path.display(), "Video decode started");
        Ok(DecodeSession {
            child,
            stdout: BufReader::new(stdout),
            stderr,
            next_index: 0,
        })
    }
}

impl VideoDecoder for FfmpegVideoDecoder {
    fn decode(&mut self, index: u64) -> ScenecastResult<Option<RgbImage>> {
        let sequential = self
            .session
            .as_ref()
            .is_some_and(|s| s.next_index <= index);
        if !sequential {
            self.session = Some(self.spawn_session()?);
        }

        let (width, height) = (self.width, self.height);
        loop {
            let Some(session) = self.session.as_mut() else {
                return Ok(None);
            };
            let frame = match process::read_rgb_image(&mut session.stdout, width, height) {
                Ok(frame) => frame,
                Err(e) => {
                    self.session = None;
                    return Err(ScenecastError::media(format!("Video read failed: {e}")));
                }
            };

            let Some(frame) = frame else {
                if let Some(session) = self.session.take() {
                    let decoded = session.next_index;
                    if let Err(e) = session.finish() {
                        // Frames were delivered, so this is the end of the clip.
                        if decoded == 0 {
                            return Err(e);
                        }
                        tracing::warn!(
                            path = %self.path.display(),
                            frames = decoded,
                            error = %e,
                            "ffmpeg exited with an error at end of stream"
                        );
                    }
                }
                return Ok(None);
            };

            session.next_index += 1;
            if session.next_index > index {
                return Ok(Some(frame));
            }
        }
    }
}
