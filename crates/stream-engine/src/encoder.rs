//! Encoder subprocess: argument building, launching and raw input pipes.
//!
//! Video arrives as packed `rgb24` on stdin. Audio, when enabled, arrives as
//! interleaved `f32le` on a second pipe mapped to fd 3 in the child.

use std::collections::VecDeque;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStderr, ChildStdin, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use scenecast_common::config::{CanvasConfig, StreamConfig};
use scenecast_common::error::{ScenecastError, ScenecastResult};

/// Child fd carrying the audio input.
pub const AUDIO_INPUT_FD: i32 = 3;

/// Lines of encoder stderr kept for error reports.
const STDERR_TAIL_LINES: usize = 20;

/// Where the encoded stream goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamTarget {
    /// Live publish point; the stream key is appended as the last path
    /// segment and muxed as FLV.
    Publish { url: String, key: String },
    /// Local recording; the container follows the file extension.
    File(PathBuf),
}

impl StreamTarget {
    pub fn publish(url: impl Into<String>, key: impl Into<String>) -> Self {
        StreamTarget::Publish {
            url: url.into(),
            key: key.into(),
        }
    }

    /// Full destination handed to the encoder.
    pub fn destination(&self) -> String {
        match self {
            StreamTarget::Publish { url, key } => join_url(url, key),
            StreamTarget::File(path) => path.display().to_string(),
        }
    }

    /// Destination safe to log: the stream key is masked.
    pub fn display_destination(&self) -> String {
        match self {
            StreamTarget::Publish { url, key } if key.is_empty() => url.clone(),
            StreamTarget::Publish { url, .. } => join_url(url, "****"),
            StreamTarget::File(path) => path.display().to_string(),
        }
    }
}

impl fmt::Display for StreamTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_destination())
    }
}

fn join_url(url: &str, key: &str) -> String {
    if key.is_empty() {
        return url.to_string();
    }
    format!("{}/{}", url.trim_end_matches('/'), key)
}

/// Fixed encoder parameters for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub video_bitrate_kbps: u32,
    pub audio_bitrate_kbps: u32,
    pub preset: String,
    pub keyframe_interval: u32,
    pub audio_sample_rate: u32,
    pub audio_channels: u16,
    pub audio_enabled: bool,
}

impl EncoderSettings {
    pub fn from_config(canvas: &CanvasConfig, stream: &StreamConfig) -> Self {
        Self {
            width: canvas.width,
            height: canvas.height,
            fps: canvas.fps.max(1),
            video_bitrate_kbps: stream.video_bitrate_kbps,
            audio_bitrate_kbps: stream.audio_bitrate_kbps,
            preset: stream.preset.clone(),
            keyframe_interval: stream.keyframe_interval,
            audio_sample_rate: stream.audio_sample_rate,
            audio_channels: stream.audio_channels,
            audio_enabled: stream.audio_enabled,
        }
    }

    /// Bytes in one raw video frame.
    pub fn video_frame_bytes(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    /// Interleaved samples covering one frame interval.
    pub fn audio_samples_per_frame(&self) -> usize {
        let per_channel = (self.audio_sample_rate / self.fps.max(1)) as usize;
        per_channel * self.audio_channels as usize
    }

    /// ffmpeg arguments for `target`.
    pub fn ffmpeg_args(&self, target: &StreamTarget) -> Vec<String> {
        let mut args = vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "warning".to_string(),
            "-y".to_string(),
            "-f".to_string(),
            "rawvideo".to_string(),
            "-pix_fmt".to_string(),
            "rgb24".to_string(),
            "-s".to_string(),
            format!("{}x{}", self.width, self.height),
            "-r".to_string(),
            self.fps.to_string(),
            "-i".to_string(),
            "pipe:0".to_string(),
        ];

        if self.audio_enabled {
            args.extend([
                "-f".to_string(),
                "f32le".to_string(),
                "-ar".to_string(),
                self.audio_sample_rate.to_string(),
                "-ac".to_string(),
                self.audio_channels.to_string(),
                "-i".to_string(),
                format!("pipe:{AUDIO_INPUT_FD}"),
            ]);
        }

        let video_bitrate = format!("{}k", self.video_bitrate_kbps.max(1));
        args.extend([
            "-c:v".to_string(),
            "libx264".to_string(),
            "-preset".to_string(),
            self.preset.clone(),
            "-b:v".to_string(),
            video_bitrate.clone(),
            "-maxrate".to_string(),
            video_bitrate,
            "-bufsize".to_string(),
            format!("{}k", self.video_bitrate_kbps.max(1) * 2),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
            "-g".to_string(),
            self.keyframe_interval.max(1).to_string(),
        ]);

        if self.audio_enabled {
            args.extend([
                "-c:a".to_string(),
                "aac".to_string(),
                "-b:a".to_string(),
                format!("{}k", self.audio_bitrate_kbps.max(1)),
                "-ar".to_string(),
                self.audio_sample_rate.to_string(),
            ]);
        }

        match target {
            StreamTarget::Publish { .. } => {
                args.extend(["-f".to_string(), "flv".to_string()]);
            }
            StreamTarget::File(_) => {}
        }
        args.push(target.destination());
        args
    }
}

/// A running encoder accepting raw input.
pub trait EncoderSink: Send {
    fn write_video(&mut self, frame: &[u8]) -> ScenecastResult<()>;

    fn write_audio(&mut self, samples: &[u8]) -> ScenecastResult<()>;

    /// Error if the encoder has exited on its own.
    fn poll_exit(&mut self) -> ScenecastResult<()>;

    /// Close the inputs and wait for the encoder to flush and exit.
    fn finish(&mut self) -> ScenecastResult<()>;

    /// Handle that force-stops the encoder from another thread.
    fn abort_handle(&self) -> AbortHandle;
}

/// Starts encoder sessions.
pub trait EncoderLauncher: Send + Sync {
    fn launch(
        &self,
        settings: &EncoderSettings,
        target: &StreamTarget,
    ) -> ScenecastResult<Box<dyn EncoderSink>>;
}

/// Cloneable force-stop trigger for a running encoder.
#[derive(Clone)]
pub struct AbortHandle(Arc<dyn Fn() + Send + Sync>);

impl AbortHandle {
    pub fn new(abort: impl Fn() + Send + Sync + 'static) -> Self {
        Self(Arc::new(abort))
    }

    pub fn abort(&self) {
        (self.0)()
    }
}

impl fmt::Debug for AbortHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AbortHandle")
    }
}

/// Launches `ffmpeg` children.
#[derive(Debug, Clone)]
pub struct FfmpegLauncher {
    ffmpeg_bin: String,
}

impl FfmpegLauncher {
    pub fn new(ffmpeg_bin: impl Into<String>) -> Self {
        Self {
            ffmpeg_bin: ffmpeg_bin.into(),
        }
    }
}

impl Default for FfmpegLauncher {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl EncoderLauncher for FfmpegLauncher {
    fn launch(
        &self,
        settings: &EncoderSettings,
        target: &StreamTarget,
    ) -> ScenecastResult<Box<dyn EncoderSink>> {
        let mut settings = settings.clone();
        let audio_pipe = if settings.audio_enabled {
            match audio_pipe::create() {
                Ok(pipe) => Some(pipe),
                Err(e) => {
                    tracing::warn!(error = %e, "Audio pipe unavailable, encoding video only");
                    settings.audio_enabled = false;
                    None
                }
            }
        } else {
            None
        };

        if let StreamTarget::File(path) = target {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
        }

        let args = settings.ffmpeg_args(target);
        tracing::debug!(
            args = ?settings.ffmpeg_args(&masked(target)),
            "Launching encoder"
        );

        let mut cmd = Command::new(&self.ffmpeg_bin);
        cmd.args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let audio = match audio_pipe {
            Some(pipe) => {
                let (read_end, write_end) = pipe.split();
                audio_pipe::map_to_child(&mut cmd, &read_end);
                Some((read_end, write_end))
            }
            None => None,
        };

        let mut child = cmd.spawn().map_err(|e| {
            ScenecastError::stream(format!("Failed to start {}: {e}", self.ffmpeg_bin))
        })?;

        // The child holds its own copy of the read end now.
        let audio = audio.map(|(read_end, write_end)| {
            drop(read_end);
            write_end
        });

        let stdin = match child.stdin.take() {
            Some(stdin) => stdin,
            None => {
                terminate(&mut child);
                return Err(ScenecastError::stream("Failed to capture encoder stdin"));
            }
        };
        let stderr_tail = Arc::new(Mutex::new(VecDeque::new()));
        let stderr_reader = child
            .stderr
            .take()
            .map(|stderr| tail_stderr(stderr, Arc::clone(&stderr_tail)));

        tracing::info!(
            pid = child.id(),
            destination = %target,
            audio = audio.is_some(),
            "Encoder started"
        );

        let pid = child.id();
        let exited = Arc::new(AtomicBool::new(false));
        Ok(Box::new(FfmpegEncoder {
            child,
            stdin: Some(stdin),
            audio,
            stderr_reader,
            stderr_tail,
            pid,
            exited,
        }))
    }
}

fn masked(target: &StreamTarget) -> StreamTarget {
    match target {
        StreamTarget::Publish { url, key } if !key.is_empty() => StreamTarget::Publish {
            url: url.clone(),
            key: "****".to_string(),
        },
        other => other.clone(),
    }
}

/// Keep the last lines of a child's stderr, forwarding each to the log.
fn tail_stderr(stderr: ChildStderr, tail: Arc<Mutex<VecDeque<String>>>) -> JoinHandle<()> {
    std::thread::spawn(move || {
        for line in BufReader::new(stderr).lines().map_while(Result::ok) {
            let line = line.trim().to_string();
            if line.is_empty() {
                continue;
            }
            tracing::debug!(process = "encoder", "{line}");
            if let Ok(mut tail) = tail.lock() {
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
        }
    })
}

fn terminate(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

struct FfmpegEncoder {
    child: Child,
    stdin: Option<ChildStdin>,
    audio: Option<File>,
    stderr_reader: Option<JoinHandle<()>>,
    stderr_tail: Arc<Mutex<VecDeque<String>>>,
    pid: u32,
    exited: Arc<AtomicBool>,
}

impl FfmpegEncoder {
    fn stderr_summary(&self) -> String {
        self.stderr_tail
            .lock()
            .map(|tail| tail.iter().cloned().collect::<Vec<_>>().join(" | "))
            .unwrap_or_default()
    }

    fn mark_exited(&self) {
        self.exited.store(true, Ordering::SeqCst);
    }

    fn join_stderr(&mut self) {
        if let Some(handle) = self.stderr_reader.take() {
            let _ = handle.join();
        }
    }
}

impl EncoderSink for FfmpegEncoder {
    fn write_video(&mut self, frame: &[u8]) -> ScenecastResult<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| ScenecastError::stream("Encoder video input closed"))?;
        stdin.write_all(frame)?;
        Ok(())
    }

    fn write_audio(&mut self, samples: &[u8]) -> ScenecastResult<()> {
        match self.audio.as_mut() {
            Some(audio) => {
                audio.write_all(samples)?;
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn poll_exit(&mut self) -> ScenecastResult<()> {
        match self.child.try_wait()? {
            None => Ok(()),
            Some(status) => {
                self.mark_exited();
                self.join_stderr();
                Err(ScenecastError::stream(format!(
                    "Encoder exited (status {status}): {}",
                    self.stderr_summary()
                )))
            }
        }
    }

    fn finish(&mut self) -> ScenecastResult<()> {
        self.stdin = None;
        self.audio = None;
        let status = self
            .child
            .wait()
            .map_err(|e| ScenecastError::stream(format!("Failed to wait on encoder: {e}")))?;
        self.mark_exited();
        self.join_stderr();

        if status.success() {
            tracing::info!(pid = self.pid, "Encoder finished");
            Ok(())
        } else {
            Err(ScenecastError::stream(format!(
                "Encoder failed (status {status}): {}",
                self.stderr_summary()
            )))
        }
    }

    fn abort_handle(&self) -> AbortHandle {
        let pid = self.pid;
        let exited = Arc::clone(&self.exited);
        AbortHandle::new(move || {
            if !exited.load(Ordering::SeqCst) {
                tracing::warn!(pid, "Force-stopping encoder");
                #[cfg(unix)]
                // SAFETY: kill(2) on a pid we spawned and have not yet reaped.
                unsafe {
                    libc::kill(pid as libc::pid_t, libc::SIGKILL);
                }
            }
        })
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        self.stdin = None;
        self.audio = None;
        if !self.exited.load(Ordering::SeqCst) {
            terminate(&mut self.child);
            self.mark_exited();
        }
        self.join_stderr();
    }
}

#[cfg(unix)]
mod audio_pipe {
    use std::fs::File;
    use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
    use std::os::unix::process::CommandExt;
    use std::process::Command;

    use super::AUDIO_INPUT_FD;

    pub struct Pipe {
        read: OwnedFd,
        write: OwnedFd,
    }

    impl Pipe {
        pub fn split(self) -> (OwnedFd, File) {
            (self.read, File::from(self.write))
        }
    }

    /// Anonymous pipe with close-on-exec set on both ends.
    pub fn create() -> std::io::Result<Pipe> {
        let mut fds = [0 as libc::c_int; 2];
        // SAFETY: `fds` has room for the two descriptors pipe(2) writes.
        if unsafe { libc::pipe(fds.as_mut_ptr()) } == -1 {
            return Err(std::io::Error::last_os_error());
        }
        // SAFETY: both descriptors were just returned by pipe(2) and are
        // owned by nothing else.
        let (read, write) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };
        for fd in [&read, &write] {
            // SAFETY: fcntl on a valid descriptor we own.
            if unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_SETFD, libc::FD_CLOEXEC) } == -1 {
                return Err(std::io::Error::last_os_error());
            }
        }
        Ok(Pipe { read, write })
    }

    /// Install `read` as the child's audio input fd.
    pub fn map_to_child(cmd: &mut Command, read: &OwnedFd) {
        let fd = read.as_raw_fd();
        // SAFETY: the closure only calls async-signal-safe dup2/fcntl.
        unsafe {
            cmd.pre_exec(move || {
                if fd == AUDIO_INPUT_FD {
                    // dup2 onto itself keeps FD_CLOEXEC; clear it instead.
                    if libc::fcntl(fd, libc::F_SETFD, 0) == -1 {
                        return Err(std::io::Error::last_os_error());
                    }
                } else if libc::dup2(fd, AUDIO_INPUT_FD) == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }
    }
}

#[cfg(not(unix))]
mod audio_pipe {
    use std::fs::File;
    use std::process::Command;

    pub enum Pipe {}
    pub struct ReadEnd;

    impl Pipe {
        pub fn split(self) -> (ReadEnd, File) {
            match self {}
        }
    }

    pub fn create() -> std::io::Result<Pipe> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "extra child pipes need a Unix platform",
        ))
    }

    pub fn map_to_child(_cmd: &mut Command, _read: &ReadEnd) {}
}
