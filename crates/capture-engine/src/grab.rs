//! Continuous screen grabbing backends.
//!
//! A grab stream samples one rectangle of the desktop in the background and
//! keeps only the most recent frame. Capture sources read that frame on
//! demand, so the compositor tick never waits on the display server.

use std::io::BufReader;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Instant;

use image::RgbImage;
use scenecast_common::config::CaptureConfig;
use scenecast_common::error::{ScenecastError, ScenecastResult};
use scenecast_platform_core::{virtual_desktop_bounds, MonitorInfo, Rect, WindowInfo};

use crate::process;

/// One grabbed frame and when it arrived.
#[derive(Debug, Clone)]
pub struct GrabbedFrame {
    pub captured_at: Instant,
    pub image: Arc<RgbImage>,
}

/// Platform capture capabilities.
pub trait GrabBackend: Send + Sync {
    /// Start sampling `region`, or the whole desktop when `None`.
    fn open(&self, region: Option<Rect>) -> ScenecastResult<Box<dyn GrabStream>>;

    /// Capturable windows in stacking order, bottom first.
    fn list_windows(&self) -> ScenecastResult<Vec<WindowInfo>>;

    /// Connected displays.
    fn list_displays(&self) -> ScenecastResult<Vec<MonitorInfo>>;
}

/// A running background grab.
pub trait GrabStream: Send {
    /// Most recent frame, if any has arrived.
    fn latest(&self) -> Option<GrabbedFrame>;

    /// False once the stream can no longer deliver frames, e.g. its grab
    /// process exited.
    fn is_alive(&self) -> bool;

    /// The rectangle being sampled.
    fn region(&self) -> Rect;

    /// Stop sampling and release the grab. Idempotent.
    fn stop(&mut self);
}

/// X11 backend driving one `ffmpeg -f x11grab` child per stream.
#[derive(Debug, Clone)]
pub struct X11GrabBackend {
    display: String,
    fps: u32,
    ffmpeg_bin: String,
}

impl X11GrabBackend {
    pub fn new(config: &CaptureConfig) -> Self {
        Self {
            display: scenecast_platform_linux::x11_display_name(),
            fps: config.fps,
            ffmpeg_bin: config.ffmpeg_bin.clone(),
        }
    }

    fn desktop_bounds(&self) -> Rect {
        match scenecast_platform_linux::detect_monitors() {
            Ok(monitors) => virtual_desktop_bounds(&monitors),
            Err(e) => {
                tracing::warn!(error = %e, "Monitor detection failed, assuming default desktop size");
                virtual_desktop_bounds(&[])
            }
        }
    }
}

impl GrabBackend for X11GrabBackend {
    fn open(&self, region: Option<Rect>) -> ScenecastResult<Box<dyn GrabStream>> {
        let desktop = self.desktop_bounds();
        let region = match region {
            Some(requested) => requested.intersect(&desktop).ok_or_else(|| {
                ScenecastError::capture(format!(
                    "Region {requested:?} lies outside the desktop {desktop:?}"
                ))
            })?,
            None => desktop,
        };

        let stream = X11GrabStream::spawn(&self.ffmpeg_bin, &self.display, region, self.fps)?;
        Ok(Box::new(stream))
    }

    fn list_windows(&self) -> ScenecastResult<Vec<WindowInfo>> {
        scenecast_platform_linux::list_windows()
    }

    fn list_displays(&self) -> ScenecastResult<Vec<MonitorInfo>> {
        scenecast_platform_linux::detect_monitors()
    }
}

type LatestSlot = Arc<Mutex<Option<GrabbedFrame>>>;

/// A background `x11grab` child and the thread reading its frames.
pub struct X11GrabStream {
    region: Rect,
    child: Option<Child>,
    reader: Option<JoinHandle<()>>,
    stop_flag: Arc<AtomicBool>,
    latest: LatestSlot,
}

impl X11GrabStream {
    fn spawn(ffmpeg_bin: &str, display: &str, region: Rect, fps: u32) -> ScenecastResult<Self> {
        let args = process::x11grab_args(display, region, fps);
        tracing::debug!(?args, "Starting x11grab");

        let mut child = Command::new(ffmpeg_bin)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ScenecastError::capture(format!("Failed to start {ffmpeg_bin}: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ScenecastError::capture("Failed to capture x11grab stdout"))?;
        if let Some(stderr) = child.stderr.take() {
            process::log_stderr(stderr, "x11grab");
        }

        tracing::info!(
            pid = child.id(),
            x = region.x,
            y = region.y,
            width = region.width,
            height = region.height,
            "x11grab started"
        );

        let stop_flag = Arc::new(AtomicBool::new(false));
        let latest: LatestSlot = Arc::new(Mutex::new(None));

        let spawned = {
            let stop_flag = Arc::clone(&stop_flag);
            let latest = Arc::clone(&latest);
            std::thread::Builder::new()
                .name("scenecast-x11grab".to_string())
                .spawn(move || {
                    let mut stdout = BufReader::new(stdout);
                    while !stop_flag.load(Ordering::Relaxed) {
                        match process::read_rgb_image(&mut stdout, region.width, region.height) {
                            Ok(Some(image)) => {
                                if let Ok(mut slot) = latest.lock() {
                                    *slot = Some(GrabbedFrame {
                                        captured_at: Instant::now(),
                                        image: Arc::new(image),
                                    });
                                }
                            }
                            Ok(None) => break,
                            Err(e) => {
                                tracing::debug!(error = %e, "x11grab stream ended mid-frame");
                                break;
                            }
                        }
                    }
                })
        };
        let reader = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                process::terminate(&mut child);
                return Err(e.into());
            }
        };

        Ok(Self {
            region,
            child: Some(child),
            reader: Some(reader),
            stop_flag,
            latest,
        })
    }
}

impl GrabStream for X11GrabStream {
    fn latest(&self) -> Option<GrabbedFrame> {
        self.latest.lock().ok().and_then(|slot| slot.clone())
    }

    fn is_alive(&self) -> bool {
        self.reader.as_ref().is_some_and(|reader| !reader.is_finished())
    }

    fn region(&self) -> Rect {
        self.region
    }

    fn stop(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Some(mut child) = self.child.take() {
            process::terminate(&mut child);
            tracing::debug!(region = ?self.region, "x11grab stopped");
        }
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
    }
}

impl Drop for X11GrabStream {
    fn drop(&mut self) {
        self.stop();
    }
}
