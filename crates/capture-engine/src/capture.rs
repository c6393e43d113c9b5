//! Capture sources: full screen, a fixed region, or a window by title.
//!
//! Every acquisition failure degrades to "no frame". Callers apply their own
//! fallback (cached frame, then placeholder).

use std::sync::Arc;
use std::time::{Duration, Instant};

use image::RgbImage;
use scenecast_common::clock::RateController;
use scenecast_common::config::CaptureConfig;
use scenecast_platform_core::{find_window_by_title, MonitorInfo, Rect};

use crate::grab::{GrabBackend, GrabStream, X11GrabBackend};

/// What a capture source samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureMode {
    /// The whole virtual desktop.
    FullScreen,
    /// A fixed desktop rectangle.
    Region(Rect),
    /// The topmost window whose title contains the given text.
    Window { title: String },
}

/// A capture source bound to one backend.
pub struct CaptureSource {
    backend: Arc<dyn GrabBackend>,
    mode: Option<CaptureMode>,
    stream: Option<Box<dyn GrabStream>>,
    /// Rectangle the open stream was requested for (before clamping).
    requested: Option<Rect>,
    opened_at: Option<Instant>,
    stale_after: Duration,
    stall_after: Duration,
    refresh: RateController,
}

impl CaptureSource {
    pub fn new(backend: Arc<dyn GrabBackend>, config: &CaptureConfig) -> Self {
        Self {
            backend,
            mode: None,
            stream: None,
            requested: None,
            opened_at: None,
            stale_after: Duration::from_millis(config.stale_frame_ms),
            stall_after: Duration::from_millis(config.stall_timeout_ms),
            refresh: RateController::with_interval(Duration::from_millis(
                config.window_refresh_ms,
            )),
        }
    }

    /// Capture source on the default X11 backend.
    pub fn x11(config: &CaptureConfig) -> Self {
        Self::new(Arc::new(X11GrabBackend::new(config)), config)
    }

    /// Begin sampling. Any previous capture is stopped first.
    ///
    /// The grab itself opens on the first [`get_frame`](Self::get_frame),
    /// so a source that is never pulled never runs a grab.
    pub fn start_capture(&mut self, mode: CaptureMode) {
        self.stop_capture();
        tracing::debug!(?mode, "Starting capture");
        self.mode = Some(mode);
    }

    /// Release the grab but keep the mode. The next
    /// [`get_frame`](Self::get_frame) opens it again.
    pub fn suspend(&mut self) {
        if self.stream.is_some() {
            tracing::debug!(mode = ?self.mode, "Suspending capture");
        }
        self.close_stream();
        self.refresh.reset();
    }

    /// Whether a grab is currently open.
    pub fn is_streaming(&self) -> bool {
        self.stream.is_some()
    }

    /// Stop sampling and release the grab.
    pub fn stop_capture(&mut self) {
        self.close_stream();
        self.mode = None;
        self.refresh.reset();
    }

    pub fn is_capturing(&self) -> bool {
        self.mode.is_some()
    }

    pub fn mode(&self) -> Option<&CaptureMode> {
        self.mode.as_ref()
    }

    /// Latest fresh frame, or `None` when nothing usable is available.
    pub fn get_frame(&mut self) -> Option<RgbImage> {
        self.mode.as_ref()?;

        let now = Instant::now();
        self.refresh_stream(now);

        let frame = self.stream.as_ref()?.latest()?;
        if now.saturating_duration_since(frame.captured_at) > self.stale_after {
            return None;
        }
        Some(frame.image.as_ref().clone())
    }

    /// Titles of capturable windows.
    pub fn get_available_windows(&self) -> Vec<String> {
        match self.backend.list_windows() {
            Ok(windows) => windows
                .into_iter()
                .filter(|w| !w.title.trim().is_empty())
                .map(|w| w.title)
                .collect(),
            Err(e) => {
                tracing::warn!(error = %e, "Window enumeration failed");
                Vec::new()
            }
        }
    }

    /// Connected displays.
    pub fn get_available_displays(&self) -> Vec<MonitorInfo> {
        self.backend.list_displays().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Display enumeration failed");
            Vec::new()
        })
    }

    /// Open, reopen or drop the grab stream to follow the current mode.
    fn refresh_stream(&mut self, now: Instant) {
        let Some(mode) = self.mode.clone() else {
            return;
        };
        let stalled = self.stream_stalled(now);
        let fixed = !matches!(mode, CaptureMode::Window { .. });
        if fixed && self.stream.is_some() && !stalled {
            return;
        }
        if !self.refresh.should_tick(now) {
            return;
        }
        if stalled {
            tracing::warn!(?mode, "Grab stream stalled, reopening");
            self.close_stream();
        }

        let target = match mode {
            CaptureMode::FullScreen => None,
            CaptureMode::Region(rect) => Some(rect),
            CaptureMode::Window { title } => match self.resolve_window(&title) {
                Some(rect) => Some(rect),
                None => {
                    self.close_stream();
                    return;
                }
            },
        };

        if self.stream.is_some() && target.is_some() && self.requested == target {
            return;
        }

        self.close_stream();
        match self.backend.open(target) {
            Ok(stream) => {
                tracing::debug!(region = ?stream.region(), "Grab opened");
                self.stream = Some(stream);
                self.requested = target;
                self.opened_at = Some(now);
            }
            Err(e) => tracing::debug!(error = %e, "Grab open failed"),
        }
    }

    /// True when the open stream died or has delivered nothing for longer
    /// than the stall timeout, counting from when it was opened.
    fn stream_stalled(&self, now: Instant) -> bool {
        let Some(stream) = self.stream.as_ref() else {
            return false;
        };
        if !stream.is_alive() {
            return true;
        }
        let last_activity = match (stream.latest(), self.opened_at) {
            (Some(frame), Some(opened)) => frame.captured_at.max(opened),
            (Some(frame), None) => frame.captured_at,
            (None, Some(opened)) => opened,
            (None, None) => return false,
        };
        now.saturating_duration_since(last_activity) > self.stall_after
    }

    fn resolve_window(&self, title: &str) -> Option<Rect> {
        let windows = match self.backend.list_windows() {
            Ok(windows) => windows,
            Err(e) => {
                tracing::debug!(error = %e, "Window lookup failed");
                return None;
            }
        };
        let window = find_window_by_title(&windows, title)?;
        if window.bounds.is_empty() {
            tracing::debug!(title, "Window has zero-area bounds");
            return None;
        }
        Some(window.bounds)
    }

    fn close_stream(&mut self) {
        self.requested = None;
        self.opened_at = None;
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
        }
    }
}

impl Drop for CaptureSource {
    fn drop(&mut self) {
        self.close_stream();
    }
}
