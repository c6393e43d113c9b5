//! Display-free provider context for unit tests.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use image::{Rgb, RgbImage};
use scenecast_capture_engine::{GrabBackend, GrabStream, GrabbedFrame, VideoDecoder};
use scenecast_common::config::CaptureConfig;
use scenecast_common::error::{ScenecastError, ScenecastResult};
use scenecast_platform_core::{MonitorInfo, Rect, WindowInfo};

use crate::source::ProviderContext;

#[derive(Default)]
struct Counters {
    opened: AtomicUsize,
    running: AtomicUsize,
}

/// Grab backend producing solid frames and counting live streams.
#[derive(Clone, Default)]
pub(crate) struct FakeGrab {
    counters: Arc<Counters>,
}

impl FakeGrab {
    pub(crate) fn opened(&self) -> usize {
        self.counters.opened.load(Ordering::SeqCst)
    }

    pub(crate) fn running(&self) -> usize {
        self.counters.running.load(Ordering::SeqCst)
    }
}

struct FakeStream {
    counters: Arc<Counters>,
    region: Rect,
    stopped: AtomicBool,
}

impl GrabBackend for FakeGrab {
    fn open(&self, region: Option<Rect>) -> ScenecastResult<Box<dyn GrabStream>> {
        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        self.counters.running.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeStream {
            counters: Arc::clone(&self.counters),
            region: region.unwrap_or(Rect::new(0, 0, 32, 18)),
            stopped: AtomicBool::new(false),
        }))
    }

    fn list_windows(&self) -> ScenecastResult<Vec<WindowInfo>> {
        Ok(Vec::new())
    }

    fn list_displays(&self) -> ScenecastResult<Vec<MonitorInfo>> {
        Ok(Vec::new())
    }
}

impl GrabStream for FakeStream {
    fn latest(&self) -> Option<GrabbedFrame> {
        Some(GrabbedFrame {
            captured_at: Instant::now(),
            image: Arc::new(RgbImage::from_pixel(
                self.region.width,
                self.region.height,
                Rgb([0, 128, 255]),
            )),
        })
    }

    fn is_alive(&self) -> bool {
        !self.stopped.load(Ordering::SeqCst)
    }

    fn region(&self) -> Rect {
        self.region
    }

    fn stop(&mut self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            self.counters.running.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

/// Context over `grab` whose video decoders never open.
pub(crate) fn fake_context(grab: &FakeGrab) -> ProviderContext {
    ProviderContext {
        grab_backend: Arc::new(grab.clone()),
        capture: CaptureConfig {
            window_refresh_ms: 0,
            ..CaptureConfig::default()
        },
        decoders: Arc::new(|path: &Path| -> ScenecastResult<Box<dyn VideoDecoder>> {
            Err(ScenecastError::FileNotFound {
                path: path.to_path_buf(),
            })
        }),
    }
}
