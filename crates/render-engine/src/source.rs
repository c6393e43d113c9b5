//! Live sources: a persisted definition bound to its frame provider and
//! last-good-frame cache.

use std::borrow::Cow;
use std::path::Path;
use std::sync::Arc;

use image::RgbImage;
use scenecast_capture_engine::{
    CaptureMode, CaptureSource, FfmpegVideoDecoder, GrabBackend, GrabStream, ImageSource,
    VideoDecoder, VideoSource, X11GrabBackend,
};
use scenecast_common::config::{AppConfig, CaptureConfig};
use scenecast_common::error::{ScenecastError, ScenecastResult};
use scenecast_platform_core::{MonitorInfo, Rect, WindowInfo};
use scenecast_scene_model::{SourceDef, SourceKind, PROP_DISPLAY};

use crate::placeholder;

/// Factory for video decoders.
pub type DecoderFactory = Arc<dyn Fn(&Path) -> ScenecastResult<Box<dyn VideoDecoder>> + Send + Sync>;

/// Everything needed to turn a [`SourceDef`] into a live provider.
#[derive(Clone)]
pub struct ProviderContext {
    pub grab_backend: Arc<dyn GrabBackend>,
    pub capture: CaptureConfig,
    pub decoders: DecoderFactory,
}

impl ProviderContext {
    /// X11 grabbing and ffmpeg decoding.
    pub fn from_config(config: &AppConfig) -> Self {
        let capture = config.capture.clone();
        Self {
            grab_backend: Arc::new(X11GrabBackend::new(&config.capture)),
            capture: config.capture.clone(),
            decoders: Arc::new(move |path: &Path| {
                FfmpegVideoDecoder::open(path, &capture)
                    .map(|d| Box::new(d) as Box<dyn VideoDecoder>)
            }),
        }
    }

    /// Context that never grabs or decodes, for editing a scene graph
    /// without touching the display. Every capture and video source renders
    /// its placeholder.
    pub fn offline(capture: &CaptureConfig) -> Self {
        Self {
            grab_backend: Arc::new(OfflineBackend),
            capture: capture.clone(),
            decoders: Arc::new(|path: &Path| -> ScenecastResult<Box<dyn VideoDecoder>> {
                Err(ScenecastError::unsupported(format!(
                    "video decoding is disabled ({})",
                    path.display()
                )))
            }),
        }
    }

    /// Capture mode for a screen source: explicit region, then display
    /// index, then the whole desktop.
    fn screen_mode(&self, def: &SourceDef) -> CaptureMode {
        if let Some(region) = def.region() {
            return CaptureMode::Region(region);
        }

        let Some(index) = def.properties.get(PROP_DISPLAY).and_then(|v| v.as_u64()) else {
            return CaptureMode::FullScreen;
        };
        match self.grab_backend.list_displays() {
            Ok(displays) if displays.len() > 1 => displays
                .iter()
                .find(|d| d.id as u64 == index)
                .map(|d| CaptureMode::Region(d.rect()))
                .unwrap_or(CaptureMode::FullScreen),
            _ => CaptureMode::FullScreen,
        }
    }
}

struct OfflineBackend;

impl GrabBackend for OfflineBackend {
    fn open(&self, _region: Option<Rect>) -> ScenecastResult<Box<dyn GrabStream>> {
        Err(ScenecastError::unsupported("capture is disabled"))
    }

    fn list_windows(&self) -> ScenecastResult<Vec<WindowInfo>> {
        Ok(Vec::new())
    }

    fn list_displays(&self) -> ScenecastResult<Vec<MonitorInfo>> {
        Ok(Vec::new())
    }
}

/// Kind-specific frame producer.
pub enum SourceProvider {
    Screen(CaptureSource),
    Window(CaptureSource),
    Image(ImageSource),
    Video(VideoSource),
    Browser { url: String },
    Camera,
}

impl SourceProvider {
    /// Build the provider for a definition. Capture providers are armed
    /// but grab nothing until their first frame request.
    pub fn build(def: &SourceDef, ctx: &ProviderContext) -> Self {
        match def.kind {
            SourceKind::Screen => {
                let mut capture = CaptureSource::new(Arc::clone(&ctx.grab_backend), &ctx.capture);
                capture.start_capture(ctx.screen_mode(def));
                SourceProvider::Screen(capture)
            }
            SourceKind::Window => {
                let mut capture = CaptureSource::new(Arc::clone(&ctx.grab_backend), &ctx.capture);
                match def.window_title() {
                    Some(title) => capture.start_capture(CaptureMode::Window {
                        title: title.to_string(),
                    }),
                    None => tracing::warn!(source_id = %def.id, "Window source has no window_title"),
                }
                SourceProvider::Window(capture)
            }
            SourceKind::Image => {
                let file = def.file().unwrap_or_default();
                if file.is_empty() {
                    tracing::warn!(source_id = %def.id, "Image source has no file");
                }
                SourceProvider::Image(ImageSource::new(file))
            }
            SourceKind::Video => {
                let file = def.file().unwrap_or_default();
                if file.is_empty() {
                    tracing::warn!(source_id = %def.id, "Video source has no file");
                }
                let decoders = Arc::clone(&ctx.decoders);
                SourceProvider::Video(VideoSource::with_opener(
                    file,
                    Box::new(move |path: &Path| decoders(path)),
                ))
            }
            SourceKind::Browser => SourceProvider::Browser {
                url: def.url().unwrap_or("browser").to_string(),
            },
            SourceKind::Camera => SourceProvider::Camera,
        }
    }

    /// Fresh frame, if the provider has one. `dest` is the destination box,
    /// used by synthesized frames.
    pub fn produce_frame(&mut self, dest: (u32, u32)) -> Option<RgbImage> {
        match self {
            SourceProvider::Screen(capture) | SourceProvider::Window(capture) => {
                capture.get_frame()
            }
            SourceProvider::Image(image) => image.get_frame(),
            SourceProvider::Video(video) => video.next_frame(),
            SourceProvider::Browser { url } => Some(placeholder::browser(dest, url)),
            SourceProvider::Camera => None,
        }
    }

    /// Drop running grabs and decoders while the source is off screen.
    /// The next frame request brings them back.
    pub fn suspend(&mut self) {
        match self {
            SourceProvider::Screen(capture) | SourceProvider::Window(capture) => {
                capture.suspend()
            }
            SourceProvider::Video(video) => video.close(),
            SourceProvider::Image(_) | SourceProvider::Browser { .. } | SourceProvider::Camera => {}
        }
    }

    /// Stop capture and close decoders.
    pub fn release(&mut self) {
        match self {
            SourceProvider::Screen(capture) | SourceProvider::Window(capture) => {
                capture.stop_capture()
            }
            SourceProvider::Video(video) => video.close(),
            SourceProvider::Image(_) | SourceProvider::Browser { .. } | SourceProvider::Camera => {}
        }
    }
}

/// Where a composited frame came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOrigin {
    Fresh,
    Cached,
    Placeholder,
}

/// A source in a live scene.
pub struct LiveSource {
    def: SourceDef,
    provider: SourceProvider,
    last_good_frame: Option<RgbImage>,
}

impl LiveSource {
    pub fn new(def: SourceDef, ctx: &ProviderContext) -> Self {
        let provider = SourceProvider::build(&def, ctx);
        Self::with_provider(def, provider)
    }

    pub fn with_provider(def: SourceDef, provider: SourceProvider) -> Self {
        Self {
            def,
            provider,
            last_good_frame: None,
        }
    }

    pub fn def(&self) -> &SourceDef {
        &self.def
    }

    pub(crate) fn def_mut(&mut self) -> &mut SourceDef {
        &mut self.def
    }

    pub fn id(&self) -> &str {
        &self.def.id
    }

    pub fn is_visible(&self) -> bool {
        self.def.visible
    }

    pub fn last_good_frame(&self) -> Option<&RgbImage> {
        self.last_good_frame.as_ref()
    }

    /// Frame to composite: fresh, else cached, else a placeholder sized to
    /// the destination box. A fresh frame replaces the cache.
    pub fn resolve_frame(&mut self) -> (FrameOrigin, Cow<'_, RgbImage>) {
        let origin = match self.provider.produce_frame(self.def.size) {
            Some(frame) => {
                self.last_good_frame = Some(frame);
                FrameOrigin::Fresh
            }
            None => FrameOrigin::Cached,
        };

        match &self.last_good_frame {
            Some(frame) => (origin, Cow::Borrowed(frame)),
            None => {
                tracing::trace!(source_id = %self.def.id, "No frame, drawing placeholder");
                (
                    FrameOrigin::Placeholder,
                    Cow::Owned(placeholder::unavailable(self.def.size, &self.def.name)),
                )
            }
        }
    }

    /// Stop background work for an off-screen source. The cache is kept.
    pub fn suspend(&mut self) {
        self.provider.suspend();
    }

    pub fn release(&mut self) {
        self.provider.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn def(kind: SourceKind) -> SourceDef {
        let mut def = SourceDef::new(format!("{kind}_test"), "test", kind, BTreeMap::new());
        def.size = (40, 30);
        def
    }

    #[test]
    fn camera_falls_back_to_placeholder() {
        let mut source = LiveSource::with_provider(def(SourceKind::Camera), SourceProvider::Camera);
        let (origin, frame) = source.resolve_frame();
        assert_eq!(origin, FrameOrigin::Placeholder);
        assert_eq!(frame.dimensions(), (40, 30));
        assert!(source.last_good_frame().is_none());
    }

    #[test]
    fn browser_frame_matches_destination_box() {
        let mut source = LiveSource::with_provider(
            def(SourceKind::Browser),
            SourceProvider::Browser {
                url: "https://example.org".to_string(),
            },
        );
        let (origin, frame) = source.resolve_frame();
        assert_eq!(origin, FrameOrigin::Fresh);
        assert_eq!(frame.dimensions(), (40, 30));
    }

    #[test]
    fn offline_capture_renders_placeholder() {
        let ctx = ProviderContext::offline(&CaptureConfig::default());
        let mut screen = LiveSource::new(def(SourceKind::Screen), &ctx);
        let mut video = LiveSource::new(def(SourceKind::Video), &ctx);
        assert_eq!(screen.resolve_frame().0, FrameOrigin::Placeholder);
        assert_eq!(video.resolve_frame().0, FrameOrigin::Placeholder);
    }

    #[test]
    fn failed_image_reuses_cached_frame() {
        let path = std::env::temp_dir().join("scenecast_test_live_source.png");
        RgbImage::from_pixel(8, 8, image::Rgb([0, 200, 0]))
            .save(&path)
            .unwrap();

        let mut source = LiveSource::with_provider(
            def(SourceKind::Image),
            SourceProvider::Image(ImageSource::new(&path)),
        );
        assert_eq!(source.resolve_frame().0, FrameOrigin::Fresh);

        std::fs::remove_file(&path).unwrap();
        let (origin, frame) = source.resolve_frame();
        assert_eq!(origin, FrameOrigin::Cached);
        assert_eq!(frame.get_pixel(0, 0).0, [0, 200, 0]);
    }
}
