//! End-to-end composition over image-backed scenes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use image::{Rgb, RgbImage};
use scenecast_capture_engine::{GrabBackend, GrabStream, GrabbedFrame, VideoDecoder};
use scenecast_common::config::{CanvasConfig, CaptureConfig};
use scenecast_common::error::{ScenecastError, ScenecastResult};
use scenecast_platform_core::{MonitorInfo, Rect, WindowInfo};
use scenecast_render_engine::{switch_scene, Compositor, ProviderContext, SceneManager, Transition};
use serde_json::json;

const CANVAS: (u32, u32) = (32, 18);

struct NoDisplay;

impl GrabBackend for NoDisplay {
    fn open(&self, _region: Option<Rect>) -> ScenecastResult<Box<dyn GrabStream>> {
        Err(ScenecastError::capture("no display in tests"))
    }

    fn list_windows(&self) -> ScenecastResult<Vec<WindowInfo>> {
        Ok(Vec::new())
    }

    fn list_displays(&self) -> ScenecastResult<Vec<MonitorInfo>> {
        Ok(Vec::new())
    }
}

/// Display whose grabs deliver a solid frame until `delivering` is cleared.
#[derive(Clone)]
struct FlakyDisplay {
    delivering: Arc<AtomicBool>,
}

const GRABBED: [u8; 3] = [0, 200, 100];

struct FlakyStream {
    delivering: Arc<AtomicBool>,
    region: Rect,
}

impl GrabBackend for FlakyDisplay {
    fn open(&self, region: Option<Rect>) -> ScenecastResult<Box<dyn GrabStream>> {
        Ok(Box::new(FlakyStream {
            delivering: Arc::clone(&self.delivering),
            region: region.unwrap_or(Rect::new(0, 0, CANVAS.0, CANVAS.1)),
        }))
    }

    fn list_windows(&self) -> ScenecastResult<Vec<WindowInfo>> {
        Ok(Vec::new())
    }

    fn list_displays(&self) -> ScenecastResult<Vec<MonitorInfo>> {
        Ok(Vec::new())
    }
}

impl GrabStream for FlakyStream {
    fn latest(&self) -> Option<GrabbedFrame> {
        if !self.delivering.load(Ordering::SeqCst) {
            return None;
        }
        Some(GrabbedFrame {
            captured_at: Instant::now(),
            image: Arc::new(RgbImage::from_pixel(
                self.region.width,
                self.region.height,
                Rgb(GRABBED),
            )),
        })
    }

    fn is_alive(&self) -> bool {
        true
    }

    fn region(&self) -> Rect {
        self.region
    }

    fn stop(&mut self) {}
}

fn context() -> ProviderContext {
    context_with(Arc::new(NoDisplay))
}

fn context_with(grab_backend: Arc<dyn GrabBackend>) -> ProviderContext {
    ProviderContext {
        grab_backend,
        capture: CaptureConfig::default(),
        decoders: Arc::new(|path: &Path| -> ScenecastResult<Box<dyn VideoDecoder>> {
            Err(ScenecastError::FileNotFound {
                path: path.to_path_buf(),
            })
        }),
    }
}

fn compositor() -> Compositor {
    Compositor::new(CanvasConfig {
        width: CANVAS.0,
        height: CANVAS.1,
        fps: 30,
        upscale: true,
    })
}

fn solid_png(name: &str, rgb: [u8; 3]) -> PathBuf {
    let path = std::env::temp_dir().join(format!("scenecast_it_{name}.png"));
    RgbImage::from_pixel(CANVAS.0, CANVAS.1, Rgb(rgb)).save(&path).unwrap();
    path
}

/// Scene with one full-canvas image source.
fn image_scene(manager: &mut SceneManager, name: &str, rgb: [u8; 3]) -> String {
    let scene = manager.create_scene(name);
    let mut props = BTreeMap::new();
    props.insert(
        "file".to_string(),
        json!(solid_png(name, rgb).to_string_lossy()),
    );
    let source = manager.add_source(&scene, "image", name, props).unwrap();
    manager
        .set_source_geometry(&scene, &source, (0, 0), CANVAS)
        .unwrap();
    scene
}

fn distance(a: &RgbImage, b: &RgbImage) -> u64 {
    a.as_raw()
        .iter()
        .zip(b.as_raw())
        .map(|(&x, &y)| x.abs_diff(y) as u64)
        .sum()
}

#[test]
fn no_current_scene_renders_black() {
    let mut manager = SceneManager::new(context());
    let frame = compositor().render_current(&mut manager);
    assert_eq!(frame.dimensions(), CANVAS);
    assert!(frame.pixels().all(|p| p.0 == [0, 0, 0]));
}

#[test]
fn unknown_scene_is_not_rendered() {
    let mut manager = SceneManager::new(context());
    assert!(compositor().render_scene(&mut manager, "scene_7").is_err());
}

#[test]
fn cut_switches_on_next_render() {
    let mut manager = SceneManager::new(context());
    let red = image_scene(&mut manager, "cut_red", [255, 0, 0]);
    let blue = image_scene(&mut manager, "cut_blue", [0, 0, 255]);
    manager.set_active_scene(&red).unwrap();

    let mut presented = 0;
    switch_scene(&mut manager, &compositor(), &blue, Transition::Cut, |_| {
        presented += 1
    })
    .unwrap();

    assert_eq!(presented, 0);
    assert_eq!(manager.current_scene_id(), Some(blue.as_str()));
    let frame = compositor().render_current(&mut manager);
    assert_eq!(frame.get_pixel(16, 9).0, [0, 0, 255]);
}

#[test]
fn fade_moves_from_outgoing_to_incoming() {
    let compositor = compositor();
    let mut manager = SceneManager::new(context());
    let a = image_scene(&mut manager, "fade_a", [250, 20, 0]);
    let b = image_scene(&mut manager, "fade_b", [0, 60, 240]);
    manager.set_active_scene(&a).unwrap();

    let render_a = compositor.render_scene(&mut manager, &a).unwrap();
    let render_b = compositor.render_scene(&mut manager, &b).unwrap();

    let mut frames = Vec::new();
    switch_scene(&mut manager, &compositor, &b, Transition::fade(), |f| {
        frames.push(f.clone())
    })
    .unwrap();

    assert_eq!(frames.len(), 10);
    let first = &frames[0];
    let last = &frames[frames.len() - 1];
    assert!(distance(first, &render_a) < distance(first, &render_b));
    assert!(distance(last, &render_b) < distance(last, &render_a));

    // Intermediate steps move monotonically toward B.
    for pair in frames.windows(2) {
        assert!(distance(&pair[1], &render_b) <= distance(&pair[0], &render_b));
    }

    assert_eq!(manager.current_scene_id(), Some(b.as_str()));
    assert_eq!(compositor.render_current(&mut manager), render_b);
    assert_eq!(last, &render_b);
}

#[test]
fn fade_without_current_scene_is_a_cut() {
    let mut manager = SceneManager::new(context());
    let b = image_scene(&mut manager, "fade_nocurrent", [10, 10, 10]);

    let mut presented = 0;
    switch_scene(&mut manager, &compositor(), &b, Transition::fade(), |_| {
        presented += 1
    })
    .unwrap();
    assert_eq!(presented, 0);
    assert_eq!(manager.current_scene_id(), Some(b.as_str()));
}

#[test]
fn switch_to_unknown_scene_keeps_current() {
    let mut manager = SceneManager::new(context());
    let a = image_scene(&mut manager, "switch_keep", [1, 2, 3]);
    manager.set_active_scene(&a).unwrap();

    let result = switch_scene(&mut manager, &compositor(), "scene_42", Transition::fade(), |_| {});
    assert!(result.is_err());
    assert_eq!(manager.current_scene_id(), Some(a.as_str()));
}

#[test]
fn capture_sources_without_display_show_placeholder() {
    let mut manager = SceneManager::new(context());
    let scene = manager.create_scene("capture");
    let source = manager
        .add_source(&scene, "screen", "desk", BTreeMap::new())
        .unwrap();
    manager
        .set_source_geometry(&scene, &source, (0, 0), CANVAS)
        .unwrap();

    let frame = compositor().render_scene(&mut manager, &scene).unwrap();
    assert_eq!(
        *frame.get_pixel(CANVAS.0 - 1, CANVAS.1 - 1),
        scenecast_render_engine::placeholder::UNAVAILABLE_BACKGROUND
    );
}

#[test]
fn stalled_capture_keeps_showing_its_last_frame() {
    let display = FlakyDisplay {
        delivering: Arc::new(AtomicBool::new(true)),
    };
    let mut manager = SceneManager::new(context_with(Arc::new(display.clone())));
    let scene = manager.create_scene("flaky");
    let source = manager
        .add_source(&scene, "screen", "desk", BTreeMap::new())
        .unwrap();
    manager
        .set_source_geometry(&scene, &source, (0, 0), CANVAS)
        .unwrap();
    manager.set_active_scene(&scene).unwrap();

    let compositor = compositor();
    let live = compositor.render_current(&mut manager);
    assert!(live.pixels().all(|p| p.0 == GRABBED));

    display.delivering.store(false, Ordering::SeqCst);
    for _ in 0..3 {
        assert_eq!(compositor.render_current(&mut manager), live);
    }
}
