//! Frame compositor: paints a scene's sources onto the output canvas.
//!
//! Sources are drawn back-to-front. Each frame is scaled to fit its
//! destination box with the aspect ratio preserved, centered inside the box
//! and clipped at the canvas edges.

use std::borrow::Cow;

use image::imageops::{self, FilterType};
use image::RgbImage;
use scenecast_common::config::CanvasConfig;
use scenecast_common::error::{ScenecastError, ScenecastResult};

use crate::scene::{LiveScene, SceneManager};
use crate::source::FrameOrigin;

/// Size of `src` scaled to fit inside `dest` with its aspect ratio kept.
///
/// Without `upscale`, frames that already fit keep their size. Degenerate
/// inputs yield `(0, 0)`.
pub fn fit_within(src: (u32, u32), dest: (u32, u32), upscale: bool) -> (u32, u32) {
    let (sw, sh) = (src.0 as u64, src.1 as u64);
    let (dw, dh) = (dest.0 as u64, dest.1 as u64);
    if sw == 0 || sh == 0 || dw == 0 || dh == 0 {
        return (0, 0);
    }
    if !upscale && sw <= dw && sh <= dh {
        return src;
    }

    // Compare dw/sw against dh/sh without floats.
    if dw * sh <= dh * sw {
        let height = (sh * dw / sw).clamp(1, dh);
        (dw as u32, height as u32)
    } else {
        let width = (sw * dh / sh).clamp(1, dw);
        (width as u32, dh as u32)
    }
}

/// Offset that centers `inner` inside `outer`.
pub fn center_offset(inner: (u32, u32), outer: (u32, u32)) -> (u32, u32) {
    (
        outer.0.saturating_sub(inner.0) / 2,
        outer.1.saturating_sub(inner.1) / 2,
    )
}

/// In-bounds part of a blit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Blit {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Clip a `size` write at `origin` to the canvas. `None` when nothing of it
/// lands on the canvas.
pub fn clip_to_canvas(origin: (u32, u32), size: (u32, u32), canvas: (u32, u32)) -> Option<Blit> {
    if origin.0 >= canvas.0 || origin.1 >= canvas.1 {
        return None;
    }
    let width = size.0.min(canvas.0 - origin.0);
    let height = size.1.min(canvas.1 - origin.1);
    if width == 0 || height == 0 {
        return None;
    }
    Some(Blit {
        x: origin.0,
        y: origin.1,
        width,
        height,
    })
}

/// Copy the top-left `blit.width x blit.height` of `frame` into `canvas`.
fn copy_rows(canvas: &mut RgbImage, frame: &RgbImage, blit: Blit) {
    let canvas_stride = canvas.width() as usize * 3;
    let frame_stride = frame.width() as usize * 3;
    let row_bytes = blit.width as usize * 3;
    let x_bytes = blit.x as usize * 3;

    let src: &[u8] = frame;
    let dst: &mut [u8] = canvas;
    for row in 0..blit.height as usize {
        let s = row * frame_stride;
        let d = (blit.y as usize + row) * canvas_stride + x_bytes;
        dst[d..d + row_bytes].copy_from_slice(&src[s..s + row_bytes]);
    }
}

/// Scale the part of `frame` that stays visible once the whole frame is
/// scaled to `fitted` and clipped to `blit`. Output is `blit`-sized, so an
/// oversized box never allocates past the canvas.
fn scale_visible(frame: &RgbImage, fitted: (u32, u32), blit: Blit) -> RgbImage {
    if (blit.width, blit.height) == fitted {
        return imageops::resize(frame, fitted.0, fitted.1, FilterType::Triangle);
    }
    let (sw, sh) = frame.dimensions();
    let visible_src = |shown: u32, full: u32, src: u32| -> u32 {
        (shown as u64 * src as u64)
            .div_ceil(full as u64)
            .clamp(1, src as u64) as u32
    };
    let crop_w = visible_src(blit.width, fitted.0, sw);
    let crop_h = visible_src(blit.height, fitted.1, sh);
    let visible = imageops::crop_imm(frame, 0, 0, crop_w, crop_h).to_image();
    imageops::resize(&visible, blit.width, blit.height, FilterType::Triangle)
}

/// Renders scenes at a fixed output resolution.
#[derive(Debug, Clone)]
pub struct Compositor {
    canvas: CanvasConfig,
}

impl Compositor {
    pub fn new(canvas: CanvasConfig) -> Self {
        Self { canvas }
    }

    pub fn canvas(&self) -> &CanvasConfig {
        &self.canvas
    }

    /// All-black canvas.
    pub fn blank(&self) -> RgbImage {
        RgbImage::new(self.canvas.width, self.canvas.height)
    }

    /// Paint every visible source of `scene`. Never fails: sources without
    /// frames fall back to their cache or a placeholder.
    pub fn render(&self, scene: &mut LiveScene) -> RgbImage {
        let mut canvas = self.blank();
        let canvas_size = canvas.dimensions();

        for source in scene.sources.iter_mut().filter(|s| s.is_visible()) {
            let position = source.def().position;
            let dest = source.def().size;
            let source_id = source.id().to_string();

            let (origin, frame) = source.resolve_frame();
            if origin != FrameOrigin::Fresh {
                tracing::trace!(source_id = %source_id, ?origin, "Using fallback frame");
            }

            let fitted = fit_within(frame.dimensions(), dest, self.canvas.upscale);
            if fitted.0 == 0 || fitted.1 == 0 {
                continue;
            }

            let (cx, cy) = center_offset(fitted, dest);
            let at = (
                position.0.saturating_add(cx),
                position.1.saturating_add(cy),
            );
            let Some(blit) = clip_to_canvas(at, fitted, canvas_size) else {
                continue;
            };
            let scaled = if fitted == frame.dimensions() {
                frame
            } else {
                Cow::Owned(scale_visible(&frame, fitted, blit))
            };
            copy_rows(&mut canvas, &scaled, blit);
        }

        canvas
    }

    /// Render a scene by id.
    pub fn render_scene(
        &self,
        manager: &mut SceneManager,
        scene_id: &str,
    ) -> ScenecastResult<RgbImage> {
        let scene = manager
            .scene_mut(scene_id)
            .ok_or_else(|| ScenecastError::not_found("scene", scene_id))?;
        Ok(self.render(scene))
    }

    /// Render the current scene, or a blank canvas when there is none.
    pub fn render_current(&self, manager: &mut SceneManager) -> RgbImage {
        match manager.current_scene_mut() {
            Some(scene) => self.render(scene),
            None => self.blank(),
        }
    }
}
