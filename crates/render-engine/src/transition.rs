//! Scene switching policies.

use image::RgbImage;
use scenecast_common::error::{ScenecastError, ScenecastResult};

use crate::compositor::Compositor;
use crate::scene::SceneManager;

/// How the output moves from the current scene to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Switch on the next tick.
    Cut,
    /// Cross-fade over `steps` presented frames, both ends included.
    Fade { steps: u32 },
}

impl Transition {
    pub const DEFAULT_FADE_STEPS: u32 = 10;

    pub fn fade() -> Self {
        Transition::Fade {
            steps: Self::DEFAULT_FADE_STEPS,
        }
    }
}

/// Pixelwise `a * (1 - alpha) + b * alpha`, rounded. Both frames must share
/// dimensions; otherwise `b` is returned.
pub fn blend(a: &RgbImage, b: &RgbImage, alpha: f32) -> RgbImage {
    if a.dimensions() != b.dimensions() {
        tracing::warn!(a = ?a.dimensions(), b = ?b.dimensions(), "Blend size mismatch");
        return b.clone();
    }
    let alpha = alpha.clamp(0.0, 1.0);
    let beta = 1.0 - alpha;

    let data: Vec<u8> = a
        .as_raw()
        .iter()
        .zip(b.as_raw())
        .map(|(&pa, &pb)| (pa as f32 * beta + pb as f32 * alpha).round() as u8)
        .collect();
    RgbImage::from_raw(a.width(), a.height(), data).unwrap_or_else(|| b.clone())
}

/// Switch the current scene to `target`.
///
/// A fade renders both scenes once, hands every blended step to `present`
/// and only then activates the target. The call blocks until the last step
/// has been presented. Without a current scene a fade degrades to a cut.
pub fn switch_scene<F>(
    manager: &mut SceneManager,
    compositor: &Compositor,
    target: &str,
    transition: Transition,
    mut present: F,
) -> ScenecastResult<()>
where
    F: FnMut(&RgbImage),
{
    if manager.scene(target).is_none() {
        return Err(ScenecastError::not_found("scene", target));
    }

    let steps = match transition {
        Transition::Fade { steps } if steps >= 2 => steps,
        _ => return manager.set_active_scene(target),
    };
    let Some(current) = manager.current_scene_id().map(str::to_string) else {
        return manager.set_active_scene(target);
    };

    let from = compositor.render_scene(manager, &current)?;
    let to = compositor.render_scene(manager, target)?;

    tracing::debug!(from = %current, to = %target, steps, "Fading");
    for step in 0..steps {
        let alpha = step as f32 / (steps - 1) as f32;
        present(&blend(&from, &to, alpha));
    }

    manager.set_active_scene(target)
}
