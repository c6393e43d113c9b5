//! Render a scene to an image file.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use scenecast_common::clock::FramePacer;
use scenecast_common::config::AppConfig;
use scenecast_render_engine::{save_snapshot, Compositor};

use super::open_live;

pub fn run(
    config: &AppConfig,
    output: PathBuf,
    scene: Option<String>,
    warmup: Duration,
) -> anyhow::Result<()> {
    let mut manager = open_live(config)?;
    let scene_id = match scene {
        Some(id) => id,
        None => manager
            .current_scene_id()
            .map(str::to_string)
            .context("No current scene; pass --scene")?,
    };

    let compositor = Compositor::new(config.canvas);
    let mut frame = compositor.render_scene(&mut manager, &scene_id)?;

    // Capture and video sources deliver their first frame asynchronously.
    let deadline = Instant::now() + warmup;
    let mut pacer = FramePacer::new(config.canvas.fps);
    while Instant::now() < deadline {
        pacer.wait();
        frame = compositor.render_scene(&mut manager, &scene_id)?;
    }

    save_snapshot(&frame, &output)?;
    println!("Snapshot of {scene_id} saved to: {}", output.display());
    Ok(())
}
