//! Tick the compositor, optionally feeding a stream or recording.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use scenecast_common::clock::{FramePacer, RateController};
use scenecast_common::config::AppConfig;
use scenecast_render_engine::{switch_scene, Compositor, SceneManager, Transition};
use scenecast_stream_engine::{StreamPipeline, StreamTarget};

use super::open_live;

pub struct RunOptions {
    pub scene: Option<String>,
    pub target: Option<StreamTarget>,
    pub duration: Option<Duration>,
    pub cycle: Option<Duration>,
    pub transition: Transition,
}

pub async fn run(config: AppConfig, options: RunOptions) -> anyhow::Result<()> {
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            flag.store(true, Ordering::SeqCst);
        }
    });

    println!("Press Ctrl+C to stop...");
    println!();

    tokio::task::spawn_blocking(move || tick_loop(config, options, &shutdown)).await?
}

fn tick_loop(config: AppConfig, options: RunOptions, shutdown: &AtomicBool) -> anyhow::Result<()> {
    let mut manager = open_live(&config)?;
    match &options.scene {
        Some(id) => manager.set_active_scene(id)?,
        None if manager.current_scene_id().is_none() => {
            match manager.scenes().first().map(|s| s.id.clone()) {
                Some(first) => manager.set_active_scene(&first)?,
                None => tracing::warn!("No scenes defined, output will be black"),
            }
        }
        None => {}
    }

    let compositor = Compositor::new(config.canvas);
    let mut pipeline = StreamPipeline::new(&config.canvas, &config.stream);
    if let Some(target) = options.target.clone() {
        println!("Output: {target}");
        pipeline.start(target)?;
    }

    let canvas = config.canvas;
    println!(
        "Rendering {}x{} @ {}fps, scene: {}",
        canvas.width,
        canvas.height,
        canvas.fps,
        manager.current_scene_id().unwrap_or("<none>")
    );

    let started = Instant::now();
    let mut pacer = FramePacer::new(canvas.fps);
    let mut status_gate = RateController::with_interval(Duration::from_secs(5));
    let mut cycle_gate = options.cycle.map(|interval| {
        let mut gate = RateController::with_interval(interval);
        gate.should_tick(started);
        gate
    });
    let mut ticks: u64 = 0;

    let result = loop {
        if shutdown.load(Ordering::SeqCst) {
            break Ok(());
        }
        if options.duration.is_some_and(|limit| started.elapsed() >= limit) {
            break Ok(());
        }

        if let Some(gate) = cycle_gate.as_mut() {
            if gate.should_tick(Instant::now()) {
                if let Some(next) = next_scene_id(&manager) {
                    let streaming = options.target.is_some();
                    let switched = switch_scene(
                        &mut manager,
                        &compositor,
                        &next,
                        options.transition,
                        |frame| {
                            if streaming {
                                pipeline.push_video_frame(frame.clone());
                            }
                            pacer.wait();
                        },
                    );
                    if let Err(e) = switched {
                        break Err(e.into());
                    }
                    tracing::info!(scene_id = %next, "Switched scene");
                }
            }
        }

        let frame = compositor.render_current(&mut manager);
        ticks += 1;

        if options.target.is_some() {
            if !pipeline.is_active() {
                let status = pipeline.status();
                let reason = status
                    .last_error
                    .unwrap_or_else(|| "stream ended".to_string());
                break Err(anyhow::anyhow!("Output stopped: {reason}"));
            }
            pipeline.push_video_frame(frame);
        }

        if status_gate.should_tick(Instant::now()) && options.target.is_some() {
            let status = pipeline.status();
            tracing::info!(
                state = ?status.state,
                frames = status.frames_written,
                queued = status.video_queue_depth,
                dropped = status.video_dropped,
                uptime_secs = status.uptime_secs,
                "Output status"
            );
        }

        pacer.wait();
    };

    let status = pipeline.status();
    pipeline.stop();

    println!();
    println!(
        "Rendered {ticks} frames in {:.1}s",
        started.elapsed().as_secs_f64()
    );
    if options.target.is_some() {
        println!(
            "Encoded {} frames, dropped {}",
            status.frames_written, status.video_dropped
        );
    }
    result
}

/// Scene after the current one, wrapping around.
fn next_scene_id(manager: &SceneManager) -> Option<String> {
    let scenes = manager.scenes();
    if scenes.len() < 2 {
        return None;
    }
    let current = manager
        .current_scene_id()
        .and_then(|id| scenes.iter().position(|s| s.id == id));
    let next = current.map_or(0, |index| (index + 1) % scenes.len());
    Some(scenes[next].id.clone())
}
