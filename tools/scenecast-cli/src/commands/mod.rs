//! Subcommand implementations.

pub mod check;
pub mod enumerate;
pub mod run;
pub mod scene;
pub mod snapshot;
pub mod source;

use std::path::{Path, PathBuf};

use scenecast_common::config::AppConfig;
use scenecast_render_engine::{ProviderContext, SceneManager};

/// Load the config file, applying a scene document override.
pub fn load_config(path: Option<&Path>, scenes: Option<PathBuf>) -> AppConfig {
    let mut config = match path {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    };
    if let Some(scenes) = scenes {
        config.scenes_path = scenes;
    }
    config
}

/// Scene graph for editing: sources are loaded but nothing is captured.
pub fn open_editor(config: &AppConfig) -> anyhow::Result<SceneManager> {
    let ctx = ProviderContext::offline(&config.capture);
    Ok(SceneManager::load(&config.scenes_path, ctx)?)
}

/// Scene graph with live capture and decoding.
pub fn open_live(config: &AppConfig) -> anyhow::Result<SceneManager> {
    let ctx = ProviderContext::from_config(config);
    Ok(SceneManager::load(&config.scenes_path, ctx)?)
}
