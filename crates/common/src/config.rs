//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Where the scene document is persisted.
    pub scenes_path: PathBuf,

    /// Output canvas settings.
    pub canvas: CanvasConfig,

    /// Capture source tuning.
    pub capture: CaptureConfig,

    /// Streaming pipeline defaults.
    pub stream: StreamConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,

    /// TrueType/OpenType font for placeholder labels. Common system fonts
    /// are searched when unset.
    pub label_font: Option<PathBuf>,
}

/// Output canvas parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasConfig {
    pub width: u32,
    pub height: u32,

    /// Tick rate of the compositor.
    pub fps: u32,

    /// Whether frames smaller than their destination box are scaled up to fit.
    pub upscale: bool,
}

/// Capture source tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Sampling rate of background grab streams.
    pub fps: u32,

    /// Minimum interval between window geometry lookups.
    pub window_refresh_ms: u64,

    /// A grabbed frame older than this is no longer considered fresh.
    pub stale_frame_ms: u64,

    /// A grab stream that delivers nothing for this long is reopened.
    pub stall_timeout_ms: u64,

    /// Binary used for grabbing and decoding.
    pub ffmpeg_bin: String,

    /// Binary used to probe video dimensions.
    pub ffprobe_bin: String,
}

/// Streaming pipeline defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Capacity of both the video and the audio queue.
    pub queue_capacity: usize,

    /// Video bitrate in kbps.
    pub video_bitrate_kbps: u32,

    /// Audio bitrate in kbps.
    pub audio_bitrate_kbps: u32,

    /// x264 preset.
    pub preset: String,

    /// GOP length in frames.
    pub keyframe_interval: u32,

    /// Audio sample rate (interleaved f32).
    pub audio_sample_rate: u32,

    /// Audio channel count.
    pub audio_channels: u16,

    /// Feed an audio input to the encoder at all.
    pub audio_enabled: bool,

    /// How long `stop` waits for the worker before killing the encoder.
    pub stop_grace_ms: u64,

    /// Encoder binary.
    pub ffmpeg_bin: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "scenecast=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            scenes_path: default_scenes_path(),
            canvas: CanvasConfig::default(),
            capture: CaptureConfig::default(),
            stream: StreamConfig::default(),
            logging: LoggingConfig::default(),
            label_font: None,
        }
    }
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            fps: 30,
            upscale: true,
        }
    }
}

impl CanvasConfig {
    /// Interval between two compositor ticks.
    pub fn frame_interval(&self) -> std::time::Duration {
        std::time::Duration::from_nanos(1_000_000_000 / self.fps.max(1) as u64)
    }

    /// Size in bytes of one packed RGB canvas.
    pub fn frame_bytes(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            fps: 30,
            window_refresh_ms: 500,
            stale_frame_ms: 1000,
            stall_timeout_ms: 3000,
            ffmpeg_bin: "ffmpeg".to_string(),
            ffprobe_bin: "ffprobe".to_string(),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 30,
            video_bitrate_kbps: 3000,
            audio_bitrate_kbps: 128,
            preset: "veryfast".to_string(),
            keyframe_interval: 50,
            audio_sample_rate: 44100,
            audio_channels: 2,
            audio_enabled: true,
            stop_grace_ms: 2000,
            ffmpeg_bin: "ffmpeg".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        Self::load_from(&config_file_path())
    }

    /// Load config from an explicit path, falling back to defaults.
    pub fn load_from(config_path: &Path) -> Self {
        if config_path.exists() {
            match std::fs::read_to_string(config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let config_path = config_file_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("scenecast").join("config.json")
}

/// Default scene document location.
fn default_scenes_path() -> PathBuf {
    let base = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local").join("share")
        });
    base.join("scenecast").join("scenes.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_1080p_at_30fps() {
        let config = AppConfig::default();
        assert_eq!(config.canvas.width, 1920);
        assert_eq!(config.canvas.height, 1080);
        assert_eq!(config.canvas.fps, 30);
        assert_eq!(config.stream.queue_capacity, 30);
        assert_eq!(config.canvas.frame_bytes(), 1920 * 1080 * 3);
    }

    #[test]
    fn partial_config_fills_missing_sections() {
        let json = r#"{ "canvas": { "width": 1280, "height": 720 } }"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.canvas.width, 1280);
        assert_eq!(config.canvas.fps, 30);
        assert_eq!(config.stream.audio_sample_rate, 44100);
    }

    #[test]
    fn probe_binary_is_configured_beside_ffmpeg() {
        let json = r#"{ "capture": { "ffprobe_bin": "/opt/ffmpeg/bin/ffprobe" } }"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.capture.ffprobe_bin, "/opt/ffmpeg/bin/ffprobe");
        assert_eq!(config.capture.ffmpeg_bin, "ffmpeg");
        assert_eq!(config.capture.stall_timeout_ms, 3000);
    }

    #[test]
    fn unparsable_config_falls_back_to_defaults() {
        let path = std::env::temp_dir().join("scenecast_test_bad_config.json");
        std::fs::write(&path, "{ not json").unwrap();
        let config = AppConfig::load_from(&path);
        assert_eq!(config.canvas.width, 1920);
        std::fs::remove_file(&path).ok();
    }
}
