//! Display server detection and monitor enumeration.

use std::process::Command;

use scenecast_common::error::{ScenecastError, ScenecastResult};
use scenecast_platform_core::MonitorInfo;

pub use scenecast_platform_core::DisplayServer;

/// Detect the current display server.
pub fn detect_display_server() -> DisplayServer {
    if std::env::var("WAYLAND_DISPLAY").is_ok() {
        DisplayServer::Wayland
    } else if std::env::var("DISPLAY").is_ok() {
        DisplayServer::X11
    } else {
        DisplayServer::Unknown
    }
}

/// X11 display name from the environment (`:0` when unset).
pub fn x11_display_name() -> String {
    std::env::var("DISPLAY").unwrap_or_else(|_| ":0".to_string())
}

/// Detect connected monitors through `xrandr --listmonitors`.
pub fn detect_monitors() -> ScenecastResult<Vec<MonitorInfo>> {
    tracing::debug!("Detecting monitors");

    let output = Command::new("xrandr")
        .arg("--listmonitors")
        .output()
        .map_err(|e| ScenecastError::platform(format!("Failed to run xrandr: {e}")))?;

    if !output.status.success() {
        return Err(ScenecastError::platform(format!(
            "xrandr exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let monitors = parse_xrandr_monitors(&String::from_utf8_lossy(&output.stdout));
    if monitors.is_empty() {
        return Err(ScenecastError::platform("xrandr reported no monitors"));
    }
    Ok(monitors)
}

/// Parse the output of `xrandr --listmonitors`.
///
/// ```text
/// Monitors: 2
///  0: +*DP-1 2560/597x1440/336+0+0  DP-1
///  1: +HDMI-1 1920/527x1080/296+2560+0  HDMI-1
/// ```
pub fn parse_xrandr_monitors(output: &str) -> Vec<MonitorInfo> {
    output
        .lines()
        .filter_map(|line| {
            let (index, rest) = line.trim().split_once(':')?;
            let id = index.trim().parse::<usize>().ok()?;

            let mut tokens = rest.split_whitespace();
            let flagged_name = tokens.next()?;
            let geometry = tokens.next()?;

            let primary = flagged_name.contains('*');
            let name = flagged_name.trim_start_matches(['+', '*']).to_string();
            let (width, height, x, y) = parse_monitor_geometry(geometry)?;

            Some(MonitorInfo {
                id,
                name,
                width,
                height,
                x,
                y,
                primary,
            })
        })
        .collect()
}

/// Parse `2560/597x1440/336+0+0` into `(width, height, x, y)`.
fn parse_monitor_geometry(raw: &str) -> Option<(u32, u32, i32, i32)> {
    let (w_part, rest) = raw.split_once('x')?;
    let width = w_part.split('/').next()?.parse().ok()?;

    let offset_start = rest.find(['+', '-'])?;
    let (h_part, offsets) = rest.split_at(offset_start);
    let height = h_part.split('/').next()?.parse().ok()?;
    let (x, y) = crate::parse_offset_pair(offsets)?;

    Some((width, height, x, y))
}
