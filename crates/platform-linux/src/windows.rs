//! Capturable window enumeration.

use std::process::Command;

use scenecast_common::error::{ScenecastError, ScenecastResult};
use scenecast_platform_core::{Rect, WindowInfo};

/// List named windows through `xwininfo -root -tree`.
///
/// The result is in the order `xwininfo` prints the tree, which follows
/// the X server's stacking order (bottom first).
pub fn list_windows() -> ScenecastResult<Vec<WindowInfo>> {
    let output = Command::new("xwininfo")
        .args(["-root", "-tree"])
        .output()
        .map_err(|e| ScenecastError::platform(format!("Failed to run xwininfo: {e}")))?;

    if !output.status.success() {
        return Err(ScenecastError::platform(format!(
            "xwininfo exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let windows = parse_xwininfo_tree(&String::from_utf8_lossy(&output.stdout));
    tracing::debug!(count = windows.len(), "Enumerated windows");
    Ok(windows)
}

/// Parse the output of `xwininfo -root -tree`.
///
/// ```text
///      0x3a00003 "Terminal": ("gnome-terminal" "Gnome-terminal")  800x600+10+20  +10+20
///      0x3a00004 (has no name): ()  1x1+-1+-1  +9+19
/// ```
pub fn parse_xwininfo_tree(output: &str) -> Vec<WindowInfo> {
    output.lines().filter_map(parse_window_line).collect()
}

fn parse_window_line(line: &str) -> Option<WindowInfo> {
    let line = line.trim();
    if !line.starts_with("0x") {
        return None;
    }

    let (id, rest) = line.split_once(' ')?;
    let rest = rest.trim_start().strip_prefix('"')?;
    let title_end = rest.find("\":")?;
    let title = &rest[..title_end];
    if title.is_empty() {
        return None;
    }

    let mut tokens = rest[title_end..].split_whitespace().rev();
    let absolute = tokens.next()?;
    let relative = tokens.next()?;

    let (size, _) = relative.split_at(relative.find(['+', '-'])?);
    let (width, height) = size.split_once('x')?;
    let (x, y) = crate::parse_offset_pair(absolute)?;

    Some(WindowInfo {
        id: id.to_string(),
        title: title.to_string(),
        bounds: Rect::new(x, y, width.parse().ok()?, height.parse().ok()?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TREE: &str = r#"
xwininfo: Window id: 0x1e6 (the root window) (has no name)

  Root window id: 0x1e6 (the root window) (has no name)
  Parent window id: 0x0 (none)
     3 children:
     0x3a00003 "Terminal": ("gnome-terminal" "Gnome-terminal")  800x600+10+20  +10+20
        1 child:
        0x3a00004 (has no name): ()  1x1+-1+-1  +9+19
     0x1c00001 "Firefox — News": ("Navigator" "firefox")  1280x720+0+0  +100+50
     0x1c00009 "Minimized": ()  0x0+0+0  +0+0
"#;

    #[test]
    fn parses_named_windows_only() {
        let windows = parse_xwininfo_tree(TREE);
        assert_eq!(windows.len(), 3);
        assert_eq!(windows[0].id, "0x3a00003");
        assert_eq!(windows[0].title, "Terminal");
        assert_eq!(windows[0].bounds, Rect::new(10, 20, 800, 600));
        assert_eq!(windows[1].title, "Firefox — News");
        assert_eq!(windows[1].bounds, Rect::new(100, 50, 1280, 720));
    }

    #[test]
    fn keeps_zero_area_windows_for_the_caller_to_reject() {
        let windows = parse_xwininfo_tree(TREE);
        let minimized = windows.iter().find(|w| w.title == "Minimized").unwrap();
        assert!(minimized.bounds.is_empty());
    }
}
