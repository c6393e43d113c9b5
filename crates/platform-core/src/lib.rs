//! SceneCast platform core contracts.
//!
//! This crate contains cross-platform display/window data structures used
//! by the capture and render crates without coupling to a concrete OS backend.

use serde::{Deserialize, Serialize};

/// An axis-aligned rectangle in virtual desktop pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Whether the rectangle covers no pixels.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Overlap of two rectangles, `None` when they do not intersect.
    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let left = self.x.max(other.x) as i64;
        let top = self.y.max(other.y) as i64;
        let right = (self.x as i64 + self.width as i64).min(other.x as i64 + other.width as i64);
        let bottom =
            (self.y as i64 + self.height as i64).min(other.y as i64 + other.height as i64);

        if right <= left || bottom <= top {
            return None;
        }
        Some(Rect::new(
            left as i32,
            top as i32,
            (right - left) as u32,
            (bottom - top) as u32,
        ))
    }
}

/// Information about a connected monitor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonitorInfo {
    /// Monitor index in enumeration order.
    pub id: usize,
    /// Monitor name/identifier.
    pub name: String,
    /// Resolution in physical pixels.
    pub width: u32,
    pub height: u32,
    /// Position in the virtual desktop (pixels).
    pub x: i32,
    pub y: i32,
    /// Whether this monitor is primary.
    pub primary: bool,
}

impl MonitorInfo {
    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }
}

/// A top-level window that can be captured.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WindowInfo {
    /// Platform window id (e.g. `0x3a00003` on X11).
    pub id: String,
    /// Window title.
    pub title: String,
    /// Absolute bounds in the virtual desktop.
    pub bounds: Rect,
}

/// Display server / platform family used for capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DisplayServer {
    Wayland,
    X11,
    #[default]
    Unknown,
}

/// Compute virtual desktop bounds that include all connected monitors.
pub fn virtual_desktop_bounds(monitors: &[MonitorInfo]) -> Rect {
    if monitors.is_empty() {
        return Rect::new(0, 0, 1920, 1080);
    }

    let min_x = monitors.iter().map(|m| m.x).min().unwrap_or(0);
    let min_y = monitors.iter().map(|m| m.y).min().unwrap_or(0);
    let max_x = monitors
        .iter()
        .map(|m| m.x + m.width as i32)
        .max()
        .unwrap_or(1920);
    let max_y = monitors
        .iter()
        .map(|m| m.y + m.height as i32)
        .max()
        .unwrap_or(1080);

    let width = (max_x - min_x).max(1) as u32;
    let height = (max_y - min_y).max(1) as u32;
    Rect::new(min_x, min_y, width, height)
}

/// Find the topmost window whose title contains `title`.
///
/// `windows` must be in stacking order, bottom first.
pub fn find_window_by_title<'a>(windows: &'a [WindowInfo], title: &str) -> Option<&'a WindowInfo> {
    windows.iter().rev().find(|w| w.title.contains(title))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor(id: usize, x: i32, y: i32, width: u32, height: u32) -> MonitorInfo {
        MonitorInfo {
            id,
            name: format!("mon-{id}"),
            width,
            height,
            x,
            y,
            primary: id == 0,
        }
    }

    #[test]
    fn virtual_bounds_cover_negative_origin_layout() {
        let monitors = vec![monitor(0, -1920, 0, 1920, 1080), monitor(1, 0, 0, 2560, 1440)];

        let bounds = virtual_desktop_bounds(&monitors);
        assert_eq!(bounds, Rect::new(-1920, 0, 4480, 1440));
    }

    #[test]
    fn empty_monitor_list_uses_default_canvas_size() {
        assert_eq!(virtual_desktop_bounds(&[]), Rect::new(0, 0, 1920, 1080));
    }

    #[test]
    fn topmost_title_match_wins() {
        let windows = vec![
            WindowInfo {
                id: "0x1".to_string(),
                title: "Terminal - build".to_string(),
                bounds: Rect::new(0, 0, 800, 600),
            },
            WindowInfo {
                id: "0x2".to_string(),
                title: "Editor".to_string(),
                bounds: Rect::new(10, 10, 800, 600),
            },
            WindowInfo {
                id: "0x3".to_string(),
                title: "Terminal - logs".to_string(),
                bounds: Rect::new(20, 20, 640, 480),
            },
        ];

        let found = find_window_by_title(&windows, "Terminal").unwrap();
        assert_eq!(found.id, "0x3");
        assert!(find_window_by_title(&windows, "Browser").is_none());
    }

    #[test]
    fn intersect_clamps_to_overlap() {
        let desktop = Rect::new(0, 0, 1920, 1080);
        assert_eq!(
            Rect::new(1800, 1000, 400, 300).intersect(&desktop),
            Some(Rect::new(1800, 1000, 120, 80))
        );
        assert_eq!(Rect::new(-50, 0, 100, 100).intersect(&desktop), Some(Rect::new(0, 0, 50, 100)));
        assert_eq!(Rect::new(2000, 0, 10, 10).intersect(&desktop), None);
    }

    #[test]
    fn zero_sized_rect_is_empty() {
        assert!(Rect::new(5, 5, 0, 100).is_empty());
        assert!(!Rect::new(5, 5, 1, 1).is_empty());
    }
}
