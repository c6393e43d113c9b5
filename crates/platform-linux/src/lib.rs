//! SceneCast Linux Platform Integration
//!
//! Platform-specific implementations for Linux:
//! - **Display Detection:** display server and monitor enumeration (`xrandr`)
//! - **Window Enumeration:** capturable top-level windows (`xwininfo`)
//! - **Permissions:** Capability detection and user guidance

pub mod display;
pub mod permissions;
pub mod windows;

pub use display::*;
pub use windows::*;

/// Check whether a binary is resolvable through `PATH`.
pub fn command_exists(binary: &str) -> bool {
    std::process::Command::new("sh")
        .arg("-c")
        .arg(format!("command -v {binary} >/dev/null 2>&1"))
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Parse an X11 style offset pair such as `+2560+0`, `-1920+0` or `+-1+-1`.
pub(crate) fn parse_offset_pair(raw: &str) -> Option<(i32, i32)> {
    let normalized = raw.replace("+-", "-");
    let bytes = normalized.as_bytes();
    if bytes.len() < 4 || !matches!(bytes[0], b'+' | b'-') {
        return None;
    }

    let split = normalized[1..].find(['+', '-'])? + 1;
    let x = normalized[..split].trim_start_matches('+').parse().ok()?;
    let y = normalized[split..].trim_start_matches('+').parse().ok()?;
    Some((x, y))
}

#[cfg(test)]
mod tests {
    use super::parse_offset_pair;

    #[test]
    fn offset_pairs_accept_both_sign_styles() {
        assert_eq!(parse_offset_pair("+2560+0"), Some((2560, 0)));
        assert_eq!(parse_offset_pair("-1920+0"), Some((-1920, 0)));
        assert_eq!(parse_offset_pair("+-1+-1"), Some((-1, -1)));
        assert_eq!(parse_offset_pair("+0-1080"), Some((0, -1080)));
        assert_eq!(parse_offset_pair("garbage"), None);
    }
}
