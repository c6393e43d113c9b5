//! Capability detection and guidance for Linux.
//!
//! SceneCast shells out to a handful of X11 and FFmpeg tools depending on
//! which sources a scene uses and whether a stream is running.

use crate::command_exists;
use crate::display::{detect_display_server, DisplayServer};

/// A system capability that SceneCast may need.
#[derive(Debug, Clone)]
pub struct Capability {
    pub name: String,
    pub description: String,
    pub available: bool,
    pub required: bool,
    pub fix_instructions: Option<String>,
}

/// Check all capabilities and report status.
pub fn check_capabilities() -> Vec<Capability> {
    vec![
        check_x11_session(),
        check_tool(
            "FFmpeg",
            "ffmpeg",
            "Screen grabbing, video decoding and stream encoding",
            true,
            "Install FFmpeg: sudo apt install ffmpeg",
        ),
        check_tool(
            "FFprobe",
            "ffprobe",
            "Video file dimension probing for video sources",
            false,
            "Install FFmpeg (ships ffprobe): sudo apt install ffmpeg",
        ),
        check_tool(
            "xwininfo",
            "xwininfo",
            "Window enumeration for window capture sources",
            false,
            "Install X11 utilities: sudo apt install x11-utils",
        ),
        check_tool(
            "xrandr",
            "xrandr",
            "Monitor enumeration for full-screen capture sizing",
            false,
            "Install xrandr: sudo apt install x11-xserver-utils",
        ),
    ]
}

/// Whether every required capability is available.
pub fn all_required_available(capabilities: &[Capability]) -> bool {
    capabilities.iter().all(|cap| cap.available || !cap.required)
}

/// Check that an X11 display is reachable (XWayland counts).
fn check_x11_session() -> Capability {
    let server = detect_display_server();
    let available = std::env::var("DISPLAY").is_ok();

    Capability {
        name: "X11 Display".to_string(),
        description: "X11 (or XWayland) display for screen and window grabbing".to_string(),
        available,
        required: true,
        fix_instructions: match (available, server) {
            (true, _) => None,
            (false, DisplayServer::Wayland) => Some(
                "Enable XWayland or export DISPLAY for the XWayland server".to_string(),
            ),
            (false, _) => {
                Some("Run inside a graphical session or export DISPLAY=:0".to_string())
            }
        },
    }
}

fn check_tool(
    name: &str,
    binary: &str,
    description: &str,
    required: bool,
    fix: &str,
) -> Capability {
    let available = command_exists(binary);

    Capability {
        name: name.to_string(),
        description: description.to_string(),
        available,
        required,
        fix_instructions: if available {
            None
        } else {
            Some(fix.to_string())
        },
    }
}

/// Print a user-friendly capability report.
pub fn print_capability_report(capabilities: &[Capability]) {
    println!("SceneCast System Capabilities:");
    println!("{}", "-".repeat(60));

    for cap in capabilities {
        let status = if cap.available {
            "[OK]"
        } else if cap.required {
            "[MISSING - REQUIRED]"
        } else {
            "[MISSING - OPTIONAL]"
        };

        println!("  {} {}: {}", status, cap.name, cap.description);

        if let Some(ref fix) = cap.fix_instructions {
            println!("    Fix: {fix}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_gaps_do_not_block() {
        let caps = vec![
            Capability {
                name: "a".into(),
                description: String::new(),
                available: true,
                required: true,
                fix_instructions: None,
            },
            Capability {
                name: "b".into(),
                description: String::new(),
                available: false,
                required: false,
                fix_instructions: Some("install b".into()),
            },
        ];
        assert!(all_required_available(&caps));
    }

    #[test]
    fn missing_required_blocks() {
        let caps = vec![Capability {
            name: "ffmpeg".into(),
            description: String::new(),
            available: false,
            required: true,
            fix_instructions: None,
        }];
        assert!(!all_required_available(&caps));
    }

    #[test]
    fn report_lists_every_capability() {
        assert_eq!(check_capabilities().len(), 5);
    }
}
