//! Diagnostic frames for sources without renderable content.
//!
//! Labels are drawn with a TrueType font loaded once per process. Without a
//! usable font the frames are plain backgrounds.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_text_mut, text_size};
use scenecast_common::error::{ScenecastError, ScenecastResult};

pub const BROWSER_BACKGROUND: Rgb<u8> = Rgb([40, 40, 60]);
pub const UNAVAILABLE_BACKGROUND: Rgb<u8> = Rgb([30, 30, 30]);
pub const LABEL_COLOR: Rgb<u8> = Rgb([200, 200, 200]);

const LABEL_HEIGHT: f32 = 20.0;
const LABEL_MARGIN: i32 = 10;

/// Searched in order when no font is configured.
const SYSTEM_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu-sans-fonts/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/noto/NotoSans-Regular.ttf",
    "/usr/share/fonts/noto/NotoSans-Regular.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation-sans/LiberationSans-Regular.ttf",
];

static LABEL_FONT: OnceLock<Option<FontVec>> = OnceLock::new();

/// Load the label font, preferring `configured` over the system search.
/// Only the first call in a process has an effect. Returns whether labels
/// will be drawn.
pub fn init_label_font(configured: Option<&Path>) -> bool {
    LABEL_FONT
        .get_or_init(|| load_label_font(configured))
        .is_some()
}

fn label_font() -> Option<&'static FontVec> {
    LABEL_FONT.get_or_init(|| load_label_font(None)).as_ref()
}

fn load_label_font(configured: Option<&Path>) -> Option<FontVec> {
    if let Some(path) = configured {
        match read_font(path) {
            Ok(font) => return Some(font),
            Err(e) => tracing::warn!(error = %e, "Configured label font unusable, searching system fonts"),
        }
    }

    let found = SYSTEM_FONTS.iter().map(PathBuf::from).find_map(|path| {
        let font = read_font(&path).ok()?;
        tracing::debug!(path = %path.display(), "Label font loaded");
        Some(font)
    });
    if found.is_none() {
        tracing::warn!("No label font found, placeholders are drawn without text");
    }
    found
}

/// Read and parse a font file.
pub fn read_font(path: &Path) -> ScenecastResult<FontVec> {
    let bytes = std::fs::read(path).map_err(|e| {
        ScenecastError::config(format!("cannot read font {}: {e}", path.display()))
    })?;
    FontVec::try_from_vec(bytes).map_err(|e| {
        ScenecastError::config(format!("{} is not a usable font: {e}", path.display()))
    })
}

/// Solid frame of `size` with a label drawn near the vertical middle.
pub fn labeled_frame(size: (u32, u32), background: Rgb<u8>, label: &str) -> RgbImage {
    let (width, height) = (size.0.max(1), size.1.max(1));
    let mut frame = RgbImage::from_pixel(width, height, background);
    if let Some(font) = label_font() {
        draw_label(&mut frame, font, label);
    }
    frame
}

fn draw_label(frame: &mut RgbImage, font: &FontVec, label: &str) {
    let scale = PxScale::from(LABEL_HEIGHT);
    let (_, text_height) = text_size(scale, font, label);
    let y = (frame.height() as i32 - text_height as i32) / 2;
    draw_text_mut(frame, LABEL_COLOR, LABEL_MARGIN, y, scale, font, label);
}

/// Stand-in for a browser source showing its URL.
pub fn browser(size: (u32, u32), url: &str) -> RgbImage {
    labeled_frame(size, BROWSER_BACKGROUND, &format!("Browser: {url}"))
}

/// Frame drawn when a source has neither a fresh nor a cached frame.
pub fn unavailable(size: (u32, u32), source_name: &str) -> RgbImage {
    labeled_frame(
        size,
        UNAVAILABLE_BACKGROUND,
        &format!("Source unavailable: {source_name}"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use ab_glyph::Font;

    fn lit_pixels(frame: &RgbImage, background: Rgb<u8>) -> usize {
        frame.pixels().filter(|p| **p != background).count()
    }

    #[test]
    fn browser_placeholder_fills_box() {
        let frame = browser((320, 120), "https://example.org");
        assert_eq!(frame.dimensions(), (320, 120));
        assert_eq!(*frame.get_pixel(0, 0), BROWSER_BACKGROUND);
        assert_eq!(*frame.get_pixel(319, 119), BROWSER_BACKGROUND);
    }

    #[test]
    fn unavailable_placeholder_uses_dark_background() {
        let frame = unavailable((64, 48), "cam");
        assert_eq!(*frame.get_pixel(63, 47), UNAVAILABLE_BACKGROUND);
    }

    #[test]
    fn tiny_boxes_do_not_panic() {
        let frame = unavailable((1, 1), "x");
        assert_eq!(frame.dimensions(), (1, 1));
    }

    #[test]
    fn label_is_drawn_when_a_font_is_available() {
        let Some(font) = label_font() else {
            return;
        };
        let frame = labeled_frame((320, 60), UNAVAILABLE_BACKGROUND, "Source unavailable");
        assert!(lit_pixels(&frame, UNAVAILABLE_BACKGROUND) > 0);

        // Non-Latin names render through the font, not a fallback glyph.
        if font.glyph_id('К').0 != 0 {
            let cyrillic = labeled_frame((320, 60), UNAVAILABLE_BACKGROUND, "Камера");
            let question = labeled_frame((320, 60), UNAVAILABLE_BACKGROUND, "??????");
            assert!(lit_pixels(&cyrillic, UNAVAILABLE_BACKGROUND) > 0);
            assert_ne!(cyrillic, question);
        }
    }

    #[test]
    fn unusable_configured_font_falls_back_to_search() {
        let configured = load_label_font(Some(Path::new("/nonexistent/label.ttf")));
        assert_eq!(configured.is_some(), load_label_font(None).is_some());
    }

    #[test]
    fn non_font_file_is_rejected() {
        let path = std::env::temp_dir().join("scenecast_test_not_a_font.ttf");
        std::fs::write(&path, b"definitely not a font").unwrap();
        let err = read_font(&path).unwrap_err();
        assert!(err.to_string().contains("not a usable font"));
        std::fs::remove_file(&path).ok();

        let missing = read_font(Path::new("/nonexistent/label.ttf")).unwrap_err();
        assert!(missing.to_string().contains("cannot read font"));
    }
}
