//! Still captures of the composited output.

use std::path::Path;

use image::RgbImage;
use scenecast_common::error::ScenecastResult;

/// Write `canvas` to `path`; the format follows the file extension.
pub fn save_snapshot(canvas: &RgbImage, path: impl AsRef<Path>) -> ScenecastResult<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    canvas.save(path)?;
    tracing::info!(path = %path.display(), "Snapshot saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_round_trips_through_png() {
        let dir = std::env::temp_dir().join("scenecast_test_snapshot");
        let path = dir.join("nested").join("frame.png");
        let canvas = RgbImage::from_pixel(8, 4, image::Rgb([12, 34, 56]));

        save_snapshot(&canvas, &path).unwrap();
        let loaded = image::open(&path).unwrap().to_rgb8();
        assert_eq!(loaded, canvas);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn unknown_extension_is_an_error() {
        let path = std::env::temp_dir().join("scenecast_test_snapshot.unknownext");
        let canvas = RgbImage::new(2, 2);
        assert!(save_snapshot(&canvas, &path).is_err());
    }
}
