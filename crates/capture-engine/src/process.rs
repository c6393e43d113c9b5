//! FFmpeg child process plumbing shared by the grab and decode paths.

use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::path::Path;
use std::process::{Child, ChildStderr, Command};
use std::thread::JoinHandle;

use image::RgbImage;
use scenecast_platform_core::Rect;

/// Read exactly one packed `rgb24` frame.
///
/// Returns `Ok(false)` on a clean end of stream at a frame boundary and an
/// `UnexpectedEof` error when the stream ends mid-frame.
pub fn read_frame(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => {
                return Err(std::io::Error::new(
                    ErrorKind::UnexpectedEof,
                    format!("stream ended after {filled} of {} frame bytes", buf.len()),
                ))
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(true)
}

/// Read one frame of the given size into a fresh image.
pub fn read_rgb_image(
    reader: &mut impl Read,
    width: u32,
    height: u32,
) -> std::io::Result<Option<RgbImage>> {
    let mut buf = vec![0u8; width as usize * height as usize * 3];
    if !read_frame(reader, &mut buf)? {
        return Ok(None);
    }
    Ok(RgbImage::from_raw(width, height, buf))
}

/// Drain a child's stderr on a thread, returning the collected text on join.
pub fn collect_stderr(stderr: ChildStderr) -> JoinHandle<String> {
    std::thread::spawn(move || {
        let mut reader = BufReader::new(stderr);
        let mut output = String::new();
        match reader.read_to_string(&mut output) {
            Ok(_) => output,
            Err(err) => format!("<failed to read ffmpeg stderr: {err}>"),
        }
    })
}

/// Forward a long-running child's stderr lines to the debug log.
pub fn log_stderr(stderr: ChildStderr, label: &'static str) -> JoinHandle<()> {
    std::thread::spawn(move || {
        for line in BufReader::new(stderr).lines().map_while(Result::ok) {
            let line = line.trim();
            if !line.is_empty() {
                tracing::debug!(process = label, "{line}");
            }
        }
    })
}

/// Kill a child and reap it. Errors mean it already exited.
pub fn terminate(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// Arguments for an `x11grab` session writing raw `rgb24` to stdout.
pub fn x11grab_args(display: &str, region: Rect, fps: u32) -> Vec<String> {
    vec![
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-f".to_string(),
        "x11grab".to_string(),
        "-draw_mouse".to_string(),
        "1".to_string(),
        "-framerate".to_string(),
        fps.max(1).to_string(),
        "-video_size".to_string(),
        format!("{}x{}", region.width, region.height),
        "-i".to_string(),
        x11_capture_target(display, region),
        "-f".to_string(),
        "rawvideo".to_string(),
        "-pix_fmt".to_string(),
        "rgb24".to_string(),
        "pipe:1".to_string(),
    ]
}

/// `x11grab` input spec: `DISPLAY+x,y`.
pub fn x11_capture_target(display: &str, region: Rect) -> String {
    format!("{display}+{},{}", region.x, region.y)
}

/// Arguments for decoding a video file to raw `rgb24` frames on stdout.
pub fn decode_args(path: &Path) -> Vec<String> {
    vec![
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-nostdin".to_string(),
        "-i".to_string(),
        path.display().to_string(),
        "-map".to_string(),
        "0:v:0".to_string(),
        "-f".to_string(),
        "rawvideo".to_string(),
        "-pix_fmt".to_string(),
        "rgb24".to_string(),
        "pipe:1".to_string(),
    ]
}

/// Probe the first video stream's dimensions with `ffprobe_bin`.
pub fn probe_video_dimensions(path: &Path, ffprobe_bin: &str) -> Option<(u32, u32)> {
    let output = Command::new(ffprobe_bin)
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height",
            "-of",
            "csv=p=0:s=x",
        ])
        .arg(path)
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    parse_probe_dimensions(&String::from_utf8_lossy(&output.stdout))
}

fn parse_probe_dimensions(raw: &str) -> Option<(u32, u32)> {
    let line = raw.lines().next()?.trim();
    let (w, h) = line.split_once('x')?;
    let width = w.parse::<u32>().ok()?;
    let height = h.parse::<u32>().ok()?;
    if width == 0 || height == 0 {
        return None;
    }
    Some((width, height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn reads_whole_frames_and_detects_clean_end() {
        let data: Vec<u8> = (0..12).collect();
        let mut reader = Cursor::new(data);

        let first = read_rgb_image(&mut reader, 2, 1).unwrap().unwrap();
        assert_eq!(first.get_pixel(1, 0).0, [3, 4, 5]);
        let second = read_rgb_image(&mut reader, 2, 1).unwrap().unwrap();
        assert_eq!(second.get_pixel(0, 0).0, [6, 7, 8]);
        assert!(read_rgb_image(&mut reader, 2, 1).unwrap().is_none());
    }

    #[test]
    fn truncated_frame_is_an_error() {
        let mut reader = Cursor::new(vec![1u8; 4]);
        let err = read_rgb_image(&mut reader, 2, 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnexpectedEof);
    }

    #[test]
    fn x11grab_targets_region_origin() {
        let args = x11grab_args(":1", Rect::new(100, 40, 800, 600), 30);
        assert!(args.windows(2).any(|w| w == ["-video_size", "800x600"]));
        assert!(args.windows(2).any(|w| w == ["-i", ":1+100,40"]));
        assert_eq!(args.last().map(String::as_str), Some("pipe:1"));
    }

    #[test]
    fn probe_output_parsing() {
        assert_eq!(parse_probe_dimensions("1280x720\n"), Some((1280, 720)));
        assert_eq!(parse_probe_dimensions("0x720\n"), None);
        assert_eq!(parse_probe_dimensions(""), None);
    }
}
