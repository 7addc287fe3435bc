//! Video stream geometry via ffprobe.

use std::path::Path;
use std::process::Stdio;

use serde::Deserialize;
use tokio::process::Command;

use crate::error::{DetectError, DetectResult};

/// Geometry of a file's first video stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoInfo {
    /// Coded width in pixels
    pub width: u32,
    /// Coded height in pixels
    pub height: u32,
    /// Clockwise display rotation in degrees, normalized to 0, 90, 180 or 270
    pub rotation: u32,
}

impl VideoInfo {
    /// Frame size after FFmpeg applies the rotation metadata.
    pub fn display_size(&self) -> (u32, u32) {
        match self.rotation {
            90 | 270 => (self.height, self.width),
            _ => (self.width, self.height),
        }
    }
}

#[derive(Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    #[serde(default)]
    side_data_list: Vec<SideData>,
    #[serde(default)]
    tags: StreamTags,
}

#[derive(Deserialize)]
struct SideData {
    rotation: Option<f64>,
}

#[derive(Deserialize, Default)]
struct StreamTags {
    rotate: Option<String>,
}

impl ProbeStream {
    /// Display matrix rotation wins over the legacy `rotate` tag.
    fn rotation(&self) -> u32 {
        let degrees = self
            .side_data_list
            .iter()
            .find_map(|d| d.rotation)
            // The display matrix stores counter-clockwise rotation
            .map(|r| -r)
            .or_else(|| self.tags.rotate.as_deref().and_then(|r| r.trim().parse().ok()))
            .unwrap_or(0.0);

        let quarter_turns = (degrees / 90.0).round() as i64;
        (quarter_turns.rem_euclid(4) * 90) as u32
    }
}

/// Probe the first video stream of a file.
pub async fn probe_video(path: impl AsRef<Path>) -> DetectResult<VideoInfo> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(DetectError::FileNotFound(path.to_path_buf()));
    }

    which::which("ffprobe").map_err(|_| DetectError::FfprobeNotFound)?;

    let output = Command::new("ffprobe")
        .args(["-v", "error", "-select_streams", "v:0", "-print_format", "json", "-show_streams"])
        .arg(path)
        .stdin(Stdio::null())
        .output()
        .await?;

    if !output.status.success() {
        return Err(DetectError::InvalidVideo(format!(
            "FFprobe could not read the file: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    parse_probe_output(&output.stdout)
}

fn parse_probe_output(stdout: &[u8]) -> DetectResult<VideoInfo> {
    let probe: ProbeOutput = serde_json::from_slice(stdout)?;
    let stream = probe
        .streams
        .first()
        .ok_or_else(|| DetectError::InvalidVideo("No video stream found".to_string()))?;

    match (stream.width, stream.height) {
        (Some(width), Some(height)) if width > 0 && height > 0 => Ok(VideoInfo {
            width,
            height,
            rotation: stream.rotation(),
        }),
        _ => Err(DetectError::InvalidVideo("Video stream has no dimensions".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_probe_output() {
        let json = br#"{"streams": [{"width": 1920, "height": 1080}]}"#;
        let info = parse_probe_output(json).unwrap();
        assert_eq!(info.rotation, 0);
        assert_eq!(info.display_size(), (1920, 1080));
    }

    #[test]
    fn test_rotated_phone_video() {
        let json = br#"{"streams": [{"width": 1920, "height": 1080,
            "side_data_list": [{"side_data_type": "Display Matrix", "rotation": -90}]}]}"#;
        let info = parse_probe_output(json).unwrap();
        assert_eq!(info.rotation, 90);
        assert_eq!(info.display_size(), (1080, 1920));

        let legacy = br#"{"streams": [{"width": 1280, "height": 720, "tags": {"rotate": "270"}}]}"#;
        assert_eq!(parse_probe_output(legacy).unwrap().display_size(), (720, 1280));

        let upside_down = br#"{"streams": [{"width": 640, "height": 480,
            "side_data_list": [{"rotation": 180}]}]}"#;
        assert_eq!(parse_probe_output(upside_down).unwrap().display_size(), (640, 480));
    }

    #[test]
    fn test_probe_output_without_video() {
        assert!(matches!(
            parse_probe_output(br#"{"streams": []}"#),
            Err(DetectError::InvalidVideo(_))
        ));
        assert!(matches!(
            parse_probe_output(br#"{"streams": [{"width": 0, "height": 480}]}"#),
            Err(DetectError::InvalidVideo(_))
        ));
    }
}
