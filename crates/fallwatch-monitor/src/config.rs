//! Monitor and camera loop configuration.

use std::time::Duration;

use fallwatch_detect::CameraSource;
use fallwatch_models::DEFAULT_CONFIDENCE_THRESHOLD;
use tracing::warn;

/// Fall decision configuration shared by every frame source.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Exclusive confidence threshold for a "falling" detection
    pub confidence_threshold: f32,
    /// Analyze every n-th frame of uploaded videos
    pub video_frame_stride: u64,
    /// Uploaded videos are scaled down to at most this width
    pub video_max_width: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            video_frame_stride: 1,
            video_max_width: 1280,
        }
    }
}

impl MonitorConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let threshold = std::env::var("CONFIDENCE_THRESHOLD")
            .ok()
            .and_then(|s| s.parse::<f32>().ok())
            .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD);

        Self {
            confidence_threshold: clamp_threshold(threshold),
            video_frame_stride: std::env::var("VIDEO_FRAME_STRIDE")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(1),
            video_max_width: std::env::var("VIDEO_MAX_WIDTH")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1280),
        }
    }
}

fn clamp_threshold(threshold: f32) -> f32 {
    if threshold.is_nan() {
        warn!("CONFIDENCE_THRESHOLD is NaN, using {}", DEFAULT_CONFIDENCE_THRESHOLD);
        return DEFAULT_CONFIDENCE_THRESHOLD;
    }
    let clamped = threshold.clamp(0.0, 1.0);
    if clamped != threshold {
        warn!(threshold, clamped, "CONFIDENCE_THRESHOLD outside [0, 1], clamping");
    }
    clamped
}

/// Standalone camera loop configuration.
#[derive(Debug, Clone)]
pub struct CameraConfig {
    /// Source id used in alerts
    pub camera_id: String,
    pub device: String,
    pub input_format: String,
    pub width: u32,
    pub height: u32,
    /// Delay between analyzed frames
    pub frame_delay: Duration,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            camera_id: "desktop".to_string(),
            device: "/dev/video0".to_string(),
            input_format: "v4l2".to_string(),
            width: 640,
            height: 480,
            frame_delay: Duration::from_millis(100),
        }
    }
}

impl CameraConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            camera_id: std::env::var("CAMERA_ID").unwrap_or(defaults.camera_id),
            device: std::env::var("CAMERA_DEVICE").unwrap_or(defaults.device),
            input_format: std::env::var("CAMERA_INPUT_FORMAT").unwrap_or(defaults.input_format),
            width: std::env::var("CAMERA_WIDTH")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.width),
            height: std::env::var("CAMERA_HEIGHT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.height),
            frame_delay: std::env::var("FRAME_DELAY_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.frame_delay),
        }
    }

    /// FFmpeg capture description; the frame delay becomes the output rate.
    pub fn source(&self) -> CameraSource {
        let fps = if self.frame_delay.is_zero() {
            0.0
        } else {
            1.0 / self.frame_delay.as_secs_f64()
        };
        CameraSource {
            device: self.device.clone(),
            input_format: self.input_format.clone(),
            width: self.width,
            height: self.height,
            fps,
        }
    }
}
