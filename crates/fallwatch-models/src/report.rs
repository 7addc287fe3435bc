//! Response payloads returned by the service.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::event::AlertEvent;

/// Which alert channels accepted or failed an alert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DispatchSummary {
    pub delivered: Vec<String>,
    pub failed: Vec<String>,
}

impl DispatchSummary {
    pub fn is_empty(&self) -> bool {
        self.delivered.is_empty() && self.failed.is_empty()
    }
}

/// Result of analyzing a single frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DetectResponse {
    /// True exactly when the frame emitted a fall event
    pub fall: bool,
    /// Event confidence, otherwise the best sub-threshold "falling" score (0 when none)
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<AlertEvent>,
    pub camera_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alerts: Option<DispatchSummary>,
}

/// Event emitted while scanning an uploaded video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FrameEvent {
    /// Zero-based frame index in the source video
    pub frame: u64,
    pub event: AlertEvent,
}

/// Result of scanning an uploaded video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VideoReport {
    pub message: String,
    /// Frames decoded from the file
    pub frames: u64,
    /// Frames passed to the detector
    pub analyzed_frames: u64,
    pub events: Vec<FrameEvent>,
}

impl VideoReport {
    pub fn processed(frames: u64, analyzed_frames: u64, events: Vec<FrameEvent>) -> Self {
        Self {
            message: "Video processed".to_string(),
            frames,
            analyzed_frames,
            events,
        }
    }
}
