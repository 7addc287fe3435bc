//! Per-frame detection models.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// Class name that marks a fall.
pub const FALLING_LABEL: &str = "falling";

/// Bounding box in normalized coordinates [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    /// Get area (normalized).
    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    /// Intersection over Union with another box.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);

        let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        let union = self.area() + other.area() - intersection;

        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }
}

/// One object observed by the detector in one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Detection {
    /// Class name as reported by the model
    pub label: String,
    /// Detection confidence [0, 1]
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
}

impl Detection {
    /// Create a validated detection.
    ///
    /// Rejects empty labels and confidences outside [0, 1] (including NaN),
    /// so the fall state machine only ever sees well-typed input.
    pub fn new(label: impl Into<String>, confidence: f32) -> ModelResult<Self> {
        let label = label.into();
        if label.trim().is_empty() {
            return Err(ModelError::EmptyLabel);
        }
        if !(0.0..=1.0).contains(&confidence) {
            return Err(ModelError::ConfidenceOutOfRange(confidence));
        }
        Ok(Self {
            label,
            confidence,
            bbox: None,
        })
    }

    /// Attach a bounding box.
    pub fn with_bbox(mut self, bbox: BoundingBox) -> Self {
        self.bbox = Some(bbox);
        self
    }

    /// Whether the label names the falling class (case-insensitive).
    pub fn is_falling(&self) -> bool {
        self.label.eq_ignore_ascii_case(FALLING_LABEL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detection_validation() {
        assert!(Detection::new("falling", 0.5).is_ok());
        assert!(Detection::new("falling", 0.0).is_ok());
        assert!(Detection::new("falling", 1.0).is_ok());
        assert_eq!(Detection::new("", 0.5), Err(ModelError::EmptyLabel));
        assert_eq!(Detection::new("   ", 0.5), Err(ModelError::EmptyLabel));
        assert!(matches!(
            Detection::new("falling", 1.2),
            Err(ModelError::ConfidenceOutOfRange(_))
        ));
        assert!(Detection::new("falling", -0.1).is_err());
        assert!(Detection::new("falling", f32::NAN).is_err());
    }

    #[test]
    fn test_is_falling_case_insensitive() {
        assert!(Detection::new("Falling", 0.9).unwrap().is_falling());
        assert!(Detection::new("FALLING", 0.9).unwrap().is_falling());
        assert!(!Detection::new("fallen", 0.9).unwrap().is_falling());
        assert!(!Detection::new("person", 0.9).unwrap().is_falling());
    }

    #[test]
    fn test_iou() {
        let a = BoundingBox { x: 0.0, y: 0.0, width: 0.5, height: 0.5 };
        let b = BoundingBox { x: 0.25, y: 0.0, width: 0.5, height: 0.5 };
        let far = BoundingBox { x: 0.8, y: 0.8, width: 0.1, height: 0.1 };

        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
        assert!((a.iou(&b) - (0.125 / 0.375)).abs() < 1e-6);
        assert_eq!(a.iou(&far), 0.0);
    }

    #[test]
    fn test_bbox_skipped_when_absent() {
        let json = serde_json::to_value(Detection::new("person", 0.7).unwrap()).unwrap();
        assert!(json.get("bbox").is_none());
    }
}
