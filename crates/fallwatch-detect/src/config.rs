//! Detector configuration.

/// Configuration for the fall detection model.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Path to ONNX model file
    pub model_path: String,
    /// Class names in model output order
    pub labels: Vec<String>,
    /// Minimum score for a box to be reported at all
    pub min_confidence: f32,
    /// IoU threshold for NMS
    pub nms_threshold: f32,
    /// Input image size (model expects square input)
    pub input_size: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_path: "models/best.onnx".to_string(),
            labels: vec!["falling".to_string()],
            min_confidence: 0.25,
            nms_threshold: 0.45,
            input_size: 640,
        }
    }
}

impl DetectorConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            model_path: std::env::var("MODEL_PATH").unwrap_or(defaults.model_path),
            labels: std::env::var("MODEL_LABELS")
                .ok()
                .map(|s| parse_labels(&s))
                .filter(|labels| !labels.is_empty())
                .unwrap_or(defaults.labels),
            min_confidence: std::env::var("DETECTOR_MIN_CONFIDENCE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.min_confidence),
            nms_threshold: std::env::var("NMS_THRESHOLD")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.nms_threshold),
            input_size: std::env::var("MODEL_INPUT_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|size| *size > 0)
                .unwrap_or(defaults.input_size),
        }
    }

    /// Label for a class id, falling back to `class_<id>`.
    pub fn label(&self, class_id: usize) -> String {
        self.labels
            .get(class_id)
            .cloned()
            .unwrap_or_else(|| format!("class_{}", class_id))
    }
}

fn parse_labels(s: &str) -> Vec<String> {
    s.split(',')
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect()
}
