//! Fall detection using a YOLOv8 ONNX model.
//!
//! Provides GPU acceleration where available:
//! - CUDA on Linux with NVIDIA GPU
//! - CoreML on macOS with Apple Silicon
//! - CPU fallback on all platforms

use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;

use image::{DynamicImage, GenericImageView};
use ndarray::Array;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{Tensor, Value};
use tracing::{debug, info, warn};

use fallwatch_models::{BoundingBox, Detection};

use crate::config::DetectorConfig;
use crate::detector::FrameDetector;
use crate::error::{DetectError, DetectResult};

/// Raw candidate box decoded from the model output.
#[derive(Debug, Clone, PartialEq)]
struct Candidate {
    class_id: usize,
    confidence: f32,
    bbox: BoundingBox,
}

/// Detector backed by a YOLOv8 model exported to ONNX.
pub struct YoloDetector {
    session: Mutex<Session>,
    config: DetectorConfig,
}

impl YoloDetector {
    /// Create a new detector from config.
    ///
    /// Returns error if model file doesn't exist or cannot be loaded.
    pub fn new(config: DetectorConfig) -> DetectResult<Self> {
        let model_path = Path::new(&config.model_path);
        if !model_path.exists() {
            return Err(DetectError::model_not_found(&config.model_path));
        }

        let session = Mutex::new(create_session(model_path)?);
        info!(
            model_path = %config.model_path,
            input_size = config.input_size,
            labels = config.labels.len(),
            "Fall detector initialized"
        );

        Ok(Self { session, config })
    }

    /// Get the configuration.
    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Resize to the model input size and convert to a normalized NCHW tensor.
    fn preprocess(&self, img: &DynamicImage) -> DetectResult<Value> {
        let input_size = self.config.input_size;

        let resized = img.resize_exact(
            input_size,
            input_size,
            image::imageops::FilterType::Triangle,
        );

        let rgb = resized.to_rgb8();
        let (w, h) = (input_size as usize, input_size as usize);

        // HWC -> CHW with normalization to [0, 1]
        let mut chw_data: Vec<f32> = vec![0.0; 3 * h * w];
        for (x, y, pixel) in rgb.enumerate_pixels() {
            let offset = y as usize * w + x as usize;
            for c in 0..3 {
                chw_data[c * h * w + offset] = pixel[c] as f32 / 255.0;
            }
        }

        let shape = vec![1usize, 3, h, w];
        Tensor::from_array((shape, chw_data.into_boxed_slice()))
            .map(Value::from)
            .map_err(|e| DetectError::internal(format!("Failed to create tensor: {}", e)))
    }

    /// Returns the output dimensions together with the flat output data.
    fn run_inference(&self, input: Value) -> DetectResult<(Vec<usize>, Vec<f32>)> {
        let mut session = self
            .session
            .lock()
            .map_err(|_| DetectError::internal("Session lock poisoned"))?;

        let outputs = session
            .run(ort::inputs![input])
            .map_err(|e| DetectError::inference(format!("ONNX inference failed: {}", e)))?;

        // YOLOv8 output is [1, 4 + classes, boxes]
        let output = outputs
            .get("output0")
            .ok_or_else(|| DetectError::inference("Missing output0 tensor"))?;

        let (shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectError::inference(format!("Failed to extract tensor: {}", e)))?;

        let raw_dims: Vec<i64> = shape.iter().copied().collect();
        let dims = raw_dims
            .iter()
            .map(|&d| usize::try_from(d))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| DetectError::inference(format!("Dynamic output shape {:?}", raw_dims)))?;

        Ok((dims, data.to_vec()))
    }
}

impl FrameDetector for YoloDetector {
    fn detect(&self, image: &DynamicImage) -> DetectResult<Vec<Detection>> {
        let start = Instant::now();
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(DetectError::invalid_image("Empty frame"));
        }

        let input = self.preprocess(image)?;
        let (dims, outputs) = self.run_inference(input)?;

        let candidates = decode_output(
            &outputs,
            &dims,
            self.config.input_size,
            width,
            height,
            self.config.min_confidence,
        )?;
        let kept = non_maximum_suppression(candidates, self.config.nms_threshold);

        let mut detections = Vec::with_capacity(kept.len());
        for candidate in kept {
            let label = self.config.label(candidate.class_id);
            match Detection::new(label, candidate.confidence) {
                Ok(d) => detections.push(d.with_bbox(candidate.bbox)),
                Err(e) => warn!(class_id = candidate.class_id, "Dropping malformed detection: {}", e),
            }
        }

        debug!(
            count = detections.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Fall detection completed"
        );

        Ok(detections)
    }

    fn name(&self) -> &'static str {
        "yolov8-onnx"
    }
}

/// Decode a YOLOv8 output tensor.
///
/// Output format: `[1, 4 + num_classes, num_boxes]`, where the first four
/// rows are the box in center format (model pixels) and the remaining rows
/// are per-class scores. The class count comes from the tensor shape, not
/// from the configured labels.
fn decode_output(
    outputs: &[f32],
    dims: &[usize],
    input_size: u32,
    orig_width: u32,
    orig_height: u32,
    min_confidence: f32,
) -> DetectResult<Vec<Candidate>> {
    let (num_features, num_boxes) = match *dims {
        [1, features, boxes] if features > 4 && features * boxes == outputs.len() => (features, boxes),
        _ => {
            return Err(DetectError::inference(format!(
                "Unexpected output shape {:?} with {} values",
                dims,
                outputs.len()
            )))
        }
    };
    let num_classes = num_features - 4;

    // Reshape [features, boxes] and transpose to [boxes, features]
    let output_array = Array::from_shape_vec((num_features, num_boxes), outputs.to_vec())
        .map_err(|e| DetectError::inference(format!("Failed to reshape output: {}", e)))?;
    let transposed = output_array.t();

    let input_size = input_size as f32;
    let scale_w = orig_width as f32 / input_size;
    let scale_h = orig_height as f32 / input_size;

    let mut candidates = Vec::new();
    for i in 0..num_boxes {
        let mut best_class = 0;
        let mut best_score = 0.0f32;
        for c in 0..num_classes {
            let score = transposed[[i, 4 + c]];
            if score > best_score {
                best_score = score;
                best_class = c;
            }
        }

        if best_score < min_confidence || best_score > 1.0 {
            continue;
        }

        let cx = transposed[[i, 0]];
        let cy = transposed[[i, 1]];
        let w = transposed[[i, 2]];
        let h = transposed[[i, 3]];

        // Center format in model pixels -> normalized corner format
        let x = ((cx - w / 2.0) * scale_w / orig_width as f32).clamp(0.0, 1.0);
        let y = ((cy - h / 2.0) * scale_h / orig_height as f32).clamp(0.0, 1.0);
        let width = (w * scale_w / orig_width as f32).min(1.0 - x).max(0.0);
        let height = (h * scale_h / orig_height as f32).min(1.0 - y).max(0.0);

        candidates.push(Candidate {
            class_id: best_class,
            confidence: best_score,
            bbox: BoundingBox { x, y, width, height },
        });
    }

    Ok(candidates)
}

/// Class-wise Non-Maximum Suppression.
fn non_maximum_suppression(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        let overlaps = keep.iter().any(|k| {
            k.class_id == candidate.class_id && k.bbox.iou(&candidate.bbox) > iou_threshold
        });
        if !overlaps {
            keep.push(candidate);
        }
    }
    keep
}

/// Create ONNX Runtime session with automatic execution provider selection.
fn create_session(model_path: &Path) -> DetectResult<Session> {
    let model_bytes = std::fs::read(model_path)
        .map_err(|e| DetectError::internal(format!("Failed to read model file: {}", e)))?;

    let builder = Session::builder()
        .map_err(|e| DetectError::internal(format!("Failed to create session builder: {}", e)))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| DetectError::internal(format!("Failed to set optimization level: {}", e)))?;

    #[cfg(all(target_os = "linux", feature = "cuda"))]
    {
        use ort::execution_providers::CUDAExecutionProvider;
        if let Ok(cuda_builder) = builder
            .clone()
            .with_execution_providers([CUDAExecutionProvider::default().build()])
        {
            if let Ok(session) = cuda_builder.commit_from_memory(&model_bytes) {
                info!("Using CUDA execution provider for fall detection");
                return Ok(session);
            }
        }
        debug!("CUDA execution provider not available, trying alternatives");
    }

    #[cfg(target_os = "macos")]
    {
        use ort::execution_providers::CoreMLExecutionProvider;
        if let Ok(coreml_builder) = builder
            .clone()
            .with_execution_providers([CoreMLExecutionProvider::default().build()])
        {
            if let Ok(session) = coreml_builder.commit_from_memory(&model_bytes) {
                info!("Using CoreML execution provider for fall detection");
                return Ok(session);
            }
        }
        debug!("CoreML execution provider not available, using CPU");
    }

    info!("Using CPU execution provider for fall detection");
    builder
        .commit_from_memory(&model_bytes)
        .map_err(|e| DetectError::internal(format!("Failed to load ONNX model: {}", e)))
}
