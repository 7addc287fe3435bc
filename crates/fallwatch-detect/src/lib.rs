//! Fall detection model and frame sources.
//!
//! This crate provides:
//! - The `FrameDetector` trait and a YOLOv8 ONNX implementation
//! - Base64 / data-URL still frame decoding
//! - FFprobe metadata and an FFmpeg raw frame reader for files and cameras

pub mod config;
pub mod detector;
pub mod error;
pub mod frame;
pub mod probe;
pub mod reader;
pub mod yolo;

pub use config::DetectorConfig;
pub use detector::FrameDetector;
pub use error::{DetectError, DetectResult};
pub use frame::{decode_base64_image, decode_image_bytes, strip_data_url};
pub use probe::{probe_video, VideoInfo};
pub use reader::{output_size, CameraSource, FrameReader, FrameSource};
pub use yolo::YoloDetector;
