//! Detector trait.

use image::DynamicImage;

use crate::error::DetectResult;
use fallwatch_models::Detection;

/// Object detector over decoded frames.
///
/// Implementations are synchronous and may be CPU heavy; async callers
/// should run them on a blocking thread.
pub trait FrameDetector: Send + Sync {
    /// Detect objects in one frame.
    fn detect(&self, image: &DynamicImage) -> DetectResult<Vec<Detection>>;

    /// Detector name for logging.
    fn name(&self) -> &'static str;
}
