//! Monitor error types.

use thiserror::Error;

use fallwatch_detect::DetectError;

pub type MonitorResult<T> = Result<T, MonitorError>;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error(transparent)]
    Detect(#[from] DetectError),

    #[error("Detector task failed: {0}")]
    Task(String),
}

impl MonitorError {
    /// Whether the failure was caused by the submitted frame or video.
    pub fn is_client_error(&self) -> bool {
        matches!(self, MonitorError::Detect(e) if e.is_client_error())
    }
}
