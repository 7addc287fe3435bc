//! API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use fallwatch_detect::DetectError;
use fallwatch_monitor::MonitorError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Detect(#[from] DetectError),

    #[error(transparent)]
    Monitor(#[from] MonitorError),
}

impl ApiError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    fn detect_error(&self) -> Option<&DetectError> {
        match self {
            ApiError::Detect(e) | ApiError::Monitor(MonitorError::Detect(e)) => Some(e),
            _ => None,
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Detect(_) | ApiError::Monitor(_) => match self.detect_error() {
                Some(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// Machine-readable error code.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            ApiError::Validation(_) => Some("validation_error"),
            ApiError::NotFound(_) => Some("not_found"),
            ApiError::Unavailable(_) => Some("unavailable"),
            _ => match self.detect_error() {
                Some(DetectError::InvalidImage(_)) => Some("invalid_image"),
                Some(DetectError::InvalidVideo(_)) => Some("invalid_video"),
                _ => None,
            },
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Don't expose internal error details in production
        let detail = if status == StatusCode::INTERNAL_SERVER_ERROR
            && std::env::var("ENVIRONMENT").unwrap_or_default() == "production"
        {
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        };

        let body = ErrorResponse {
            detail,
            code: self.code(),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_image_is_client_error() {
        let err = ApiError::from(DetectError::invalid_image("bad base64"));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), Some("invalid_image"));
    }

    #[test]
    fn test_inference_failure_is_server_error() {
        let err = ApiError::from(MonitorError::from(DetectError::inference("session poisoned")));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.code(), None);
    }

    #[test]
    fn test_invalid_video_through_monitor() {
        let err = ApiError::from(MonitorError::Detect(DetectError::InvalidVideo("no stream".into())));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), Some("invalid_video"));
    }

    #[test]
    fn test_unavailable_status() {
        let err = ApiError::Unavailable("session limit reached".into());
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.code(), Some("unavailable"));
    }
}
