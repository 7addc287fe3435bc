//! WebSocket message types for the detection stream.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::report::DetectResponse;

/// WebSocket message envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    /// Analysis result for one submitted frame
    Result {
        #[serde(flatten)]
        response: DetectResponse,
        timestamp: DateTime<Utc>,
    },

    /// Error message
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
        timestamp: DateTime<Utc>,
    },
}

impl WsMessage {
    /// Create a result message.
    pub fn result(response: DetectResponse) -> Self {
        WsMessage::Result {
            response,
            timestamp: Utc::now(),
        }
    }

    /// Create an error message.
    pub fn error(message: impl Into<String>) -> Self {
        WsMessage::Error {
            message: message.into(),
            code: None,
            timestamp: Utc::now(),
        }
    }

    /// Create an error message with a machine-readable code.
    pub fn error_with_code(message: impl Into<String>, code: impl Into<String>) -> Self {
        WsMessage::Error {
            message: message.into(),
            code: Some(code.into()),
            timestamp: Utc::now(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            WsMessage::Result { .. } => "result",
            WsMessage::Error { .. } => "error",
        }
    }
}
