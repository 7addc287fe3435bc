//! Alert delivery error types.

use thiserror::Error;

pub type AlertResult<T> = Result<T, AlertError>;

#[derive(Debug, Error)]
pub enum AlertError {
    #[error("Invalid alert configuration: {0}")]
    Config(String),

    #[error("Email delivery failed: {0}")]
    Email(String),

    #[error("{0} broker not connected")]
    NotConnected(&'static str),

    #[error("MQTT publish failed: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Delivery timed out after {0} seconds")]
    Timeout(u64),
}

impl AlertError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn email(msg: impl Into<String>) -> Self {
        Self::Email(msg.into())
    }
}
