//! Fall alert delivery.
//!
//! This crate provides:
//! - The `AlertChannel` trait
//! - Email (SMTP), MQTT topic and Redis Pub/Sub channels
//! - A best-effort dispatcher with per-channel timeouts

pub mod alert;
pub mod channel;
pub mod config;
pub mod dispatcher;
pub mod email;
pub mod error;
pub mod mqtt;
pub mod redis_pubsub;

pub use alert::Alert;
pub use channel::AlertChannel;
pub use config::{AlertConfig, EmailConfig, MqttConfig};
pub use dispatcher::AlertDispatcher;
pub use email::EmailChannel;
pub use error::{AlertError, AlertResult};
pub use mqtt::MqttChannel;
pub use redis_pubsub::RedisChannel;
