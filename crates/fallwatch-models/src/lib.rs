//! Shared data models for the fallwatch services.
//!
//! This crate provides Serde-serializable types for:
//! - Per-frame detections produced by the model
//! - Fall alert events and the per-session fall state machine
//! - HTTP response payloads
//! - WebSocket message schemas

pub mod detection;
pub mod error;
pub mod event;
pub mod fall_state;
pub mod report;
pub mod ws;

// Re-export common types
pub use detection::{BoundingBox, Detection, FALLING_LABEL};
pub use error::{ModelError, ModelResult};
pub use event::{AlertEvent, AlertKind};
pub use fall_state::{best_qualifying, FallPhase, FallState, DEFAULT_CONFIDENCE_THRESHOLD};
pub use report::{DetectResponse, DispatchSummary, FrameEvent, VideoReport};
pub use ws::WsMessage;
