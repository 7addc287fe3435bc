//! Axum HTTP/WS fall detection service.
//!
//! This crate provides:
//! - Frame and video upload analysis with per-camera fall sessions
//! - A WebSocket camera relay and a WebSocket detection stream
//! - Rate limiting, security headers and Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod relay;
pub mod routes;
pub mod security;
pub mod sessions;
pub mod state;
pub mod ws;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use relay::{FrameRelay, RelayRole};
pub use routes::create_router;
pub use sessions::{CameraSession, CameraSnapshot, SessionRegistry};
pub use state::AppState;
