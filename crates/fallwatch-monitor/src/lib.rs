//! Fall monitoring pipeline.
//!
//! This crate provides:
//! - `FallMonitor`: detector → state machine → alert channels per frame
//! - Video file scanning with a per-upload state machine
//! - The desktop camera loop behind the `fallwatch-camera` binary

pub mod camera;
pub mod config;
pub mod error;
pub mod logging;
pub mod monitor;

pub use camera::{CameraLoop, CameraStats};
pub use config::{CameraConfig, MonitorConfig};
pub use error::{MonitorError, MonitorResult};
pub use monitor::{FallMonitor, FrameOutcome};
