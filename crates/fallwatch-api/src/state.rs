//! Application state.

use std::sync::Arc;

use fallwatch_alert::{AlertConfig, AlertDispatcher};
use fallwatch_detect::{DetectorConfig, YoloDetector};
use fallwatch_monitor::{FallMonitor, MonitorConfig};
use tracing::info;

use crate::config::ApiConfig;
use crate::relay::FrameRelay;
use crate::sessions::SessionRegistry;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub monitor: FallMonitor,
    pub sessions: Arc<SessionRegistry>,
    pub relay: FrameRelay,
}

impl AppState {
    /// Create application state from the environment: loads the model and
    /// connects the configured alert channels.
    pub fn new(config: ApiConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let detector = YoloDetector::new(DetectorConfig::from_env())?;
        info!(model = %detector.config().model_path, "Fall detection model loaded");

        let alert_config = AlertConfig::from_env();
        let dispatcher = AlertDispatcher::from_config(&alert_config)?;
        info!("Alert channels: {:?}", dispatcher.channel_names());

        let monitor = FallMonitor::new(Arc::new(detector), dispatcher, MonitorConfig::from_env());
        Ok(Self::with_monitor(config, monitor))
    }

    /// Create application state around an existing monitor.
    pub fn with_monitor(config: ApiConfig, monitor: FallMonitor) -> Self {
        Self {
            config,
            monitor,
            sessions: Arc::new(SessionRegistry::new()),
            relay: FrameRelay::new(),
        }
    }
}
