//! Standalone camera monitoring loop.

use std::future::Future;

use tracing::{info, warn};

use fallwatch_detect::FrameReader;
use fallwatch_models::FallState;

use crate::config::CameraConfig;
use crate::error::MonitorResult;
use crate::monitor::FallMonitor;

/// Watches one camera until shutdown or end of stream.
pub struct CameraLoop {
    monitor: FallMonitor,
    config: CameraConfig,
    state: FallState,
}

/// Counters reported when the loop stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CameraStats {
    pub frames: u64,
    pub events: u64,
    pub failed_frames: u64,
}

impl CameraLoop {
    pub fn new(monitor: FallMonitor, config: CameraConfig) -> Self {
        Self {
            monitor,
            config,
            state: FallState::new(),
        }
    }

    /// Open the camera and monitor it until `shutdown` resolves.
    ///
    /// Failing to open the camera is an error; per-frame detector failures
    /// are logged and skipped.
    pub async fn run<F>(mut self, shutdown: F) -> MonitorResult<CameraStats>
    where
        F: Future<Output = ()>,
    {
        let mut reader = FrameReader::open_device(&self.config.source())?;
        let camera_id = self.config.camera_id.clone();
        let mut stats = CameraStats::default();

        info!(camera = %camera_id, "Monitoring started. Press Ctrl+C to stop.");

        tokio::pin!(shutdown);
        loop {
            let frame = tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                frame = reader.next_frame() => frame?,
            };

            let Some(frame) = frame else {
                warn!(camera = %camera_id, "Camera stream ended");
                break;
            };
            stats.frames += 1;

            match self.monitor.process_frame(&mut self.state, frame, &camera_id).await {
                Ok((outcome, _)) => {
                    if outcome.event.is_some() {
                        stats.events += 1;
                    }
                }
                Err(e) => {
                    stats.failed_frames += 1;
                    warn!(camera = %camera_id, "Frame analysis failed: {}", e);
                }
            }
        }

        reader.close().await?;
        info!(
            camera = %camera_id,
            frames = stats.frames,
            events = stats.events,
            failed = stats.failed_frames,
            "Monitoring stopped"
        );
        Ok(stats)
    }
}
