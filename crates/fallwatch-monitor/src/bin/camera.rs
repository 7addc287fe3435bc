//! Desktop camera fall monitor.

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info};

use fallwatch_alert::{AlertConfig, AlertDispatcher};
use fallwatch_detect::{DetectorConfig, YoloDetector};
use fallwatch_monitor::logging::init_tracing;
use fallwatch_monitor::{CameraConfig, CameraLoop, FallMonitor, MonitorConfig};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // Install rustls crypto provider (required for rustls 0.23+)
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        eprintln!("rustls crypto provider already installed");
    }

    init_tracing();
    info!("Starting fallwatch-camera");

    if let Err(e) = run().await {
        error!("{:#}", e);
        std::process::exit(1);
    }

    info!("Camera monitor shutdown complete");
}

async fn run() -> anyhow::Result<()> {
    let monitor_config = MonitorConfig::from_env();
    let camera_config = CameraConfig::from_env();
    let alert_config = AlertConfig::from_env();
    info!(
        threshold = monitor_config.confidence_threshold,
        "Camera config: {:?}, alerts: {:?}", camera_config, alert_config
    );

    let detector = YoloDetector::new(DetectorConfig::from_env()).context("Failed to load fall detection model")?;
    let dispatcher = AlertDispatcher::from_config(&alert_config).context("Failed to configure alert channels")?;
    let monitor = FallMonitor::new(Arc::new(detector), dispatcher, monitor_config);

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let stats = CameraLoop::new(monitor, camera_config)
        .run(shutdown)
        .await
        .context("Camera monitoring failed")?;

    info!(frames = stats.frames, events = stats.events, "Camera monitor finished");
    Ok(())
}
