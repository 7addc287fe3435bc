//! Best-effort fan-out of alerts to every configured channel.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use metrics::counter;
use tracing::{info, warn};

use fallwatch_models::DispatchSummary;

use crate::alert::Alert;
use crate::channel::AlertChannel;
use crate::config::AlertConfig;
use crate::email::EmailChannel;
use crate::error::{AlertError, AlertResult};
use crate::mqtt::MqttChannel;
use crate::redis_pubsub::RedisChannel;

pub const ALERTS_DELIVERED_TOTAL: &str = "fallwatch_alerts_delivered_total";
pub const ALERTS_FAILED_TOTAL: &str = "fallwatch_alerts_failed_total";

/// Sends each alert to all channels concurrently.
///
/// Delivery failures are logged and reported, never returned as errors.
#[derive(Clone)]
pub struct AlertDispatcher {
    channels: Vec<Arc<dyn AlertChannel>>,
    timeout: Duration,
}

impl AlertDispatcher {
    pub fn new(channels: Vec<Arc<dyn AlertChannel>>, timeout: Duration) -> Self {
        Self { channels, timeout }
    }

    /// Dispatcher with no channels.
    pub fn empty() -> Self {
        Self::new(Vec::new(), Duration::from_secs(10))
    }

    /// Build the channels enabled in config. Must be called inside a Tokio runtime.
    pub fn from_config(config: &AlertConfig) -> AlertResult<Self> {
        let mut channels: Vec<Arc<dyn AlertChannel>> = Vec::new();

        if let Some(email) = &config.email {
            channels.push(Arc::new(EmailChannel::new(email)?));
        }
        if let Some(mqtt) = &config.mqtt {
            channels.push(Arc::new(MqttChannel::connect(mqtt)));
        }
        if let Some(url) = &config.redis_url {
            channels.push(Arc::new(RedisChannel::new(url)?));
        }

        if channels.is_empty() {
            warn!("No alert channels configured; fall events will only be logged");
        }

        Ok(Self::new(channels, config.timeout))
    }

    pub fn channel_names(&self) -> Vec<&'static str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn channels(&self) -> &[Arc<dyn AlertChannel>] {
        &self.channels
    }

    /// Per-channel delivery timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Deliver an alert to every channel.
    pub async fn dispatch(&self, alert: &Alert) -> DispatchSummary {
        info!(
            source = %alert.source,
            kind = %alert.event.kind,
            confidence = alert.event.confidence,
            frame = ?alert.frame,
            "Dispatching fall alert"
        );

        let deliveries = self.channels.iter().map(|channel| async move {
            let outcome = match tokio::time::timeout(self.timeout, channel.notify(alert)).await {
                Ok(result) => result,
                Err(_) => Err(AlertError::Timeout(self.timeout.as_secs())),
            };
            (channel.name(), outcome)
        });

        let mut summary = DispatchSummary::default();
        for (name, outcome) in join_all(deliveries).await {
            let labels = [("channel", name.to_string())];
            match outcome {
                Ok(()) => {
                    counter!(ALERTS_DELIVERED_TOTAL, &labels).increment(1);
                    summary.delivered.push(name.to_string());
                }
                Err(e) => {
                    warn!(channel = name, source = %alert.source, "Alert delivery failed: {}", e);
                    counter!(ALERTS_FAILED_TOTAL, &labels).increment(1);
                    summary.failed.push(name.to_string());
                }
            }
        }
        summary
    }
}
