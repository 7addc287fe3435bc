//! MQTT topic alerts.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::alert::Alert;
use crate::channel::AlertChannel;
use crate::config::MqttConfig;
use crate::error::{AlertError, AlertResult};

/// Delay before polling again after a connection error.
const RECONNECT_DELAY: Duration = Duration::from_secs(4);

/// Publishes alert text to an MQTT topic.
pub struct MqttChannel {
    client: AsyncClient,
    topic: String,
    /// Set on `ConnAck`, cleared on any connection error
    connected: Arc<AtomicBool>,
    event_loop: JoinHandle<()>,
}

impl MqttChannel {
    /// Connect to the broker. Must be called inside a Tokio runtime.
    pub fn connect(config: &MqttConfig) -> Self {
        let mut options = MqttOptions::new(&config.client_id, &config.broker, config.port);
        options.set_keep_alive(Duration::from_secs(60));

        let (client, event_loop) = AsyncClient::new(options, 16);
        let connected = Arc::new(AtomicBool::new(false));
        let event_loop = tokio::spawn(drive(event_loop, Arc::clone(&connected)));

        info!(broker = %config.broker, port = config.port, topic = %config.topic, "MQTT alerts enabled");

        Self {
            client,
            topic: config.topic.clone(),
            connected,
            event_loop,
        }
    }

    /// Whether the broker has acknowledged the current connection.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

/// Poll the connection forever; rumqttc reconnects on the next poll.
async fn drive(mut event_loop: EventLoop, connected: Arc<AtomicBool>) {
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                connected.store(true, Ordering::Release);
                info!("MQTT connected");
            }
            Ok(_) => {}
            Err(e) => {
                connected.store(false, Ordering::Release);
                warn!("MQTT connection error: {}", e);
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

impl Drop for MqttChannel {
    fn drop(&mut self) {
        self.event_loop.abort();
    }
}

#[async_trait]
impl AlertChannel for MqttChannel {
    fn name(&self) -> &'static str {
        "mqtt"
    }

    async fn notify(&self, alert: &Alert) -> AlertResult<()> {
        // publish() only queues; fail instead of reporting a queued alert as delivered
        if !self.is_connected() {
            return Err(AlertError::NotConnected("MQTT"));
        }
        let payload = alert.topic_payload();
        self.client
            .publish(&self.topic, QoS::AtLeastOnce, false, payload.into_bytes())
            .await?;
        debug!(topic = %self.topic, "Alert published to MQTT");
        Ok(())
    }

    async fn check(&self) -> AlertResult<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(AlertError::NotConnected("MQTT"))
        }
    }
}
