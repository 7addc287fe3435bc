//! Alerts via Redis Pub/Sub.

use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::debug;

use crate::alert::Alert;
use crate::channel::AlertChannel;
use crate::error::AlertResult;

/// Publishes alerts as JSON on a per-source Redis channel.
pub struct RedisChannel {
    client: redis::Client,
}

impl RedisChannel {
    pub fn new(redis_url: &str) -> AlertResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }

    /// Get the channel name for a source.
    pub fn channel_name(source: &str) -> String {
        format!("fallwatch:alerts:{}", source)
    }
}

#[async_trait]
impl AlertChannel for RedisChannel {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn notify(&self, alert: &Alert) -> AlertResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let channel = Self::channel_name(&alert.source);
        let payload = serde_json::to_string(alert)?;

        debug!("Publishing alert to {}", channel);
        conn.publish::<_, _, ()>(channel, payload).await?;

        Ok(())
    }

    async fn check(&self) -> AlertResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_name() {
        assert_eq!(RedisChannel::channel_name("kitchen"), "fallwatch:alerts:kitchen");
    }

    #[test]
    fn test_invalid_url_rejected() {
        assert!(RedisChannel::new("not a url").is_err());
    }
}
