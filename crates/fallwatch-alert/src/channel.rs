//! Alert channel trait.

use async_trait::async_trait;

use crate::alert::Alert;
use crate::error::AlertResult;

/// Outbound notification mechanism.
#[async_trait]
pub trait AlertChannel: Send + Sync {
    /// Channel name for logging and metrics.
    fn name(&self) -> &'static str;

    /// Deliver one alert.
    async fn notify(&self, alert: &Alert) -> AlertResult<()>;

    /// Connectivity check used by the readiness probe.
    async fn check(&self) -> AlertResult<()> {
        Ok(())
    }
}
