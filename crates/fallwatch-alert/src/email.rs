//! SMTP email alerts.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, info};

use crate::alert::Alert;
use crate::channel::AlertChannel;
use crate::config::EmailConfig;
use crate::error::{AlertError, AlertResult};

/// Sends alerts as plain-text email.
pub struct EmailChannel {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl EmailChannel {
    pub fn new(config: &EmailConfig) -> AlertResult<Self> {
        let from: Mailbox = config
            .sender
            .parse()
            .map_err(|e| AlertError::config(format!("Invalid sender address: {}", e)))?;
        let to: Mailbox = config
            .receiver
            .parse()
            .map_err(|e| AlertError::config(format!("Invalid receiver address: {}", e)))?;

        let builder = if config.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
        }
        .map_err(|e| AlertError::config(format!("Invalid SMTP relay {}: {}", config.host, e)))?;

        let mailer = builder
            .port(config.port)
            .credentials(Credentials::new(
                config.sender.clone(),
                config.password.clone(),
            ))
            .build();

        info!(host = %config.host, port = config.port, receiver = %config.receiver, "Email alerts enabled");

        Ok(Self { mailer, from, to })
    }

    fn build_message(&self, alert: &Alert) -> AlertResult<Message> {
        Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(alert.subject())
            .header(ContentType::TEXT_PLAIN)
            .body(alert.body())
            .map_err(|e| AlertError::email(format!("Failed to build message: {}", e)))
    }
}

#[async_trait]
impl AlertChannel for EmailChannel {
    fn name(&self) -> &'static str {
        "email"
    }

    async fn notify(&self, alert: &Alert) -> AlertResult<()> {
        let message = self.build_message(alert)?;
        self.mailer
            .send(message)
            .await
            .map_err(|e| AlertError::email(e.to_string()))?;
        debug!(receiver = %self.to, "Alert email sent");
        Ok(())
    }

    async fn check(&self) -> AlertResult<()> {
        match self.mailer.test_connection().await {
            Ok(true) => Ok(()),
            Ok(false) => Err(AlertError::email("SMTP server rejected connection test")),
            Err(e) => Err(AlertError::email(e.to_string())),
        }
    }
}
