//! Alert channel configuration.

use std::time::Duration;

/// SMTP settings. Email is enabled only when sender, password and receiver are all set.
#[derive(Clone)]
pub struct EmailConfig {
    pub host: String,
    pub port: u16,
    /// Use STARTTLS instead of implicit TLS
    pub starttls: bool,
    pub sender: String,
    pub password: String,
    pub receiver: String,
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("starttls", &self.starttls)
            .field("sender", &self.sender)
            .field("receiver", &self.receiver)
            .finish_non_exhaustive()
    }
}

/// MQTT broker settings.
#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub broker: String,
    pub port: u16,
    pub topic: String,
    pub client_id: String,
}

/// Alert delivery configuration.
#[derive(Clone)]
pub struct AlertConfig {
    pub email: Option<EmailConfig>,
    pub mqtt: Option<MqttConfig>,
    /// Redis URL for the Pub/Sub channel
    pub redis_url: Option<String>,
    /// Per-channel delivery timeout
    pub timeout: Duration,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            email: None,
            mqtt: None,
            redis_url: None,
            timeout: Duration::from_secs(10),
        }
    }
}

impl std::fmt::Debug for AlertConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertConfig")
            .field("email", &self.email)
            .field("mqtt", &self.mqtt)
            .field("redis", &self.redis_url.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl AlertConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            email: email_from_env(),
            mqtt: mqtt_from_env(),
            redis_url: non_empty_var("ALERT_REDIS_URL"),
            timeout: Duration::from_secs(
                std::env::var("ALERT_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
            ),
        }
    }

    /// Whether any channel is configured.
    pub fn has_channels(&self) -> bool {
        self.email.is_some() || self.mqtt.is_some() || self.redis_url.is_some()
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn email_from_env() -> Option<EmailConfig> {
    let sender = non_empty_var("SENDER_EMAIL")?;
    let password = non_empty_var("SENDER_PASSWORD")?;
    let receiver = non_empty_var("RECEIVER_EMAIL")?;
    let starttls = std::env::var("SMTP_STARTTLS")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false);

    Some(EmailConfig {
        host: non_empty_var("SMTP_HOST").unwrap_or_else(|| "smtp.gmail.com".to_string()),
        port: std::env::var("SMTP_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(if starttls { 587 } else { 465 }),
        starttls,
        sender,
        password,
        receiver,
    })
}

fn mqtt_from_env() -> Option<MqttConfig> {
    let broker = non_empty_var("MQTT_BROKER")?;
    Some(MqttConfig {
        broker,
        port: std::env::var("MQTT_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(1883),
        topic: non_empty_var("MQTT_TOPIC").unwrap_or_else(|| "home/fall".to_string()),
        client_id: non_empty_var("MQTT_CLIENT_ID").unwrap_or_else(|| "fallwatch".to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_has_no_channels() {
        let config = AlertConfig::default();
        assert!(!config.has_channels());
    }

    #[test]
    fn test_debug_hides_password() {
        let config = AlertConfig {
            email: Some(EmailConfig {
                host: "smtp.example.com".into(),
                port: 465,
                starttls: false,
                sender: "a@example.com".into(),
                password: "hunter2".into(),
                receiver: "b@example.com".into(),
            }),
            ..Default::default()
        };
        let debug = format!("{:?}", config);
        assert!(!debug.contains("hunter2"));
        assert!(config.has_channels());
    }
}
