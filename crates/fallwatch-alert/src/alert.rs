//! Alert payloads and their rendering per channel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fallwatch_models::{AlertEvent, AlertKind};

/// A fall event together with where and when it happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub event: AlertEvent,
    /// Camera id, upload id or WebSocket session id
    pub source: String,
    /// Frame index when the alert comes from an uploaded video
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame: Option<u64>,
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    pub fn new(event: AlertEvent, source: impl Into<String>) -> Self {
        Self {
            event,
            source: source.into(),
            frame: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_frame(mut self, frame: u64) -> Self {
        self.frame = Some(frame);
        self
    }

    /// Email subject line.
    pub fn subject(&self) -> String {
        let base = match self.event.kind {
            AlertKind::FallStarted => "Fall detected",
            AlertKind::FallEnded => "Fall confirmed",
        };
        match self.frame {
            Some(_) => format!("Fall Alert from Video: {}", base),
            None => format!("{} ({})", base, self.source),
        }
    }

    /// Email body.
    pub fn body(&self) -> String {
        let text = match self.event.kind {
            AlertKind::FallStarted => format!("Confidence: {:.2}", self.event.confidence),
            AlertKind::FallEnded => "The person has fallen!".to_string(),
        };
        let mut body = match self.frame {
            Some(frame) => format!("Frame {}: {}", frame, text),
            None => text,
        };
        body.push_str(&format!(
            "\n\nSource: {}\nTime: {}",
            self.source,
            self.timestamp.to_rfc3339()
        ));
        body
    }

    /// Short text payload for topic-based brokers.
    pub fn topic_payload(&self) -> String {
        match self.event.kind {
            AlertKind::FallStarted => format!("Falling ({:.2})", self.event.confidence),
            AlertKind::FallEnded => "Fallen".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_started_rendering() {
        let alert = Alert::new(AlertEvent::started(0.953), "kitchen");
        assert_eq!(alert.subject(), "Fall detected (kitchen)");
        assert!(alert.body().starts_with("Confidence: 0.95"));
        assert_eq!(alert.topic_payload(), "Falling (0.95)");
    }

    #[test]
    fn test_ended_rendering() {
        let alert = Alert::new(AlertEvent::ended(0.9), "kitchen");
        assert_eq!(alert.subject(), "Fall confirmed (kitchen)");
        assert!(alert.body().starts_with("The person has fallen!"));
        assert_eq!(alert.topic_payload(), "Fallen");
    }

    #[test]
    fn test_video_frame_rendering() {
        let alert = Alert::new(AlertEvent::started(0.91), "upload").with_frame(42);
        assert_eq!(alert.subject(), "Fall Alert from Video: Fall detected");
        assert!(alert.body().starts_with("Frame 42: Confidence: 0.91"));

        let json = serde_json::to_value(&alert).unwrap();
        assert_eq!(json["frame"], 42);
        assert_eq!(json["event"]["kind"], "fall_started");
    }
}
