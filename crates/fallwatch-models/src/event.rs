//! Fall alert events.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of fall event emitted by the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// First qualifying frame of an episode
    FallStarted,
    /// Qualifying frame that closes the episode
    FallEnded,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::FallStarted => "fall_started",
            AlertKind::FallEnded => "fall_ended",
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event emitted for a qualifying frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AlertEvent {
    pub kind: AlertKind,
    pub confidence: f32,
}

impl AlertEvent {
    pub fn started(confidence: f32) -> Self {
        Self {
            kind: AlertKind::FallStarted,
            confidence,
        }
    }

    pub fn ended(confidence: f32) -> Self {
        Self {
            kind: AlertKind::FallEnded,
            confidence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_event_serialization() {
        let json = serde_json::to_value(AlertEvent::started(0.95)).unwrap();
        assert_eq!(json["kind"], "fall_started");
        assert!((json["confidence"].as_f64().unwrap() - 0.95).abs() < 1e-6);

        let back: AlertEvent =
            serde_json::from_str(r#"{"kind":"fall_ended","confidence":0.9}"#).unwrap();
        assert_eq!(back.kind, AlertKind::FallEnded);
    }
}
