//! Fall event debouncing state machine.
//!
//! Turns the raw per-frame detector output into a minimal sequence of
//! alert events. Every frame containing a qualifying "falling" detection
//! toggles the state and emits exactly one event:
//!
//! | Phase | Qualifying frame | Next phase |
//! |-------|------------------|------------|
//! | `Idle` | emit `FallStarted` | `FallInProgress` |
//! | `FallInProgress` | emit `FallEnded` | `Idle` |
//!
//! Frames without a qualifying detection never change the state. There is
//! no timeout: an episode that is never re-observed stays latched in
//! `FallInProgress` until the next qualifying frame or an explicit
//! [`FallState::reset`].

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::detection::Detection;
use crate::event::AlertEvent;

/// Default confidence threshold (exclusive).
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.8;

/// Phase of a monitored source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum FallPhase {
    #[default]
    Idle,
    FallInProgress,
}

/// Fall state of one monitored source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub struct FallState {
    /// Whether a fall episode is currently in progress.
    detected: bool,
}

impl FallState {
    /// Fresh state for a new session.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn detected(&self) -> bool {
        self.detected
    }

    pub fn phase(&self) -> FallPhase {
        if self.detected {
            FallPhase::FallInProgress
        } else {
            FallPhase::Idle
        }
    }

    /// Pure transition: consume the state and one frame of detections,
    /// return the next state and the event emitted for the frame, if any.
    pub fn transition(self, detections: &[Detection], threshold: f32) -> (Self, Option<AlertEvent>) {
        let Some(best) = best_qualifying(detections, threshold) else {
            return (self, None);
        };

        let confidence = best.confidence;
        if self.detected {
            (Self { detected: false }, Some(AlertEvent::ended(confidence)))
        } else {
            (Self { detected: true }, Some(AlertEvent::started(confidence)))
        }
    }

    /// Observe one frame, updating the state in place.
    pub fn observe(&mut self, detections: &[Detection], threshold: f32) -> Option<AlertEvent> {
        let (next, event) = self.transition(detections, threshold);
        *self = next;
        event
    }

    /// Operator reset back to `Idle`. Emits nothing.
    pub fn reset(&mut self) {
        self.detected = false;
    }
}

/// Select the best qualifying detection of a frame.
///
/// A detection qualifies when its label is "falling" (case-insensitive) and
/// its confidence is strictly greater than `threshold`. The running best is
/// only replaced by a strictly greater confidence, so ties keep the first
/// detection seen.
pub fn best_qualifying(detections: &[Detection], threshold: f32) -> Option<&Detection> {
    let mut best: Option<&Detection> = None;
    for detection in detections {
        if !detection.is_falling() || detection.confidence <= threshold {
            continue;
        }
        match best {
            Some(current) if detection.confidence <= current.confidence => {}
            _ => best = Some(detection),
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::AlertKind;

    const T: f32 = DEFAULT_CONFIDENCE_THRESHOLD;

    fn det(label: &str, confidence: f32) -> Detection {
        Detection::new(label, confidence).unwrap()
    }

    fn falling(confidence: f32) -> Vec<Detection> {
        vec![det("falling", confidence)]
    }

    #[test]
    fn test_initial_state_is_idle() {
        let state = FallState::new();
        assert!(!state.detected());
        assert_eq!(state.phase(), FallPhase::Idle);
    }

    #[test]
    fn test_fall_started_from_idle() {
        let mut state = FallState::new();
        let event = state.observe(&falling(0.95), T).unwrap();

        assert_eq!(event.kind, AlertKind::FallStarted);
        assert!((event.confidence - 0.95).abs() < 1e-6);
        assert_eq!(state.phase(), FallPhase::FallInProgress);
    }

    #[test]
    fn test_non_falling_frame_in_progress_is_noop() {
        let mut state = FallState::new();
        state.observe(&falling(0.95), T);

        assert!(state.observe(&[det("person", 0.99)], T).is_none());
        assert_eq!(state.phase(), FallPhase::FallInProgress);
    }

    #[test]
    fn test_highest_confidence_wins() {
        let mut state = FallState::new();
        let event = state
            .observe(&[det("falling", 0.85), det("falling", 0.91)], T)
            .unwrap();

        assert_eq!(event.kind, AlertKind::FallStarted);
        assert!((event.confidence - 0.91).abs() < 1e-6);
    }

    #[test]
    fn test_two_qualifying_frames_alternate() {
        let mut state = FallState::new();
        let first = state.observe(&falling(0.9), T).unwrap();
        let second = state.observe(&falling(0.9), T).unwrap();

        assert_eq!(first.kind, AlertKind::FallStarted);
        assert_eq!(second.kind, AlertKind::FallEnded);
        assert_eq!(state.phase(), FallPhase::Idle);
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let mut state = FallState::new();
        assert!(state.observe(&falling(T), T).is_none());
        assert!(!state.detected());

        let event = state.observe(&falling(T + 0.001), T);
        assert!(event.is_some());
    }

    #[test]
    fn test_non_qualifying_frames_never_change_state() {
        let frames: Vec<Vec<Detection>> = vec![
            vec![],
            vec![det("person", 0.99)],
            vec![det("falling", 0.5)],
            vec![det("falling", 0.8)],
            vec![det("fallen", 0.95), det("person", 0.3)],
        ];

        for start in [FallState::new(), FallState::new().transition(&falling(0.9), T).0] {
            for frame in &frames {
                let (next, event) = start.transition(frame, T);
                assert!(event.is_none());
                assert_eq!(next, start);
            }
        }
    }

    #[test]
    fn test_strict_alternation_with_noise() {
        let noise = vec![det("person", 0.99), det("falling", 0.2)];
        let mut state = FallState::new();
        let mut kinds = Vec::new();

        for i in 0..10 {
            for _ in 0..(i % 3) {
                assert!(state.observe(&noise, T).is_none());
            }
            kinds.push(state.observe(&falling(0.9), T).unwrap().kind);
        }

        for (i, kind) in kinds.iter().enumerate() {
            let expected = if i % 2 == 0 {
                AlertKind::FallStarted
            } else {
                AlertKind::FallEnded
            };
            assert_eq!(*kind, expected);
        }
    }

    #[test]
    fn test_tie_keeps_first_seen() {
        let a = det("falling", 0.9).with_bbox(crate::BoundingBox {
            x: 0.1,
            y: 0.1,
            width: 0.1,
            height: 0.1,
        });
        let b = det("Falling", 0.9);
        let detections = vec![a.clone(), b];

        let best = best_qualifying(&detections, T).unwrap();
        assert_eq!(best, &a);
    }

    #[test]
    fn test_mixed_case_labels_qualify() {
        let mut state = FallState::new();
        let event = state.observe(&[det("FALLING", 0.88)], T).unwrap();
        assert_eq!(event.kind, AlertKind::FallStarted);
    }

    #[test]
    fn test_reset_returns_to_idle() {
        let mut state = FallState::new();
        state.observe(&falling(0.95), T);
        state.reset();

        assert_eq!(state.phase(), FallPhase::Idle);
        let event = state.observe(&falling(0.95), T).unwrap();
        assert_eq!(event.kind, AlertKind::FallStarted);
    }

    #[test]
    fn test_latch_persists_without_qualifying_frames() {
        let mut state = FallState::new();
        state.observe(&falling(0.95), T);
        for _ in 0..1000 {
            state.observe(&[], T);
        }
        assert_eq!(state.phase(), FallPhase::FallInProgress);
    }
}
