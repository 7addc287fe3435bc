//! Per-camera fall sessions.
//!
//! Each camera id owns exactly one `FallState`. Frames for the same camera
//! are observed under that camera's mutex, so concurrent requests still see
//! a serial sequence of observations.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::warn;

use fallwatch_models::{AlertEvent, Detection, FallPhase, FallState};
use fallwatch_monitor::{FallMonitor, FrameOutcome};

/// One monitored source and its bookkeeping.
#[derive(Debug, Clone)]
pub struct CameraSession {
    camera_id: String,
    state: FallState,
    frames: u64,
    events: u64,
    last_event: Option<AlertEvent>,
    last_event_at: Option<DateTime<Utc>>,
    last_seen: DateTime<Utc>,
}

/// Serializable view of a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CameraSnapshot {
    pub camera_id: String,
    pub phase: FallPhase,
    pub detected: bool,
    pub frames: u64,
    pub events: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_event: Option<AlertEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_event_at: Option<DateTime<Utc>>,
    pub last_seen: DateTime<Utc>,
}

impl CameraSession {
    pub fn new(camera_id: impl Into<String>) -> Self {
        Self {
            camera_id: camera_id.into(),
            state: FallState::new(),
            frames: 0,
            events: 0,
            last_event: None,
            last_event_at: None,
            last_seen: Utc::now(),
        }
    }

    pub fn camera_id(&self) -> &str {
        &self.camera_id
    }

    pub fn state(&self) -> FallState {
        self.state
    }

    /// Run one frame of detections through this session's state machine.
    pub fn observe(&mut self, monitor: &FallMonitor, detections: &[Detection]) -> FrameOutcome {
        let outcome = monitor.observe(&mut self.state, detections);
        let now = Utc::now();
        self.frames += 1;
        self.last_seen = now;
        if let Some(event) = outcome.event {
            self.events += 1;
            self.last_event = Some(event);
            self.last_event_at = Some(now);
        }
        outcome
    }

    /// Operator reset: back to `Idle` without emitting an event.
    pub fn reset(&mut self) {
        self.state.reset();
        self.last_seen = Utc::now();
    }

    pub fn snapshot(&self) -> CameraSnapshot {
        CameraSnapshot {
            camera_id: self.camera_id.clone(),
            phase: self.state.phase(),
            detected: self.state.detected(),
            frames: self.frames,
            events: self.events,
            last_event: self.last_event,
            last_event_at: self.last_event_at,
            last_seen: self.last_seen,
        }
    }
}

pub type SharedSession = Arc<Mutex<CameraSession>>;

/// Upper bound on tracked camera sessions.
pub const MAX_SESSIONS: usize = 10_000;

/// How long an idle camera is kept after its last frame.
pub const SESSION_IDLE_TTL: TimeDelta = TimeDelta::hours(1);

/// Registry of HTTP camera sessions, keyed by camera id.
///
/// Only sessions in the `Idle` phase are ever evicted, so an open fall
/// episode is never forgotten.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, SharedSession>>,
    max_sessions: usize,
    idle_ttl: TimeDelta,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::with_limits(MAX_SESSIONS, SESSION_IDLE_TTL)
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(max_sessions: usize, idle_ttl: TimeDelta) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_sessions: max_sessions.max(1),
            idle_ttl,
        }
    }

    /// Get or create the session for a camera.
    ///
    /// Returns `None` when the registry is full and no idle session can be
    /// evicted to make room.
    pub async fn get_or_create(&self, camera_id: &str) -> Option<SharedSession> {
        {
            let sessions = self.sessions.read().await;
            if let Some(session) = sessions.get(camera_id) {
                return Some(Arc::clone(session));
            }
        }

        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get(camera_id) {
            return Some(Arc::clone(session));
        }

        if sessions.len() >= self.max_sessions {
            self.evict(&mut sessions, Utc::now());
            if sessions.len() >= self.max_sessions {
                warn!(camera = camera_id, "Camera session limit reached");
                return None;
            }
        }

        let session = Arc::new(Mutex::new(CameraSession::new(camera_id)));
        sessions.insert(camera_id.to_string(), Arc::clone(&session));
        Some(session)
    }

    /// Drop expired idle sessions, then the least recently seen idle ones
    /// while at capacity. Sessions referenced outside the registry are in
    /// use and are kept.
    fn evict(&self, sessions: &mut HashMap<String, SharedSession>, now: DateTime<Utc>) {
        let mut idle: Vec<(String, DateTime<Utc>)> = sessions
            .iter()
            .filter(|(_, session)| Arc::strong_count(session) == 1)
            .filter_map(|(id, session)| {
                let session = session.try_lock().ok()?;
                (session.state.phase() == FallPhase::Idle).then(|| (id.clone(), session.last_seen))
            })
            .collect();
        idle.sort_by_key(|(_, last_seen)| *last_seen);

        let before = sessions.len();
        let mut idle = idle.into_iter().peekable();
        while let Some((_, last_seen)) = idle.peek() {
            if now - *last_seen < self.idle_ttl {
                break;
            }
            if let Some((id, _)) = idle.next() {
                sessions.remove(&id);
            }
        }
        for (id, _) in idle {
            if sessions.len() < self.max_sessions {
                break;
            }
            sessions.remove(&id);
        }

        let evicted = before - sessions.len();
        if evicted > 0 {
            warn!("Camera session registry full, evicted {} idle sessions", evicted);
        }
    }

    pub async fn get(&self, camera_id: &str) -> Option<SharedSession> {
        self.sessions.read().await.get(camera_id).cloned()
    }

    pub async fn snapshot(&self, camera_id: &str) -> Option<CameraSnapshot> {
        let session = self.get(camera_id).await?;
        let snapshot = session.lock().await.snapshot();
        Some(snapshot)
    }

    /// Snapshots of every session, ordered by camera id.
    pub async fn list(&self) -> Vec<CameraSnapshot> {
        let sessions: Vec<SharedSession> = self.sessions.read().await.values().cloned().collect();
        let mut snapshots = Vec::with_capacity(sessions.len());
        for session in sessions {
            snapshots.push(session.lock().await.snapshot());
        }
        snapshots.sort_by(|a, b| a.camera_id.cmp(&b.camera_id));
        snapshots
    }

    /// Reset a camera's latch. Returns `None` for unknown cameras.
    pub async fn reset(&self, camera_id: &str) -> Option<CameraSnapshot> {
        let session = self.get(camera_id).await?;
        let mut session = session.lock().await;
        session.reset();
        Some(session.snapshot())
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fallwatch_alert::AlertDispatcher;
    use fallwatch_detect::{DetectResult, FrameDetector};
    use fallwatch_models::AlertKind;
    use fallwatch_monitor::MonitorConfig;
    use image::DynamicImage;

    struct NoopDetector;

    impl FrameDetector for NoopDetector {
        fn detect(&self, _image: &DynamicImage) -> DetectResult<Vec<Detection>> {
            Ok(Vec::new())
        }

        fn name(&self) -> &'static str {
            "noop"
        }
    }

    fn monitor() -> FallMonitor {
        FallMonitor::new(
            Arc::new(NoopDetector),
            AlertDispatcher::empty(),
            MonitorConfig::default(),
        )
    }

    fn falling(confidence: f32) -> Vec<Detection> {
        vec![Detection::new("falling", confidence).unwrap()]
    }

    #[test]
    fn test_session_bookkeeping() {
        let monitor = monitor();
        let mut session = CameraSession::new("cam");

        session.observe(&monitor, &[]);
        let outcome = session.observe(&monitor, &falling(0.95));
        assert_eq!(outcome.event.map(|e| e.kind), Some(AlertKind::FallStarted));

        let snapshot = session.snapshot();
        assert_eq!(snapshot.frames, 2);
        assert_eq!(snapshot.events, 1);
        assert_eq!(snapshot.phase, FallPhase::FallInProgress);
        assert!(snapshot.last_event_at.is_some());
    }

    #[test]
    fn test_reset_keeps_history() {
        let monitor = monitor();
        let mut session = CameraSession::new("cam");
        session.observe(&monitor, &falling(0.95));

        session.reset();
        let snapshot = session.snapshot();
        assert!(!snapshot.detected);
        assert_eq!(snapshot.events, 1);

        let outcome = session.observe(&monitor, &falling(0.9));
        assert_eq!(outcome.event.map(|e| e.kind), Some(AlertKind::FallStarted));
    }

    #[tokio::test]
    async fn test_registry_isolates_cameras() {
        let monitor = monitor();
        let registry = SessionRegistry::new();

        let a = registry.get_or_create("a").await.unwrap();
        a.lock().await.observe(&monitor, &falling(0.95));
        let b = registry.get_or_create("b").await.unwrap();

        assert!(a.lock().await.state().detected());
        assert!(!b.lock().await.state().detected());
        assert!(Arc::ptr_eq(&a, &registry.get_or_create("a").await.unwrap()));

        let ids: Vec<_> = registry.list().await.into_iter().map(|s| s.camera_id).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_registry_reset_unknown_camera() {
        let registry = SessionRegistry::new();
        assert!(registry.reset("ghost").await.is_none());
        assert!(registry.snapshot("ghost").await.is_none());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_full_registry_evicts_oldest_idle_session() {
        let monitor = monitor();
        let registry = SessionRegistry::with_limits(2, SESSION_IDLE_TTL);

        let falling_cam = registry.get_or_create("falling-cam").await.unwrap();
        falling_cam.lock().await.observe(&monitor, &falling(0.95));
        drop(falling_cam);
        registry.get_or_create("idle-cam").await.unwrap();

        registry.get_or_create("new-cam").await.unwrap();

        let ids: Vec<_> = registry.list().await.into_iter().map(|s| s.camera_id).collect();
        assert_eq!(ids, vec!["falling-cam", "new-cam"]);
    }

    #[tokio::test]
    async fn test_open_episodes_are_never_evicted() {
        let monitor = monitor();
        let registry = SessionRegistry::with_limits(1, SESSION_IDLE_TTL);

        let cam = registry.get_or_create("cam").await.unwrap();
        cam.lock().await.observe(&monitor, &falling(0.95));
        drop(cam);

        assert!(registry.get_or_create("other").await.is_none());
        assert!(registry.snapshot("cam").await.unwrap().detected);
    }

    #[tokio::test]
    async fn test_sessions_in_use_are_kept() {
        let registry = SessionRegistry::with_limits(1, SESSION_IDLE_TTL);

        let held = registry.get_or_create("held").await.unwrap();
        assert!(registry.get_or_create("other").await.is_none());
        drop(held);
        assert!(registry.get_or_create("other").await.is_some());
    }

    #[tokio::test]
    async fn test_expired_idle_sessions_are_swept() {
        let registry = SessionRegistry::with_limits(10, SESSION_IDLE_TTL);
        registry.get_or_create("a").await.unwrap();
        registry.get_or_create("b").await.unwrap();

        let mut sessions = registry.sessions.write().await;
        registry.evict(&mut sessions, Utc::now() + TimeDelta::hours(2));
        assert!(sessions.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_observations_alternate() {
        let monitor = Arc::new(monitor());
        let registry = Arc::new(SessionRegistry::new());
        let observed = Arc::new(std::sync::Mutex::new(Vec::new()));

        let tasks: Vec<_> = (0..40)
            .map(|_| {
                let monitor = Arc::clone(&monitor);
                let registry = Arc::clone(&registry);
                let observed = Arc::clone(&observed);
                tokio::spawn(async move {
                    let session = registry.get_or_create("hall").await.unwrap();
                    let mut session = session.lock().await;
                    let outcome = session.observe(&monitor, &falling(0.95));
                    observed.lock().unwrap().push(outcome.event.unwrap().kind);
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let kinds = observed.lock().unwrap().clone();
        assert_eq!(kinds.len(), 40);
        for (i, kind) in kinds.iter().enumerate() {
            let expected = if i % 2 == 0 { AlertKind::FallStarted } else { AlertKind::FallEnded };
            assert_eq!(*kind, expected);
        }
        assert!(!registry.snapshot("hall").await.unwrap().detected);
    }
}
