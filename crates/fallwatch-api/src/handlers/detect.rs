//! Single-frame detection handler.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;
use validator::Validate;

use fallwatch_detect::decode_base64_image;
use fallwatch_models::DetectResponse;
use fallwatch_monitor::{FallMonitor, FrameOutcome};

use crate::error::{ApiError, ApiResult};
use crate::security::{default_camera_id, validate_camera_id};
use crate::sessions::CameraSession;
use crate::state::AppState;

/// Frame submitted for analysis.
#[derive(Debug, Deserialize, Validate)]
pub struct DetectRequest {
    /// Base64 image, optionally as a `data:` URL
    pub image: String,
    #[serde(default = "default_camera_id")]
    #[validate(custom(function = "validate_camera_id"))]
    pub camera_id: String,
}

impl DetectRequest {
    pub fn validated(self) -> ApiResult<Self> {
        self.validate()
            .map_err(|e| ApiError::Validation(e.to_string()))?;
        Ok(self)
    }
}

/// Where a frame's state machine lives.
pub(crate) enum SessionSlot<'a> {
    /// Shared HTTP camera session
    Shared(&'a Mutex<CameraSession>),
    /// Session owned by the caller (one WebSocket connection)
    Owned(&'a mut CameraSession),
}

/// Decode, detect, observe, alert.
///
/// Decoding and inference happen before the session is touched, so a bad
/// frame or a detector failure leaves the fall state unchanged.
pub(crate) async fn analyze_frame(
    monitor: &FallMonitor,
    slot: SessionSlot<'_>,
    request: &DetectRequest,
) -> ApiResult<DetectResponse> {
    let image = decode_base64_image(&request.image)?;
    let detections = monitor.detect(image).await?;

    // Alerts name the session that owns the state machine
    let (outcome, source): (FrameOutcome, String) = match slot {
        SessionSlot::Shared(session) => {
            let mut session = session.lock().await;
            (session.observe(monitor, &detections), session.camera_id().to_string())
        }
        SessionSlot::Owned(session) => {
            (session.observe(monitor, &detections), session.camera_id().to_string())
        }
    };

    let alerts = match outcome.event {
        Some(event) => Some(monitor.alert(event, &source, None).await),
        None => None,
    };

    debug!(
        camera = %request.camera_id,
        detections = outcome.detections,
        fall = outcome.event.is_some(),
        "Frame analyzed"
    );

    Ok(DetectResponse {
        fall: outcome.event.is_some(),
        confidence: outcome.confidence(),
        event: outcome.event,
        camera_id: request.camera_id.clone(),
        alerts,
    })
}

/// Analyze one frame for a camera.
pub async fn detect(
    State(state): State<AppState>,
    Json(request): Json<DetectRequest>,
) -> ApiResult<Json<DetectResponse>> {
    let request = request.validated()?;
    let session = state
        .sessions
        .get_or_create(&request.camera_id)
        .await
        .ok_or_else(|| ApiError::Unavailable("Camera session limit reached".to_string()))?;
    let response = analyze_frame(&state.monitor, SessionSlot::Shared(&session), &request).await?;
    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::{Arc, Mutex as StdMutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use base64::Engine;
    use fallwatch_alert::{Alert, AlertChannel, AlertDispatcher, AlertResult};
    use fallwatch_detect::{DetectResult, FrameDetector};
    use fallwatch_models::Detection;
    use fallwatch_monitor::MonitorConfig;
    use image::{DynamicImage, ImageOutputFormat};

    struct AlwaysFalling;

    impl FrameDetector for AlwaysFalling {
        fn detect(&self, _image: &DynamicImage) -> DetectResult<Vec<Detection>> {
            Ok(vec![Detection::new("falling", 0.95).unwrap()])
        }

        fn name(&self) -> &'static str {
            "always-falling"
        }
    }

    #[derive(Default)]
    struct Recording {
        sources: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl AlertChannel for Recording {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn notify(&self, alert: &Alert) -> AlertResult<()> {
            self.sources.lock().unwrap().push(alert.source.clone());
            Ok(())
        }
    }

    fn request() -> DetectRequest {
        let mut bytes = Vec::new();
        DynamicImage::new_rgb8(8, 8)
            .write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)
            .unwrap();
        DetectRequest {
            image: base64::engine::general_purpose::STANDARD.encode(bytes),
            camera_id: default_camera_id(),
        }
    }

    #[tokio::test]
    async fn test_owned_session_alerts_use_session_id() {
        let recording = Arc::new(Recording::default());
        let dispatcher = AlertDispatcher::new(
            vec![recording.clone() as Arc<dyn AlertChannel>],
            Duration::from_secs(1),
        );
        let monitor = FallMonitor::new(Arc::new(AlwaysFalling), dispatcher, MonitorConfig::default());

        let mut private = CameraSession::new("ws-1234");
        let response = analyze_frame(&monitor, SessionSlot::Owned(&mut private), &request())
            .await
            .unwrap();
        assert!(response.fall);

        let shared = Mutex::new(CameraSession::new("default"));
        analyze_frame(&monitor, SessionSlot::Shared(&shared), &request())
            .await
            .unwrap();

        assert_eq!(
            recording.sources.lock().unwrap().as_slice(),
            &["ws-1234".to_string(), "default".to_string()]
        );
    }
}
