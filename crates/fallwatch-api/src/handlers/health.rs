//! Health check handlers.

use std::collections::BTreeMap;
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use futures_util::future::join_all;
use serde::Serialize;

use crate::state::AppState;

/// Health response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
}

/// Health check endpoint (liveness probe).
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// Readiness check response.
#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub detector: String,
    pub threshold: f32,
    /// One entry per configured alert channel
    pub channels: BTreeMap<String, CheckStatus>,
}

#[derive(Serialize)]
pub struct CheckStatus {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

impl CheckStatus {
    fn ok(latency_ms: u64) -> Self {
        Self {
            status: "ok".to_string(),
            error: None,
            latency_ms: Some(latency_ms),
        }
    }

    fn error(msg: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            error: Some(msg.into()),
            latency_ms: None,
        }
    }

    fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// Readiness check endpoint (readiness probe).
/// The detector is loaded at startup; each alert channel is probed.
pub async fn ready(
    State(state): State<AppState>,
) -> Result<Json<ReadinessResponse>, (StatusCode, Json<ReadinessResponse>)> {
    let dispatcher = state.monitor.dispatcher();
    let timeout = dispatcher.timeout();

    let checks = join_all(dispatcher.channels().iter().map(|channel| async move {
        let start = Instant::now();
        let status = match tokio::time::timeout(timeout, channel.check()).await {
            Ok(Ok(())) => CheckStatus::ok(start.elapsed().as_millis() as u64),
            Ok(Err(e)) => CheckStatus::error(e.to_string()),
            Err(_) => CheckStatus::error(format!("timed out after {}s", timeout.as_secs())),
        };
        (channel.name().to_string(), status)
    }))
    .await;

    let channels: BTreeMap<String, CheckStatus> = checks.into_iter().collect();
    let all_ok = channels.values().all(CheckStatus::is_ok);

    let response = ReadinessResponse {
        status: if all_ok { "ready" } else { "degraded" }.to_string(),
        detector: state.monitor.detector_name().to_string(),
        threshold: state.monitor.threshold(),
        channels,
    };

    if all_ok {
        Ok(Json(response))
    } else {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(response)))
    }
}
