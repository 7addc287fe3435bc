//! Camera session inspection and operator reset.

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::sessions::CameraSnapshot;
use crate::state::AppState;

#[derive(Serialize)]
pub struct CameraListResponse {
    pub cameras: Vec<CameraSnapshot>,
}

/// List all camera sessions.
pub async fn list_cameras(State(state): State<AppState>) -> Json<CameraListResponse> {
    Json(CameraListResponse {
        cameras: state.sessions.list().await,
    })
}

/// Get one camera session.
pub async fn get_camera(
    State(state): State<AppState>,
    Path(camera_id): Path<String>,
) -> ApiResult<Json<CameraSnapshot>> {
    state
        .sessions
        .snapshot(&camera_id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Camera '{}'", camera_id)))
}

/// Clear a camera's fall latch without emitting an event.
pub async fn reset_camera(
    State(state): State<AppState>,
    Path(camera_id): Path<String>,
) -> ApiResult<Json<CameraSnapshot>> {
    let snapshot = state
        .sessions
        .reset(&camera_id)
        .await
        .ok_or_else(|| ApiError::not_found(format!("Camera '{}'", camera_id)))?;

    info!(camera = %camera_id, "Fall state reset by operator");
    Ok(Json(snapshot))
}
