//! Video upload handler.

use std::path::Path;
use std::time::Instant;

use axum::extract::{Multipart, State};
use axum::Json;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use uuid::Uuid;

use fallwatch_models::VideoReport;

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// Multipart field carrying the video.
const FILE_FIELD: &str = "file";

/// Scan an uploaded video with its own fall state machine.
///
/// The upload is spooled to a temporary file that is removed when the
/// request finishes, whatever the outcome.
pub async fn upload_video(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<VideoReport>> {
    let upload_id = format!("upload-{}", Uuid::new_v4());

    let mut spooled = None;
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(e.to_string()))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let suffix = field
            .file_name()
            .and_then(|name| Path::new(name).extension())
            .and_then(|ext| ext.to_str())
            .map(|ext| format!(".{}", ext))
            .unwrap_or_default();

        let temp = tempfile::Builder::new()
            .prefix("fallwatch-upload-")
            .suffix(&suffix)
            .tempfile()
            .map_err(|e| ApiError::internal(format!("Failed to create temp file: {}", e)))?;

        let mut file = tokio::fs::File::create(temp.path())
            .await
            .map_err(|e| ApiError::internal(format!("Failed to open temp file: {}", e)))?;
        let mut bytes = 0usize;
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| ApiError::bad_request(e.to_string()))?
        {
            bytes += chunk.len();
            file.write_all(&chunk)
                .await
                .map_err(|e| ApiError::internal(format!("Failed to write upload: {}", e)))?;
        }
        file.flush()
            .await
            .map_err(|e| ApiError::internal(format!("Failed to write upload: {}", e)))?;

        info!(upload = %upload_id, bytes, "Video upload received");
        spooled = Some(temp);
        break;
    }

    let temp = spooled.ok_or_else(|| ApiError::bad_request("Missing multipart field 'file'"))?;

    let start = Instant::now();
    let result = state.monitor.scan_video(temp.path(), &upload_id).await;
    let elapsed = start.elapsed().as_secs_f64();

    if let Err(e) = temp.close() {
        warn!(upload = %upload_id, "Failed to remove temp file: {}", e);
    }

    match result {
        Ok(report) => {
            metrics::record_video_upload("processed", elapsed);
            Ok(Json(report))
        }
        Err(e) => {
            metrics::record_video_upload("failed", elapsed);
            warn!(upload = %upload_id, "Video scan failed: {}", e);
            Err(e.into())
        }
    }
}
