//! API routes.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;

use crate::handlers::{detect, get_camera, health, list_cameras, ready, reset_camera, upload_video};
use crate::metrics::metrics_middleware;
use crate::middleware::{cors_layer, rate_limit_middleware, request_id, request_logging, security_headers, RateLimiterCache};
use crate::state::AppState;
use crate::ws::{camera_stream, ws_detect};

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let max_body = state.config.max_body_size;
    let max_upload = state.config.max_upload_size;

    // Frame analysis and camera session management
    let frame_routes = Router::new()
        .route("/detect", post(detect))
        .route("/api/cameras", get(list_cameras))
        .route("/api/cameras/:camera_id", get(get_camera))
        .route("/api/cameras/:camera_id/reset", post(reset_camera))
        .layer(DefaultBodyLimit::max(max_body))
        .layer(RequestBodyLimitLayer::new(max_body));

    // Uploads get their own, larger body limit
    let upload_routes = Router::new()
        .route("/upload-video", post(upload_video))
        .layer(DefaultBodyLimit::max(max_upload))
        .layer(RequestBodyLimitLayer::new(max_upload));

    let rate_limiter = Arc::new(RateLimiterCache::new(state.config.rate_limit_rps));
    let api_routes = Router::new()
        .merge(frame_routes)
        .merge(upload_routes)
        .layer(middleware::from_fn_with_state(rate_limiter, rate_limit_middleware));

    let ws_routes = Router::new()
        .route("/camera-stream", get(camera_stream))
        .route("/ws/detect", get(ws_detect));

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/ready", get(ready));

    // Metrics endpoint (if enabled)
    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .merge(api_routes)
        .merge(ws_routes)
        .merge(health_routes)
        .merge(metrics_routes)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
