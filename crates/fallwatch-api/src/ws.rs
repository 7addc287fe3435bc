//! WebSocket handlers with backpressure support.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info, warn};
use uuid::Uuid;

use fallwatch_models::WsMessage;

use crate::error::{ApiError, ApiResult};
use crate::handlers::detect::{analyze_frame, DetectRequest, SessionSlot};
use crate::metrics;
use crate::relay::{RelayPeer, RelayRole};
use crate::security::{default_camera_id, is_valid_camera_id};
use crate::sessions::CameraSession;
use crate::state::AppState;

/// Global counter for active WebSocket connections.
static ACTIVE_WS_CONNECTIONS: AtomicI64 = AtomicI64::new(0);

/// Configuration for WebSocket backpressure.
const WS_SEND_BUFFER_SIZE: usize = 32;
const WS_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Query parameters for `/camera-stream`.
#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    #[serde(default = "default_camera_id")]
    pub camera: String,
    #[serde(default)]
    pub role: RelayRole,
}

fn track_connection(endpoint: &str) {
    let count = ACTIVE_WS_CONNECTIONS.fetch_add(1, Ordering::SeqCst) + 1;
    metrics::set_ws_active_connections(count);
    metrics::record_ws_connection(endpoint);
}

fn untrack_connection() {
    let count = ACTIVE_WS_CONNECTIONS.fetch_sub(1, Ordering::SeqCst) - 1;
    metrics::set_ws_active_connections(count);
}

/// Spawn the writer half: drains the bounded queue into the socket.
fn spawn_writer(
    mut ws_sender: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Message>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                break;
            }
        }
        let _ = ws_sender.close().await;
    })
}

/// Queue a message, waiting for room when the buffer is full.
async fn enqueue(tx: &mpsc::Sender<Message>, msg: Message) -> bool {
    match tx.try_send(msg) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(msg)) => {
            debug!("WebSocket send buffer full, applying backpressure");
            tx.send(msg).await.is_ok()
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}

async fn send_ws_message(tx: &mpsc::Sender<Message>, msg: &WsMessage) -> bool {
    let json = match serde_json::to_string(msg) {
        Ok(j) => j,
        Err(_) => return false,
    };
    let sent = enqueue(tx, Message::Text(json)).await;
    if sent {
        metrics::record_ws_message_sent("detect", msg.type_name());
    }
    sent
}

// ============================================================================
// Camera relay
// ============================================================================

/// Camera stream relay endpoint.
pub async fn camera_stream(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
) -> ApiResult<Response> {
    if !is_valid_camera_id(&query.camera) {
        return Err(ApiError::Validation(
            "camera must be 1-64 characters of [A-Za-z0-9_.-]".to_string(),
        ));
    }

    let peer = state.relay.join(&query.camera);
    let role = query.role;

    Ok(ws
        .on_upgrade(move |socket| async move {
            track_connection("camera-stream");
            handle_relay_socket(socket, peer, role).await;
            untrack_connection();
        })
        .into_response())
}

async fn handle_relay_socket(socket: WebSocket, peer: RelayPeer, role: RelayRole) {
    let (ws_sender, mut receiver) = socket.split();
    let (tx, rx) = mpsc::channel::<Message>(WS_SEND_BUFFER_SIZE);
    let send_task = spawn_writer(ws_sender, rx);

    info!(camera = %peer.topic(), peer = peer.id(), ?role, "Camera stream connected");

    // Forward other peers' frames to this socket
    let forward_task = role.subscribes().then(|| {
        let mut subscription = peer.subscribe();
        let tx = tx.clone();
        tokio::spawn(async move {
            while let Some(frame) = subscription.recv().await {
                if !enqueue(&tx, Message::Text(frame.to_string())).await {
                    break;
                }
            }
        })
    });

    let mut heartbeat = interval(WS_HEARTBEAT_INTERVAL);
    heartbeat.tick().await;

    loop {
        tokio::select! {
            msg = receiver.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    metrics::record_ws_message_received("camera-stream");
                    if role.publishes() {
                        peer.publish(text);
                    } else {
                        debug!(peer = peer.id(), "Ignoring frame from subscriber-only peer");
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(peer = peer.id(), "Camera stream receive error: {}", e);
                    break;
                }
            },
            _ = heartbeat.tick() => {
                if !enqueue(&tx, Message::Ping(Vec::new())).await {
                    break;
                }
            }
        }
    }

    if let Some(task) = forward_task {
        task.abort();
    }
    info!(camera = %peer.topic(), peer = peer.id(), "Camera stream disconnected");
    drop(peer);
    drop(tx);
    let _ = send_task.await;
}

// ============================================================================
// Detection stream
// ============================================================================

/// Detection stream endpoint: one private fall session per connection.
pub async fn ws_detect(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| async move {
        track_connection("detect");
        handle_detect_socket(socket, state).await;
        untrack_connection();
    })
}

async fn handle_detect_socket(socket: WebSocket, state: AppState) {
    let (ws_sender, mut receiver) = socket.split();
    let (tx, rx) = mpsc::channel::<Message>(WS_SEND_BUFFER_SIZE);
    let send_task = spawn_writer(ws_sender, rx);

    let mut session = CameraSession::new(format!("ws-{}", Uuid::new_v4()));
    info!(session = %session.camera_id(), "Detection stream connected");

    let mut heartbeat = interval(WS_HEARTBEAT_INTERVAL);
    heartbeat.tick().await;

    loop {
        tokio::select! {
            msg = receiver.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    metrics::record_ws_message_received("detect");
                    let reply = detect_message(&state, &mut session, &text).await;
                    if !send_ws_message(&tx, &reply).await {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("Detection stream receive error: {}", e);
                    break;
                }
            },
            _ = heartbeat.tick() => {
                if !enqueue(&tx, Message::Ping(Vec::new())).await {
                    break;
                }
            }
        }
    }

    let snapshot = session.snapshot();
    info!(
        session = %snapshot.camera_id,
        frames = snapshot.frames,
        events = snapshot.events,
        "Detection stream disconnected"
    );
    drop(tx);
    let _ = send_task.await;
}

/// Handle one detection request; failures become error messages.
async fn detect_message(state: &AppState, session: &mut CameraSession, text: &str) -> WsMessage {
    let request = match serde_json::from_str::<DetectRequest>(text)
        .map_err(|e| ApiError::bad_request(format!("Invalid request: {}", e)))
        .and_then(DetectRequest::validated)
    {
        Ok(request) => request,
        Err(e) => return WsMessage::error_with_code(e.to_string(), "invalid_request"),
    };

    match analyze_frame(&state.monitor, SessionSlot::Owned(session), &request).await {
        Ok(response) => WsMessage::result(response),
        Err(e) => {
            warn!(camera = %request.camera_id, "Detection stream frame failed: {}", e);
            match e.code() {
                Some(code) => WsMessage::error_with_code(e.to_string(), code),
                None if state.config.is_production() => {
                    WsMessage::error_with_code("An internal error occurred", "detection_failed")
                }
                None => WsMessage::error_with_code(e.to_string(), "detection_failed"),
            }
        }
    }
}
