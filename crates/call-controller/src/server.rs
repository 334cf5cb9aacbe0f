//! HTTP surface: the `/ws` signaling endpoint and a health route.
//!
//! Each accepted WebSocket gets a reader loop that feeds parsed client
//! events into the registry mailbox and a writer task that drains the
//! connection's outbound channel back onto the socket. The socket side never
//! touches signaling state directly.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use signal_protocol::ClientEvent;

use crate::actors::messages::CONNECTION_CHANNEL_BUFFER;
use crate::actors::{ClientConnection, RegistryActorHandle};
use crate::directory::ConnectionId;

#[derive(Clone)]
struct AppState {
    registry: RegistryActorHandle,
}

/// Build the signaling router (shared between production startup and tests).
#[must_use]
pub fn build_app(registry: RegistryActorHandle) -> Router {
    Router::new()
        .route("/healthz", get(health_handler))
        .route("/ws", get(ws_upgrade_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { registry })
}

/// Bind and serve until `shutdown` is cancelled.
///
/// # Errors
///
/// Returns an error if the bind fails or the server loop aborts.
pub async fn serve(
    bind_address: &str,
    registry: RegistryActorHandle,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    info!(target: "cc.server", bind_address = %bind_address, "Signaling server listening");

    axum::serve(listener, build_app(registry))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    Ok(())
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.registry.snapshot().await {
        Ok(snapshot) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "onlineUsers": snapshot.online_users.len(),
                "activeCalls": snapshot.active_calls.len(),
                "connections": snapshot.connections,
            })),
        ),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "unavailable" })),
        ),
    }
}

async fn ws_upgrade_handler(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.registry))
}

/// Pump one WebSocket: register with the registry, bridge frames both ways,
/// and report the disconnect whichever way the socket dies.
async fn handle_socket(socket: WebSocket, registry: RegistryActorHandle) {
    let conn_id = ConnectionId::new();
    let (outbound_tx, mut outbound_rx) = mpsc::channel(CONNECTION_CHANNEL_BUFFER);

    if registry
        .connected(ClientConnection::new(conn_id, outbound_tx))
        .await
        .is_err()
    {
        // Registry is shutting down; drop the socket without ceremony.
        return;
    }

    debug!(target: "cc.server", connection_id = %conn_id, "WebSocket connected");

    let (mut sink, mut stream) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(event) = outbound_rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(frame) => {
                    if sink.send(Message::Text(frame)).await.is_err() {
                        break;
                    }
                }
                Err(err) => {
                    warn!(target: "cc.server", error = %err, "Failed to encode outbound event");
                }
            }
        }
    });

    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(frame)) => match serde_json::from_str::<ClientEvent>(&frame) {
                Ok(event) => {
                    if registry.event(conn_id, event).await.is_err() {
                        break;
                    }
                }
                Err(err) => {
                    warn!(
                        target: "cc.server",
                        connection_id = %conn_id,
                        error = %err,
                        "Ignoring malformed frame"
                    );
                }
            },
            Ok(Message::Close(_)) => break,
            // Pings are answered by axum; binary frames are not part of the
            // protocol.
            Ok(_) => {}
            Err(err) => {
                debug!(
                    target: "cc.server",
                    connection_id = %conn_id,
                    error = %err,
                    "WebSocket read error"
                );
                break;
            }
        }
    }

    let _ = registry.disconnected(conn_id).await;
    writer.abort();

    debug!(target: "cc.server", connection_id = %conn_id, "WebSocket closed");
}
