//! WebSocket transport over axum

use crate::connection::{ChannelId, RegistryError, SessionRegistry};
use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use serde_json::json;
use steprunner_shared::codec::{self, CodecError};
use steprunner_shared::ServerMessage;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

#[derive(Clone)]
struct AppState {
    registry: SessionRegistry,
    /// Outbound event buffer per channel
    buffer: usize,
}

pub fn router(registry: SessionRegistry, buffer: usize) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .with_state(AppState { registry, buffer })
}

/// Bind and serve until ctrl-c
pub async fn serve(bind: &str, registry: SessionRegistry, buffer: usize) -> Result<()> {
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    info!("Listening on ws://{}/ws", listener.local_addr()?);

    axum::serve(listener, router(registry, buffer))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("server error")
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "channels": state.registry.channel_count().await,
        "active_sessions": state.registry.active_sessions().await,
    }))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<ServerMessage>(state.buffer.max(1));

    let send_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            let Some(text) = outbound_frame(&message) else {
                continue;
            };
            if ws_tx.send(Message::Text(text.into())).await.is_err() {
                debug!("WebSocket send failed, client disconnected");
                break;
            }
        }
    });

    let channel = state.registry.accept(outbound_tx.clone()).await;

    while let Some(result) = ws_rx.next().await {
        let text = match result {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => {
                debug!(%channel, "client sent close frame");
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                warn!(%channel, "WebSocket error: {}", e);
                break;
            }
        };

        if let Some(reply) = handle_text(&state.registry, channel, text.as_str()).await {
            if outbound_tx.send(reply).await.is_err() {
                break;
            }
        }
    }

    state.registry.on_close(channel).await;
    drop(outbound_tx);
    send_task.abort();
}

/// Text frame for an outbound event. An event that cannot be framed is
/// replaced by an `error` naming its sequence number, so the gap it leaves in
/// the stream is accounted for.
fn outbound_frame(message: &ServerMessage) -> Option<String> {
    let e = match codec::encode(message) {
        Ok(text) => return Some(text),
        Err(e) => e,
    };
    error!(seq = ?message.seq(), "Failed to encode message: {}", e);

    let code = match &e {
        CodecError::MessageTooLarge(_) => "frame_too_large",
        _ => "encode_error",
    };
    let detail = match message.seq() {
        Some(seq) => format!("event {seq} dropped: {e}"),
        None => format!("event dropped: {e}"),
    };
    codec::encode(&ServerMessage::error(code, detail)).ok()
}

/// Decode and dispatch one client frame; returns a protocol error to send back, if any
async fn handle_text(registry: &SessionRegistry, channel: ChannelId, text: &str) -> Option<ServerMessage> {
    let request = match codec::decode(text) {
        Ok(request) => request,
        Err(e) => {
            warn!(%channel, "Failed to parse client message: {}", e);
            return Some(ServerMessage::error("parse_error", e.to_string()));
        }
    };

    match registry.dispatch(channel, request).await {
        Ok(_) => None,
        Err(e @ RegistryError::Conflict) => Some(ServerMessage::error("conflict", e.to_string())),
        Err(e @ RegistryError::UnknownChannel(_)) => {
            Some(ServerMessage::error("unknown_channel", e.to_string()))
        }
    }
}
