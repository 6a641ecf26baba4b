use std::sync::Arc;

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::connection_manager::{Channel, ChannelHub, ConnectionHandle, RegistryError};
use crate::metrics::{ConnectionMetrics, WsMessageMetrics};
use crate::server::AppState;

use super::message::{OutboundMessage, ServerMessage, CLOSE_POLICY_VIOLATION};

const CLOSE_NORMAL: u16 = 1000;
const CLOSE_GOING_AWAY: u16 = 1001;

/// WebSocket upgrade handler for `/ws/{channel}`
///
/// `channel` is a poll id or `all`. Rejected channels are closed right after
/// the upgrade with code 1008 and a reason.
#[tracing::instrument(name = "ws.upgrade", skip(ws, state))]
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(channel): Path<String>,
) -> Response {
    let resolved = state.resolve_channel(&channel).await;
    ws.on_upgrade(move |socket| async move {
        match resolved {
            Ok(channel) => handle_socket(socket, state, channel).await,
            Err(rejection) => {
                tracing::info!(channel = %channel, reason = rejection.reason(), "WebSocket channel rejected");
                close_with(socket, rejection.close_code(), rejection.reason()).await;
            }
        }
    })
}

async fn close_with(mut socket: WebSocket, code: u16, reason: &'static str) {
    let frame = CloseFrame {
        code,
        reason: reason.into(),
    };
    let _ = socket.send(Message::Close(Some(frame))).await;
}

/// Handle an established WebSocket connection
#[tracing::instrument(name = "ws.connection", skip(socket, state), fields(channel = %channel, otel.kind = "server"))]
async fn handle_socket(socket: WebSocket, state: AppState, channel: Channel) {
    let connection_start = std::time::Instant::now();
    let (tx, mut rx) = mpsc::channel::<OutboundMessage>(state.settings.websocket.channel_buffer_size);

    let subscription = match state.registry.subscribe(channel.clone(), tx) {
        Ok(s) => s,
        Err(RegistryError::Closed) => {
            close_with(socket, CLOSE_GOING_AWAY, "Server shutting down").await;
            return;
        }
        Err(e) => {
            tracing::warn!(error = %e, "Subscription rejected");
            close_with(socket, CLOSE_POLICY_VIOLATION, "Invalid channel").await;
            return;
        }
    };
    let handle = subscription.connection().clone();
    let connection_id = handle.id;
    ConnectionMetrics::record_opened("ws");

    tracing::info!(connection_id = %connection_id, "WebSocket connection established");

    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Queued messages drain before an eviction closes the socket
    let send_handle = handle.clone();
    let mut send_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                msg = rx.recv() => {
                    let Some(msg) = msg else { break };
                    let text = match msg.to_json() {
                        Ok(t) => t.into_owned(),
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to serialize message");
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = send_handle.evicted() => {
                    let frame = CloseFrame {
                        code: CLOSE_NORMAL,
                        reason: "Connection closed by server".into(),
                    };
                    let _ = ws_sender.send(Message::Close(Some(frame))).await;
                    break;
                }
            }
        }
    });

    let recv_handle = handle.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = ws_receiver.next().await {
            match result {
                Ok(msg) => {
                    if !process_message(msg, &recv_handle).await {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "WebSocket receive error");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => {
            tracing::debug!(connection_id = %connection_id, "Send task completed");
            recv_task.abort();
        }
        _ = &mut recv_task => {
            tracing::debug!(connection_id = %connection_id, "Receive task completed");
            send_task.abort();
        }
    }

    state.registry.unsubscribe(&subscription);

    tracing::info!(
        connection_id = %connection_id,
        duration_secs = connection_start.elapsed().as_secs_f64(),
        "WebSocket connection closed"
    );
}

/// Process a received WebSocket message.
/// Returns false if the connection should be closed
async fn process_message(msg: Message, handle: &Arc<ConnectionHandle>) -> bool {
    match msg {
        Message::Text(_) => {
            WsMessageMetrics::record_text();
            handle.update_activity();
            let _ = handle.send(ServerMessage::pong()).await;
            true
        }
        Message::Binary(_) => {
            WsMessageMetrics::record_binary();
            handle.update_activity();
            let _ = handle.send(ServerMessage::pong()).await;
            true
        }
        Message::Ping(_) | Message::Pong(_) => {
            WsMessageMetrics::record_ping();
            handle.update_activity();
            true
        }
        Message::Close(_) => {
            tracing::debug!(connection_id = %handle.id, "Received close frame");
            false
        }
    }
}
