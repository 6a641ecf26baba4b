use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
};
use futures::stream::Stream;
use futures::StreamExt;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::connection_manager::{ChannelHub, ConnectionHandle, SubscriptionHandle};
use crate::error::AppError;
use crate::metrics::ConnectionMetrics;
use crate::server::AppState;
use crate::websocket::{OutboundMessage, ServerMessage};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum SseEvent {
    Connected { connection_id: String, channel: String },
}

/// SSE subscribe handler
#[tracing::instrument(name = "sse.connect", skip(state))]
pub async fn sse_handler(
    State(state): State<AppState>,
    Path(channel): Path<String>,
) -> Result<Response, AppError> {
    let channel = state.resolve_channel(&channel).await?;

    let (tx, rx) = mpsc::channel::<OutboundMessage>(state.settings.websocket.channel_buffer_size);
    let subscription = state.registry.subscribe(channel, tx)?;
    ConnectionMetrics::record_opened("sse");

    tracing::info!(
        connection_id = %subscription.id(),
        channel = %subscription.channel(),
        "SSE connection established"
    );

    let keep_alive = Duration::from_secs(state.settings.websocket.heartbeat_interval);
    let stream = create_sse_stream(rx, subscription, state);

    Ok(Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(keep_alive).text("keep-alive"))
        .into_response())
}

fn event_name(msg: &OutboundMessage) -> &'static str {
    match msg {
        OutboundMessage::Preserialized(_) => "poll_event",
        OutboundMessage::Raw(ServerMessage::Heartbeat) => "heartbeat",
        OutboundMessage::Raw(ServerMessage::Shutdown { .. }) => "shutdown",
        OutboundMessage::Raw(ServerMessage::Pong { .. }) => "pong",
    }
}

fn create_sse_stream(
    rx: mpsc::Receiver<OutboundMessage>,
    subscription: SubscriptionHandle,
    state: AppState,
) -> impl Stream<Item = Result<Event, Infallible>> {
    let handle: Arc<ConnectionHandle> = subscription.connection().clone();
    let connected = SseEvent::Connected {
        connection_id: handle.id.to_string(),
        channel: handle.channel.to_string(),
    };
    let connected_json = serde_json::to_string(&connected).unwrap_or_default();
    let guard = CleanupGuard {
        subscription,
        state,
        connection_start: std::time::Instant::now(),
    };

    async_stream::stream! {
        let _guard = guard;
        yield Ok(Event::default().event("connected").data(connected_json));

        let mut messages = ReceiverStream::new(rx);
        loop {
            let msg = tokio::select! {
                biased;
                msg = messages.next() => msg,
                _ = handle.evicted() => None,
            };
            let Some(msg) = msg else { break };

            match msg.to_json() {
                Ok(json) => {
                    handle.update_activity();
                    yield Ok(Event::default().event(event_name(&msg)).data(json));
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize SSE message");
                }
            }
        }
    }
}

/// Unsubscribes when the client goes away and the stream is dropped
struct CleanupGuard {
    subscription: SubscriptionHandle,
    state: AppState,
    connection_start: std::time::Instant,
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        self.state.registry.unsubscribe(&self.subscription);
        tracing::info!(
            connection_id = %self.subscription.id(),
            duration_secs = self.connection_start.elapsed().as_secs_f64(),
            "SSE connection closed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connected_event_serialization() {
        let connected = SseEvent::Connected {
            connection_id: "c-1".to_string(),
            channel: "all".to_string(),
        };
        let json = serde_json::to_string(&connected).unwrap();
        assert!(json.contains(r#""type":"connected""#));
        assert!(json.contains(r#""channel":"all""#));
    }

    #[test]
    fn test_event_names() {
        let pre = OutboundMessage::from_payload(&serde_json::json!({"type": "vote_update"})).unwrap();
        assert_eq!(event_name(&pre), "poll_event");
        assert_eq!(event_name(&ServerMessage::Heartbeat.into()), "heartbeat");
        assert_eq!(event_name(&ServerMessage::shutdown("bye", Some(5)).into()), "shutdown");
        assert_eq!(event_name(&ServerMessage::pong().into()), "pong");
    }
}
