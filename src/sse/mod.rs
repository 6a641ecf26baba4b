//! Server-Sent Events fallback for clients that cannot hold a WebSocket.
//!
//! `GET /sse/{channel}` subscribes to the same registry as `/ws/{channel}`;
//! the stream is one-way, so liveness is tracked from successful delivery
//! instead of inbound messages.
//!
//! Event names:
//! - `connected`: first event, carries the connection id
//! - `poll_event`: a relayed poll event (JSON payload)
//! - `heartbeat`, `shutdown`, `pong`: server messages

mod handler;

pub use handler::sse_handler;
