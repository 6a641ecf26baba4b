use std::borrow::Cow;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Close code sent when the requested channel is rejected.
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;

/// Messages originated by the server itself, as opposed to poll events
/// relayed from publishers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Reply to any inbound client message
    Pong { message: String },
    Heartbeat,
    Shutdown {
        reason: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        reconnect_after: Option<u64>,
    },
}

impl ServerMessage {
    pub fn pong() -> Self {
        Self::Pong {
            message: "Connection alive".to_string(),
        }
    }

    pub fn shutdown(reason: impl Into<String>, reconnect_after: Option<u64>) -> Self {
        Self::Shutdown {
            reason: reason.into(),
            reconnect_after,
        }
    }
}

/// What actually travels down a connection's queue.
///
/// Broadcast payloads are serialized once and shared by every recipient.
#[derive(Debug, Clone)]
pub enum OutboundMessage {
    Raw(ServerMessage),
    Preserialized(Arc<str>),
}

impl OutboundMessage {
    /// Serialize an arbitrary payload once for fan-out.
    pub fn from_payload<T: Serialize + ?Sized>(payload: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::Preserialized(serde_json::to_string(payload)?.into()))
    }

    pub fn preserialized(message: &ServerMessage) -> Result<Self, serde_json::Error> {
        Self::from_payload(message)
    }

    pub fn to_json(&self) -> Result<Cow<'_, str>, serde_json::Error> {
        match self {
            Self::Raw(message) => serde_json::to_string(message).map(Cow::Owned),
            Self::Preserialized(text) => Ok(Cow::Borrowed(text)),
        }
    }
}

impl From<ServerMessage> for OutboundMessage {
    fn from(message: ServerMessage) -> Self {
        Self::Raw(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pong_wire_format() {
        let json = serde_json::to_value(ServerMessage::pong()).unwrap();
        assert_eq!(json, serde_json::json!({"type": "pong", "message": "Connection alive"}));
    }

    #[test]
    fn test_shutdown_omits_missing_reconnect_hint() {
        let json = serde_json::to_value(ServerMessage::shutdown("maintenance", None)).unwrap();
        assert_eq!(json, serde_json::json!({"type": "shutdown", "reason": "maintenance"}));
    }

    #[test]
    fn test_preserialized_matches_raw() {
        let msg = ServerMessage::shutdown("maintenance", Some(5));
        let raw = OutboundMessage::Raw(msg.clone());
        let pre = OutboundMessage::preserialized(&msg).unwrap();
        assert_eq!(raw.to_json().unwrap(), pre.to_json().unwrap());
    }
}
