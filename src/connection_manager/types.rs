//! Channel, connection handle and subscription types

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicI64, AtomicU8, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, Notify};
use uuid::Uuid;

use crate::websocket::{OutboundMessage, ServerMessage};

/// Reserved channel name observed by list views.
pub const GLOBAL_CHANNEL: &str = "all";

/// A broadcast group: one poll, or every poll.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Channel {
    Global,
    Poll(String),
}

impl Channel {
    pub fn poll(id: impl Into<String>) -> Self {
        Self::Poll(id.into())
    }

    pub fn is_global(&self) -> bool {
        matches!(self, Self::Global)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Global => GLOBAL_CHANNEL,
            Self::Poll(id) => id,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" => Err(RegistryError::InvalidChannel(s.to_string())),
            GLOBAL_CHANNEL => Ok(Self::Global),
            id => Ok(Self::Poll(id.to_string())),
        }
    }
}

/// Lifecycle of a connection inside the registry.
///
/// `Unsubscribed` and `Failed` are terminal; both mean the connection is no
/// longer a member of any channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum ConnectionState {
    Connecting = 0,
    Subscribed = 1,
    Unsubscribed = 2,
    Failed = 3,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Subscribed,
            2 => Self::Unsubscribed,
            _ => Self::Failed,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Unsubscribed | Self::Failed)
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Registry is closed")]
    Closed,

    #[error("Invalid channel name: '{0}'")]
    InvalidChannel(String),
}

/// Handle for a single live connection
pub struct ConnectionHandle {
    pub id: Uuid,
    pub channel: Channel,
    pub sender: mpsc::Sender<OutboundMessage>,
    pub connected_at: DateTime<Utc>,
    /// Last activity timestamp (Unix seconds)
    last_activity: AtomicI64,
    state: AtomicU8,
    evicted: Notify,
}

impl ConnectionHandle {
    pub fn new(channel: Channel, sender: mpsc::Sender<OutboundMessage>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            channel,
            sender,
            connected_at: now,
            last_activity: AtomicI64::new(now.timestamp()),
            state: AtomicU8::new(ConnectionState::Connecting as u8),
            evicted: Notify::new(),
        }
    }

    pub fn update_activity(&self) {
        self.last_activity
            .store(Utc::now().timestamp(), Ordering::Relaxed);
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.last_activity.load(Ordering::Relaxed), 0)
            .unwrap_or_else(Utc::now)
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Mark the connection failed and wake its transport task.
    pub(crate) fn evict(&self) {
        self.set_state(ConnectionState::Failed);
        self.evicted.notify_one();
    }

    /// Mark the connection unsubscribed and wake its transport task.
    pub(crate) fn release(&self) {
        self.set_state(ConnectionState::Unsubscribed);
        self.evicted.notify_one();
    }

    /// Resolves once the registry has dropped this connection.
    pub async fn evicted(&self) {
        self.evicted.notified().await
    }

    /// Send a ServerMessage (will be serialized by the transport)
    pub async fn send(
        &self,
        message: ServerMessage,
    ) -> Result<(), mpsc::error::SendError<OutboundMessage>> {
        self.sender.send(OutboundMessage::Raw(message)).await
    }

    pub async fn send_outbound(
        &self,
        message: OutboundMessage,
    ) -> Result<(), mpsc::error::SendError<OutboundMessage>> {
        self.sender.send(message).await
    }
}

/// Opaque proof of membership returned by `subscribe`.
#[derive(Clone)]
pub struct SubscriptionHandle {
    connection: Arc<ConnectionHandle>,
}

impl SubscriptionHandle {
    pub(crate) fn new(connection: Arc<ConnectionHandle>) -> Self {
        Self { connection }
    }

    pub fn id(&self) -> Uuid {
        self.connection.id
    }

    pub fn channel(&self) -> &Channel {
        &self.connection.channel
    }

    pub fn connection(&self) -> &Arc<ConnectionHandle> {
        &self.connection
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.connection.id)
            .field("channel", &self.connection.channel)
            .finish()
    }
}

/// Outcome of one broadcast pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
    /// Connections removed from the registry because their send failed
    pub pruned: usize,
}

/// Fan-out tuning
#[derive(Debug, Clone, Copy)]
pub struct FanoutLimits {
    pub max_concurrent_sends: usize,
    pub send_timeout: std::time::Duration,
}

impl Default for FanoutLimits {
    fn default() -> Self {
        Self {
            max_concurrent_sends: 100,
            send_timeout: std::time::Duration::from_millis(2000),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_parsing() {
        assert_eq!("all".parse::<Channel>().unwrap(), Channel::Global);
        assert_eq!("poll-1".parse::<Channel>().unwrap(), Channel::poll("poll-1"));
        assert!("  ".parse::<Channel>().is_err());
        assert_eq!(Channel::Global.to_string(), "all");
    }

    #[test]
    fn test_state_transitions() {
        let (tx, _rx) = mpsc::channel(1);
        let handle = ConnectionHandle::new(Channel::Global, tx);
        assert_eq!(handle.state(), ConnectionState::Connecting);
        handle.set_state(ConnectionState::Subscribed);
        assert!(!handle.state().is_terminal());
        handle.evict();
        assert_eq!(handle.state(), ConnectionState::Failed);
        assert!(handle.state().is_terminal());
    }
}
