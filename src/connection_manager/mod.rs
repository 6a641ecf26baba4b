//! Live connection registry and broadcast fan-out.
//!
//! Connections are grouped by [`Channel`]: one per poll plus the reserved
//! global channel `"all"`. A broadcast to any channel also reaches every
//! global subscriber. Delivery is best effort; a subscriber whose send fails
//! or times out is dropped from the registry after the pass.

mod registry;
mod stats;
mod types;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::websocket::OutboundMessage;

pub use registry::ConnectionManager;
pub use stats::{ChannelInfo, ConnectionStats};
pub use types::{
    Channel, ConnectionHandle, ConnectionState, DeliveryReport, FanoutLimits, RegistryError,
    SubscriptionHandle, GLOBAL_CHANNEL,
};

/// Publish/subscribe capability set of the registry.
#[async_trait]
pub trait ChannelHub: Send + Sync {
    /// Register a connection under `channel`, creating the channel if needed.
    /// Fails only once the hub has been closed.
    fn subscribe(
        &self,
        channel: Channel,
        sender: mpsc::Sender<OutboundMessage>,
    ) -> Result<SubscriptionHandle, RegistryError>;

    /// Remove a subscription. Returns the connection if it was still
    /// registered; a second call is a no-op.
    fn unsubscribe(&self, handle: &SubscriptionHandle) -> Option<Arc<ConnectionHandle>>;

    /// Deliver `message` to every subscriber of `channel` and of the global
    /// channel.
    async fn broadcast(&self, channel: &Channel, message: OutboundMessage) -> DeliveryReport;
}
