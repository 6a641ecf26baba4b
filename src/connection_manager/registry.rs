use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::mpsc;
use tokio::time::timeout;
use uuid::Uuid;

use crate::config::WebSocketConfig;
use crate::metrics::{BroadcastMetrics, ConnectionMetrics};
use crate::websocket::OutboundMessage;

use super::stats::{ChannelInfo, ConnectionStats};
use super::types::{
    Channel, ConnectionHandle, ConnectionState, DeliveryReport, FanoutLimits, RegistryError,
    SubscriptionHandle,
};
use super::ChannelHub;

/// Manages all live connections
pub struct ConnectionManager {
    /// connection_id -> ConnectionHandle
    connections: DashMap<Uuid, Arc<ConnectionHandle>>,
    /// channel -> members. A shard lock guards each member set, so a
    /// snapshot never sees a half-applied subscribe or unsubscribe.
    channels: DashMap<Channel, HashMap<Uuid, Arc<ConnectionHandle>>>,
    limits: FanoutLimits,
    closed: AtomicBool,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::with_limits(FanoutLimits::default())
    }

    pub fn with_limits(limits: FanoutLimits) -> Self {
        Self {
            connections: DashMap::new(),
            channels: DashMap::new(),
            limits,
            closed: AtomicBool::new(false),
        }
    }

    pub fn from_config(config: &WebSocketConfig) -> Self {
        Self::with_limits(FanoutLimits {
            max_concurrent_sends: config.max_concurrent_sends.max(1),
            send_timeout: std::time::Duration::from_millis(config.send_timeout_ms),
        })
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Remove a connection by id. Returns it if it was still registered.
    fn remove(&self, connection_id: Uuid) -> Option<Arc<ConnectionHandle>> {
        let (_, handle) = self.connections.remove(&connection_id)?;

        if let Some(mut members) = self.channels.get_mut(&handle.channel) {
            members.remove(&connection_id);
        }
        self.channels
            .remove_if(&handle.channel, |_, members| members.is_empty());

        ConnectionMetrics::set_totals(self.connections.len(), self.channels.len());
        Some(handle)
    }

    /// Snapshot of the members of one channel.
    pub fn channel_members(&self, channel: &Channel) -> Vec<Arc<ConnectionHandle>> {
        self.channels
            .get(channel)
            .map(|members| members.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Get all connections
    pub fn get_all_connections(&self) -> Vec<Arc<ConnectionHandle>> {
        self.connections.iter().map(|r| r.value().clone()).collect()
    }

    /// Get connection by ID
    pub fn get_connection(&self, connection_id: Uuid) -> Option<Arc<ConnectionHandle>> {
        self.connections.get(&connection_id).map(|h| h.clone())
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Get statistics
    pub fn stats(&self) -> ConnectionStats {
        let channels: HashMap<String, usize> = self
            .channels
            .iter()
            .map(|entry| (entry.key().to_string(), entry.value().len()))
            .collect();

        ConnectionStats {
            total_connections: self.connections.len(),
            total_channels: channels.len(),
            global_subscribers: self
                .channels
                .get(&Channel::Global)
                .map(|m| m.len())
                .unwrap_or(0),
            channels,
        }
    }

    /// All channels with at least one subscriber, busiest first
    pub fn list_channels(&self) -> Vec<ChannelInfo> {
        let mut channels: Vec<ChannelInfo> = self
            .channels
            .iter()
            .map(|entry| ChannelInfo {
                name: entry.key().to_string(),
                subscriber_count: entry.value().len(),
            })
            .collect();
        channels.sort_by(|a, b| {
            b.subscriber_count
                .cmp(&a.subscriber_count)
                .then_with(|| a.name.cmp(&b.name))
        });
        channels
    }

    pub fn get_channel_info(&self, channel: &Channel) -> Option<ChannelInfo> {
        self.channels.get(channel).map(|members| ChannelInfo {
            name: channel.to_string(),
            subscriber_count: members.len(),
        })
    }

    /// Find connections that have been inactive for longer than the timeout
    pub fn find_stale_connections(&self, timeout_secs: u64) -> Vec<Uuid> {
        let now = Utc::now();
        let timeout = chrono::Duration::seconds(timeout_secs as i64);

        self.connections
            .iter()
            .filter(|entry| now.signed_duration_since(entry.value().last_activity()) > timeout)
            .map(|entry| *entry.key())
            .collect()
    }

    /// Remove stale connections and return the count of removed connections
    pub fn cleanup_stale_connections(&self, timeout_secs: u64) -> usize {
        let stale = self.find_stale_connections(timeout_secs);
        let mut removed = 0;

        for conn_id in stale {
            if let Some(handle) = self.remove(conn_id) {
                tracing::info!(
                    connection_id = %conn_id,
                    channel = %handle.channel,
                    "Removing stale connection due to timeout"
                );
                handle.evict();
                removed += 1;
            }
        }

        removed
    }

    /// Refuse new subscriptions and drop every connection. Returns the
    /// connections that were registered, for final notification.
    pub fn close(&self) -> Vec<Arc<ConnectionHandle>> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Vec::new();
        }

        let ids: Vec<Uuid> = self.connections.iter().map(|r| *r.key()).collect();
        let drained: Vec<Arc<ConnectionHandle>> = ids
            .into_iter()
            .filter_map(|id| self.remove(id))
            .inspect(|handle| handle.release())
            .collect();

        tracing::info!(connections = drained.len(), "Connection registry closed");
        drained
    }

    /// Send to a snapshot of connections with bounded concurrency. Returns
    /// the number delivered and the connections whose send failed.
    async fn fan_out(
        &self,
        targets: Vec<Arc<ConnectionHandle>>,
        message: &OutboundMessage,
    ) -> (usize, Vec<Arc<ConnectionHandle>>) {
        let send_timeout = self.limits.send_timeout;
        let max_in_flight = self.limits.max_concurrent_sends.max(1);

        let mut futures = FuturesUnordered::new();
        let mut delivered = 0;
        let mut failed = Vec::new();

        let mut record = |result: (Arc<ConnectionHandle>, bool)| match result {
            (_, true) => delivered += 1,
            (conn, false) => failed.push(conn),
        };

        for conn in targets {
            let msg = message.clone();
            futures.push(async move {
                let ok = matches!(
                    timeout(send_timeout, conn.send_outbound(msg)).await,
                    Ok(Ok(()))
                );
                (conn, ok)
            });

            while futures.len() >= max_in_flight {
                match futures.next().await {
                    Some(result) => record(result),
                    None => break,
                }
            }
        }

        while let Some(result) = futures.next().await {
            record(result);
        }

        (delivered, failed)
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChannelHub for ConnectionManager {
    fn subscribe(
        &self,
        channel: Channel,
        sender: mpsc::Sender<OutboundMessage>,
    ) -> Result<SubscriptionHandle, RegistryError> {
        if self.is_closed() {
            return Err(RegistryError::Closed);
        }

        let handle = Arc::new(ConnectionHandle::new(channel.clone(), sender));
        let conn_id = handle.id;

        self.connections.insert(conn_id, handle.clone());
        self.channels
            .entry(channel.clone())
            .or_default()
            .insert(conn_id, handle.clone());
        handle.set_state(ConnectionState::Subscribed);

        // close() may have drained between the check and the insert
        if self.is_closed() {
            self.remove(conn_id);
            handle.set_state(ConnectionState::Unsubscribed);
            return Err(RegistryError::Closed);
        }

        ConnectionMetrics::set_totals(self.connections.len(), self.channels.len());
        tracing::info!(connection_id = %conn_id, channel = %channel, "Connection subscribed");

        Ok(SubscriptionHandle::new(handle))
    }

    fn unsubscribe(&self, handle: &SubscriptionHandle) -> Option<Arc<ConnectionHandle>> {
        let removed = self.remove(handle.id())?;
        if !removed.state().is_terminal() {
            removed.set_state(ConnectionState::Unsubscribed);
        }
        tracing::info!(
            connection_id = %removed.id,
            channel = %removed.channel,
            "Connection unsubscribed"
        );
        Some(removed)
    }

    #[tracing::instrument(name = "registry.broadcast", skip(self, message), fields(channel = %channel))]
    async fn broadcast(&self, channel: &Channel, message: OutboundMessage) -> DeliveryReport {
        let started = Instant::now();

        let mut targets = self.channel_members(channel);
        targets.extend(self.channel_members(&Channel::Global));

        if channel.is_global() {
            BroadcastMetrics::record_global();
        } else {
            BroadcastMetrics::record_poll();
        }

        if targets.is_empty() {
            tracing::trace!("Broadcast to empty channel");
            return DeliveryReport::default();
        }

        let (delivered, failed) = self.fan_out(targets, &message).await;

        let mut pruned = 0;
        for conn in &failed {
            if self.remove(conn.id).is_some() {
                tracing::debug!(connection_id = %conn.id, channel = %conn.channel, "Pruned failed subscriber");
                conn.evict();
                pruned += 1;
            }
        }

        let report = DeliveryReport {
            delivered,
            failed: failed.len(),
            pruned,
        };
        BroadcastMetrics::record_outcome(
            report.delivered,
            report.failed,
            report.pruned,
            started.elapsed().as_secs_f64(),
        );
        tracing::debug!(
            delivered = report.delivered,
            failed = report.failed,
            pruned = report.pruned,
            "Broadcast completed"
        );

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::ServerMessage;

    fn text(msg: &OutboundMessage) -> String {
        msg.to_json().unwrap().into_owned()
    }

    #[tokio::test]
    async fn test_subscribe_creates_and_unsubscribe_removes_channel() {
        let manager = ConnectionManager::new();
        let (tx, _rx) = mpsc::channel(4);

        let handle = manager.subscribe(Channel::poll("p1"), tx).unwrap();
        assert_eq!(handle.connection().state(), ConnectionState::Subscribed);
        assert!(manager.get_channel_info(&Channel::poll("p1")).is_some());

        let removed = manager.unsubscribe(&handle).unwrap();
        assert_eq!(removed.state(), ConnectionState::Unsubscribed);
        assert!(manager.get_channel_info(&Channel::poll("p1")).is_none());
        assert_eq!(manager.stats().total_channels, 0);

        // idempotent
        assert!(manager.unsubscribe(&handle).is_none());
    }

    #[tokio::test]
    async fn test_broadcast_to_empty_channel_is_noop() {
        let manager = ConnectionManager::new();
        let report = manager
            .broadcast(&Channel::poll("nobody"), OutboundMessage::Raw(ServerMessage::Heartbeat))
            .await;
        assert_eq!(report, DeliveryReport::default());
    }

    #[tokio::test]
    async fn test_broadcast_prunes_closed_receivers() {
        let manager = ConnectionManager::new();
        let (live_tx, mut live_rx) = mpsc::channel(4);
        let (dead_tx, dead_rx) = mpsc::channel(4);
        manager.subscribe(Channel::poll("p1"), live_tx).unwrap();
        let dead = manager.subscribe(Channel::poll("p1"), dead_tx).unwrap();
        drop(dead_rx);

        let msg = OutboundMessage::from_payload(&serde_json::json!({"type": "poll_deleted"})).unwrap();
        let report = manager.broadcast(&Channel::poll("p1"), msg.clone()).await;

        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.pruned, 1);
        assert_eq!(text(&live_rx.recv().await.unwrap()), text(&msg));
        assert_eq!(dead.connection().state(), ConnectionState::Failed);
        assert_eq!(manager.connection_count(), 1);
    }

    #[tokio::test]
    async fn test_slow_subscriber_times_out_without_blocking_others() {
        let manager = ConnectionManager::with_limits(FanoutLimits {
            max_concurrent_sends: 10,
            send_timeout: std::time::Duration::from_millis(50),
        });
        let (slow_tx, _slow_rx) = mpsc::channel(1);
        let (fast_tx, mut fast_rx) = mpsc::channel(8);
        let slow = manager.subscribe(Channel::poll("p"), slow_tx).unwrap();
        manager.subscribe(Channel::poll("p"), fast_tx).unwrap();

        // fill the slow buffer so the next send blocks
        slow.connection()
            .send(ServerMessage::Heartbeat)
            .await
            .unwrap();

        let report = manager
            .broadcast(&Channel::poll("p"), OutboundMessage::Raw(ServerMessage::Heartbeat))
            .await;
        assert_eq!(report.delivered, 1);
        assert_eq!(report.pruned, 1);
        assert!(fast_rx.recv().await.is_some());
        assert!(manager.get_connection(slow.id()).is_none());
    }

    #[tokio::test]
    async fn test_close_rejects_new_subscriptions() {
        let manager = ConnectionManager::new();
        let (tx, _rx) = mpsc::channel(1);
        manager.subscribe(Channel::Global, tx.clone()).unwrap();

        let drained = manager.close();
        assert_eq!(drained.len(), 1);
        assert!(manager.close().is_empty());
        assert!(matches!(
            manager.subscribe(Channel::Global, tx),
            Err(RegistryError::Closed)
        ));
        assert_eq!(manager.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_cleanup_stale_connections() {
        let manager = ConnectionManager::new();
        let (tx, _rx) = mpsc::channel(1);
        let handle = manager.subscribe(Channel::poll("p"), tx).unwrap();

        assert_eq!(manager.cleanup_stale_connections(60), 0);
        // zero timeout only catches connections idle for over a second
        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
        assert_eq!(manager.cleanup_stale_connections(0), 1);
        assert_eq!(handle.connection().state(), ConnectionState::Failed);
        assert!(manager.list_channels().is_empty());
    }
}
