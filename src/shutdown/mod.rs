//! Graceful shutdown.
//!
//! 1. Tell every connected client the server is going away, with a
//!    reconnect hint
//! 2. Signal background tasks to stop
//! 3. Close the registry: no new subscriptions, every connection released
//! 4. Wait, bounded, for transports to finish flushing and hang up

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::broadcast;
use tokio::time::timeout;

use crate::connection_manager::{ConnectionHandle, ConnectionManager};
use crate::websocket::ServerMessage;

/// Configuration for graceful shutdown behavior
#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// Time to wait for clients to be notified (default: 5 seconds)
    pub client_notification_timeout: Duration,
    /// Time to wait for transports to close (default: 10 seconds)
    pub drain_timeout: Duration,
    /// Bound on a single client's notification send (default: 2 seconds)
    pub per_client_timeout: Duration,
    /// Suggested reconnect delay to send to clients (default: 5 seconds)
    pub reconnect_after_seconds: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            client_notification_timeout: Duration::from_secs(5),
            drain_timeout: Duration::from_secs(10),
            per_client_timeout: Duration::from_secs(2),
            reconnect_after_seconds: 5,
        }
    }
}

pub struct GracefulShutdown {
    registry: Arc<ConnectionManager>,
    shutdown_tx: broadcast::Sender<()>,
    config: ShutdownConfig,
}

impl GracefulShutdown {
    pub fn new(registry: Arc<ConnectionManager>, shutdown_tx: broadcast::Sender<()>) -> Self {
        Self::with_config(registry, shutdown_tx, ShutdownConfig::default())
    }

    pub fn with_config(
        registry: Arc<ConnectionManager>,
        shutdown_tx: broadcast::Sender<()>,
        config: ShutdownConfig,
    ) -> Self {
        Self {
            registry,
            shutdown_tx,
            config,
        }
    }

    /// Execute graceful shutdown sequence
    #[tracing::instrument(
        name = "graceful_shutdown",
        skip(self),
        fields(total_connections = self.registry.connection_count())
    )]
    pub async fn execute(&self, reason: &str) -> ShutdownResult {
        let start = std::time::Instant::now();
        let mut result = ShutdownResult::default();

        tracing::info!(reason = %reason, "Starting graceful shutdown - Phase 1: Notifying clients");
        result.clients_notified = self.notify_clients(reason).await;

        tracing::info!("Phase 2: Signaling background tasks to stop");
        let _ = self.shutdown_tx.send(());

        tracing::info!("Phase 3: Closing connection registry");
        let released = self.registry.close();

        tracing::info!("Phase 4: Waiting for connections to close");
        result.connections_closed = self.wait_for_transports(&released).await;

        result.duration = start.elapsed();
        result.success = true;

        tracing::info!(
            clients_notified = result.clients_notified,
            connections_closed = result.connections_closed,
            duration_ms = result.duration.as_millis(),
            "Graceful shutdown completed"
        );

        result
    }

    /// Queue a `shutdown` message on every live connection. Returns how many
    /// were accepted before `client_notification_timeout`.
    async fn notify_clients(&self, reason: &str) -> usize {
        let connections = self.registry.get_all_connections();
        if connections.is_empty() {
            return 0;
        }
        let total = connections.len();

        let message = ServerMessage::shutdown(reason, Some(self.config.reconnect_after_seconds));
        let per_client = self.config.per_client_timeout;
        let mut pending: FuturesUnordered<_> = connections
            .into_iter()
            .map(|conn| {
                let msg = message.clone();
                async move {
                    let sent = matches!(timeout(per_client, conn.send(msg)).await, Ok(Ok(())));
                    if !sent {
                        tracing::debug!(connection_id = %conn.id, "Shutdown notification not delivered");
                    }
                    sent
                }
            })
            .collect();

        let mut notified = 0;
        let drained = timeout(self.config.client_notification_timeout, async {
            while let Some(sent) = pending.next().await {
                notified += usize::from(sent);
            }
        })
        .await;
        if drained.is_err() {
            tracing::warn!(notified, total, "Shutdown notification phase timed out");
        }

        tracing::info!(notified, total, "Shutdown notifications sent");
        notified
    }

    /// A transport has hung up once it drops its receiving end.
    async fn wait_for_transports(&self, released: &[Arc<ConnectionHandle>]) -> usize {
        if released.is_empty() {
            return 0;
        }

        let _ = timeout(
            self.config.drain_timeout,
            join_all(released.iter().map(|conn| conn.sender.closed())),
        )
        .await;

        let remaining = released.iter().filter(|c| !c.sender.is_closed()).count();
        if remaining > 0 {
            tracing::warn!(remaining_connections = remaining, "Some connections did not close gracefully");
        }
        released.len() - remaining
    }
}

/// Result of a graceful shutdown operation
#[derive(Debug, Default)]
pub struct ShutdownResult {
    pub success: bool,
    /// Number of clients that were notified
    pub clients_notified: usize,
    /// Number of connections that closed within the drain timeout
    pub connections_closed: usize,
    /// Total time taken for shutdown
    pub duration: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection_manager::{Channel, ChannelHub};
    use crate::websocket::OutboundMessage;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_shutdown_no_connections() {
        let (tx, _) = broadcast::channel(1);
        let shutdown = GracefulShutdown::new(Arc::new(ConnectionManager::new()), tx);

        let result = shutdown.execute("test shutdown").await;

        assert!(result.success);
        assert_eq!(result.clients_notified, 0);
        assert_eq!(result.connections_closed, 0);
    }

    #[tokio::test]
    async fn test_shutdown_notifies_and_closes() {
        let registry = Arc::new(ConnectionManager::new());
        let (conn_tx, mut conn_rx) = mpsc::channel(4);
        let subscription = registry.subscribe(Channel::Global, conn_tx).unwrap();
        let (tx, mut signal) = broadcast::channel(1);

        // transport: read until released, then hang up
        let transport = tokio::spawn(async move {
            let first = conn_rx.recv().await;
            subscription.connection().evicted().await;
            drop(conn_rx);
            first
        });

        let config = ShutdownConfig {
            drain_timeout: Duration::from_secs(2),
            ..Default::default()
        };
        let result = GracefulShutdown::with_config(registry.clone(), tx, config)
            .execute("maintenance")
            .await;

        assert_eq!(result.clients_notified, 1);
        assert_eq!(result.connections_closed, 1);
        assert!(signal.try_recv().is_ok());
        assert!(registry.is_closed());

        let first = transport.await.unwrap().unwrap();
        assert!(matches!(
            first,
            OutboundMessage::Raw(ServerMessage::Shutdown { reconnect_after: Some(5), .. })
        ));
    }

    #[test]
    fn test_shutdown_config_defaults() {
        let config = ShutdownConfig::default();
        assert_eq!(config.client_notification_timeout, Duration::from_secs(5));
        assert_eq!(config.drain_timeout, Duration::from_secs(10));
        assert_eq!(config.per_client_timeout, Duration::from_secs(2));
        assert_eq!(config.reconnect_after_seconds, 5);
    }
}
