use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::sync::broadcast;
use tokio::time::timeout;

use crate::config::WebSocketConfig;
use crate::connection_manager::ConnectionManager;
use crate::metrics::HeartbeatMetrics;
use crate::timeseries::TimeseriesEngine;
use crate::websocket::ServerMessage;

/// Maximum concurrent heartbeat sends to avoid overwhelming the system
const MAX_CONCURRENT_HEARTBEATS: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SendOutcome {
    Sent,
    Failed,
    TimedOut,
}

/// Background task for heartbeats, stale connection cleanup and expiring
/// timeseries cache entries
pub struct HeartbeatTask {
    config: WebSocketConfig,
    registry: Arc<ConnectionManager>,
    engine: Arc<TimeseriesEngine>,
    shutdown: broadcast::Receiver<()>,
}

impl HeartbeatTask {
    pub fn new(
        config: WebSocketConfig,
        registry: Arc<ConnectionManager>,
        engine: Arc<TimeseriesEngine>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            config,
            registry,
            engine,
            shutdown,
        }
    }

    /// Run until the shutdown signal fires
    pub async fn run(mut self) {
        let heartbeat_interval = Duration::from_secs(self.config.heartbeat_interval);
        let cleanup_interval = Duration::from_secs(self.config.cleanup_interval);
        let connection_timeout = self.config.connection_timeout;

        let mut heartbeat_timer = tokio::time::interval(heartbeat_interval);
        let mut cleanup_timer = tokio::time::interval(cleanup_interval);

        // Skip immediate first tick
        heartbeat_timer.tick().await;
        cleanup_timer.tick().await;

        tracing::info!(
            heartbeat_interval_secs = self.config.heartbeat_interval,
            cleanup_interval_secs = self.config.cleanup_interval,
            connection_timeout_secs = connection_timeout,
            "Heartbeat task started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("Heartbeat task received shutdown signal");
                    break;
                }
                _ = heartbeat_timer.tick() => {
                    self.send_heartbeats().await;
                }
                _ = cleanup_timer.tick() => {
                    self.cleanup(connection_timeout);
                }
            }
        }

        tracing::info!("Heartbeat task stopped");
    }

    /// Send a heartbeat to every connection, in bounded batches
    async fn send_heartbeats(&self) -> usize {
        let connections = self.registry.get_all_connections();
        if connections.is_empty() {
            return 0;
        }

        let start = Instant::now();
        let send_timeout = Duration::from_millis(self.config.send_timeout_ms);
        let mut outcomes = Vec::with_capacity(connections.len());

        for batch in connections.chunks(MAX_CONCURRENT_HEARTBEATS) {
            let futures = batch.iter().map(|handle| async move {
                match timeout(send_timeout, handle.send(ServerMessage::Heartbeat)).await {
                    Ok(Ok(())) => SendOutcome::Sent,
                    Ok(Err(_)) => {
                        tracing::debug!(
                            connection_id = %handle.id,
                            "Failed to send heartbeat, connection may be dead"
                        );
                        SendOutcome::Failed
                    }
                    Err(_) => SendOutcome::TimedOut,
                }
            });
            outcomes.extend(join_all(futures).await);
        }

        let count = |o: SendOutcome| outcomes.iter().filter(|&&x| x == o).count();
        let (sent, failed, timed_out) = (
            count(SendOutcome::Sent),
            count(SendOutcome::Failed),
            count(SendOutcome::TimedOut),
        );

        let elapsed_ms = start.elapsed().as_millis() as u64;
        HeartbeatMetrics::record_duration_ms(elapsed_ms);
        if timed_out > 0 {
            HeartbeatMetrics::record_timeouts(timed_out as u64);
        }

        if failed > 0 || timed_out > 0 {
            tracing::warn!(sent, failed, timed_out, elapsed_ms, "Heartbeat round had failures");
        } else {
            tracing::debug!(sent, elapsed_ms, "Heartbeat round completed");
        }

        sent
    }

    fn cleanup(&self, connection_timeout: u64) {
        let removed = self.registry.cleanup_stale_connections(connection_timeout);
        if removed > 0 {
            HeartbeatMetrics::record_stale_removed(removed as u64);
            tracing::info!(removed, "Cleaned up stale connections");
        }

        let purged = self.engine.purge_expired_cache();
        if purged > 0 {
            tracing::debug!(purged, "Purged expired timeseries cache entries");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::config::TimeseriesConfig;
    use crate::connection_manager::{Channel, ChannelHub};
    use crate::store::MemoryEventStore;
    use crate::websocket::OutboundMessage;
    use tokio::sync::mpsc;

    fn task(registry: Arc<ConnectionManager>) -> (HeartbeatTask, broadcast::Sender<()>) {
        let engine = Arc::new(TimeseriesEngine::new(
            Arc::new(MemoryEventStore::new()),
            Arc::new(SystemClock),
            TimeseriesConfig::default(),
        ));
        let (tx, rx) = broadcast::channel(1);
        (HeartbeatTask::new(WebSocketConfig::default(), registry, engine, rx), tx)
    }

    #[tokio::test]
    async fn test_heartbeat_reaches_every_connection() {
        let registry = Arc::new(ConnectionManager::new());
        let (a_tx, mut a_rx) = mpsc::channel(4);
        let (b_tx, mut b_rx) = mpsc::channel(4);
        registry.subscribe(Channel::Global, a_tx).unwrap();
        registry.subscribe(Channel::poll("p"), b_tx).unwrap();

        let (task, _shutdown) = task(registry);
        assert_eq!(task.send_heartbeats().await, 2);

        for rx in [&mut a_rx, &mut b_rx] {
            let msg = rx.recv().await.unwrap();
            assert!(matches!(msg, OutboundMessage::Raw(ServerMessage::Heartbeat)));
        }
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let registry = Arc::new(ConnectionManager::new());
        let (task, shutdown) = task(registry);
        let handle = tokio::spawn(task.run());

        shutdown.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
