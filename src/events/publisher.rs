use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::connection_manager::{Channel, ChannelHub, DeliveryReport};
use crate::metrics::EventMetrics;
use crate::websocket::OutboundMessage;

use super::PollEvent;

#[derive(Debug, Default)]
pub struct PublisherStats {
    pub events_published: AtomicU64,
    pub total_delivered: AtomicU64,
    pub total_failed: AtomicU64,
    pub total_pruned: AtomicU64,
}

impl PublisherStats {
    pub fn snapshot(&self) -> PublisherStatsSnapshot {
        PublisherStatsSnapshot {
            events_published: self.events_published.load(Ordering::Relaxed),
            total_delivered: self.total_delivered.load(Ordering::Relaxed),
            total_failed: self.total_failed.load(Ordering::Relaxed),
            total_pruned: self.total_pruned.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PublisherStatsSnapshot {
    pub events_published: u64,
    pub total_delivered: u64,
    pub total_failed: u64,
    pub total_pruned: u64,
}

/// Routes poll events to the poll's channel; the hub adds the global
/// channel on every broadcast.
pub struct PollEventPublisher {
    hub: Arc<dyn ChannelHub>,
    stats: PublisherStats,
}

impl PollEventPublisher {
    pub fn new(hub: Arc<dyn ChannelHub>) -> Self {
        Self {
            hub,
            stats: PublisherStats::default(),
        }
    }

    pub fn stats(&self) -> PublisherStatsSnapshot {
        self.stats.snapshot()
    }

    #[tracing::instrument(
        name = "publisher.publish",
        skip(self, event),
        fields(poll_id = %event.poll_id(), event_type = event.event_type())
    )]
    pub async fn publish(&self, event: &PollEvent) -> Result<DeliveryReport, serde_json::Error> {
        let message = OutboundMessage::from_payload(event)?;
        let channel = Channel::poll(event.poll_id().to_string());

        let report = self.hub.broadcast(&channel, message).await;

        self.stats.events_published.fetch_add(1, Ordering::Relaxed);
        self.stats
            .total_delivered
            .fetch_add(report.delivered as u64, Ordering::Relaxed);
        self.stats
            .total_failed
            .fetch_add(report.failed as u64, Ordering::Relaxed);
        self.stats
            .total_pruned
            .fetch_add(report.pruned as u64, Ordering::Relaxed);
        EventMetrics::record_published(event.event_type());

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection_manager::ConnectionManager;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_publish_reaches_poll_and_global_subscribers() {
        let manager = Arc::new(ConnectionManager::new());
        let publisher = PollEventPublisher::new(manager.clone());
        let poll_id = Uuid::new_v4();

        let (poll_tx, mut poll_rx) = mpsc::channel(4);
        let (all_tx, mut all_rx) = mpsc::channel(4);
        let (other_tx, mut other_rx) = mpsc::channel(4);
        manager.subscribe(Channel::poll(poll_id.to_string()), poll_tx).unwrap();
        manager.subscribe(Channel::Global, all_tx).unwrap();
        manager
            .subscribe(Channel::poll(Uuid::new_v4().to_string()), other_tx)
            .unwrap();

        let event = PollEvent::PollDeleted { poll_id };
        let report = publisher.publish(&event).await.unwrap();
        assert_eq!(report.delivered, 2);

        let expected = serde_json::to_string(&event).unwrap();
        assert_eq!(poll_rx.recv().await.unwrap().to_json().unwrap(), expected);
        assert_eq!(all_rx.recv().await.unwrap().to_json().unwrap(), expected);
        assert!(other_rx.try_recv().is_err());

        let stats = publisher.stats();
        assert_eq!(stats.events_published, 1);
        assert_eq!(stats.total_delivered, 2);
    }
}
