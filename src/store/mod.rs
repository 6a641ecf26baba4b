//! Read side of the poll event log.
//!
//! The timeseries engine only depends on the [`EventStore`] trait; the
//! concrete backend is chosen at startup by [`create_event_store`]:
//!
//! - `memory`: [`MemoryEventStore`], process-local, used in tests and demos
//! - `postgres`: [`PostgresEventStore`], reads the `polls`, `options` and
//!   `votes` tables

mod memory;
mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::StoreConfig;

pub use memory::MemoryEventStore;
pub use postgres::PostgresEventStore;

/// Errors raised by event store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Poll {0} not found")]
    PollNotFound(Uuid),

    #[error("Option {option_id} does not belong to poll {poll_id}")]
    UnknownOption { poll_id: Uuid, option_id: Uuid },

    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    #[error("Unknown store backend: {0}")]
    UnknownBackend(String),
}

/// One selectable answer of a poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollOption {
    pub id: Uuid,
    pub label: String,
}

/// The parts of a poll the engine needs to resolve windows and label series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollRecord {
    pub id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Options in display order
    pub options: Vec<PollOption>,
}

/// An immutable vote from the append-only log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteEvent {
    pub event_id: Uuid,
    pub poll_id: Uuid,
    pub option_id: Uuid,
    pub occurred_at: DateTime<Utc>,
}

#[async_trait]
pub trait EventStore: Send + Sync {
    /// Backend identifier for logs and health output
    fn backend_name(&self) -> &'static str;

    async fn get_poll(&self, poll_id: Uuid) -> Result<Option<PollRecord>, StoreError>;

    /// Every vote of the poll, ascending by `occurred_at`; ties keep
    /// insertion order.
    async fn vote_events(&self, poll_id: Uuid) -> Result<Vec<VoteEvent>, StoreError>;

    async fn poll_exists(&self, poll_id: Uuid) -> Result<bool, StoreError> {
        Ok(self.get_poll(poll_id).await?.is_some())
    }
}

/// Build the configured event store backend.
pub async fn create_event_store(config: &StoreConfig) -> Result<Arc<dyn EventStore>, StoreError> {
    match config.backend.as_str() {
        "memory" => {
            tracing::info!("Using in-memory event store");
            Ok(Arc::new(MemoryEventStore::new()))
        }
        "postgres" => {
            let store = PostgresEventStore::connect(&config.database).await?;
            tracing::info!(
                pool_size = config.database.pool_size,
                "Using PostgreSQL event store"
            );
            Ok(Arc::new(store))
        }
        other => Err(StoreError::UnknownBackend(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_factory_builds_memory_store() {
        let config = StoreConfig::default();
        let store = create_event_store(&config).await.unwrap();
        assert_eq!(store.backend_name(), "memory");
    }

    #[tokio::test]
    async fn test_factory_rejects_unknown_backend() {
        let config = StoreConfig {
            backend: "cassandra".to_string(),
            ..Default::default()
        };
        let err = create_event_store(&config).await.err().unwrap();
        assert!(matches!(err, StoreError::UnknownBackend(ref b) if b == "cassandra"));
    }
}
