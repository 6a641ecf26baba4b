//! PostgreSQL-backed event store.
//!
//! Reads the tables owned by the poll service:
//! - `polls (id, title, created_at, expires_at)`
//! - `options (id, poll_id, text)`
//! - `votes (id, poll_id, option_id, created_at)`
//!
//! The store never writes; vote creation belongs to the upstream service.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use uuid::Uuid;

use crate::config::DatabaseConfig;

use super::{EventStore, PollOption, PollRecord, StoreError, VoteEvent};

pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    /// Open a connection pool from configuration.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.pool_size)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds as u64))
            .idle_timeout(Duration::from_secs(config.idle_timeout_seconds as u64))
            .connect(&config.url)
            .await?;

        tracing::info!(pool_size = config.pool_size, "PostgreSQL connection pool created");

        Ok(Self { pool })
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    async fn get_poll(&self, poll_id: Uuid) -> Result<Option<PollRecord>, StoreError> {
        let row: Option<PollRow> = sqlx::query_as(
            r#"
            SELECT p.id, p.title, p.created_at, p.expires_at,
                   (SELECT MIN(v.created_at) FROM votes v WHERE v.poll_id = p.id) AS first_vote_at
            FROM polls p
            WHERE p.id = $1
            "#,
        )
        .bind(poll_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some((id, title, created_at, expires_at, first_vote_at)) = row else {
            return Ok(None);
        };

        // options carry no creation column; id is the only stable key
        let options: Vec<(Uuid, String)> = sqlx::query_as(
            r#"
            SELECT id, text
            FROM options
            WHERE poll_id = $1
            ORDER BY id
            "#,
        )
        .bind(poll_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(PollRecord {
            id,
            title,
            created_at: poll_start(created_at, first_vote_at, Utc::now()),
            expires_at,
            options: options
                .into_iter()
                .map(|(id, label)| PollOption { id, label })
                .collect(),
        }))
    }

    async fn vote_events(&self, poll_id: Uuid) -> Result<Vec<VoteEvent>, StoreError> {
        let rows: Vec<VoteRow> = sqlx::query_as(
            r#"
            SELECT id, poll_id, option_id, created_at
            FROM votes
            WHERE poll_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(poll_id)
        .fetch_all(&self.pool)
        .await?;

        let total = rows.len();
        let events = timed_events(rows);
        if events.len() < total {
            tracing::warn!(
                poll_id = %poll_id,
                skipped = total - events.len(),
                "Ignoring votes without a timestamp"
            );
        }
        tracing::trace!(poll_id = %poll_id, count = events.len(), "Loaded vote events");

        Ok(events)
    }
}

type PollRow = (
    Uuid,
    String,
    Option<DateTime<Utc>>,
    Option<DateTime<Utc>>,
    Option<DateTime<Utc>>,
);

type VoteRow = (Uuid, Uuid, Uuid, Option<DateTime<Utc>>);

/// `created_at` is nullable on `polls`. Without it the poll is taken to
/// start at its first vote, or now when it has none.
fn poll_start(
    created_at: Option<DateTime<Utc>>,
    first_vote_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    created_at.or(first_vote_at).unwrap_or(now)
}

/// Votes with a NULL `created_at` cannot be placed on the timeline.
fn timed_events(rows: Vec<VoteRow>) -> Vec<VoteEvent> {
    rows.into_iter()
        .filter_map(|(event_id, poll_id, option_id, occurred_at)| {
            Some(VoteEvent {
                event_id,
                poll_id,
                option_id,
                occurred_at: occurred_at?,
            })
        })
        .collect()
}
