//! In-memory event store using DashMap.
//!
//! Data lives only as long as the process. Votes are kept per poll in
//! append order, which doubles as the tie-breaker for equal timestamps.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use super::{EventStore, PollRecord, StoreError, VoteEvent};

#[derive(Default)]
pub struct MemoryEventStore {
    polls: DashMap<Uuid, PollRecord>,
    votes: DashMap<Uuid, Vec<VoteEvent>>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a poll.
    pub fn insert_poll(&self, poll: PollRecord) {
        self.votes.entry(poll.id).or_default();
        self.polls.insert(poll.id, poll);
    }

    /// Drop a poll together with its votes.
    pub fn remove_poll(&self, poll_id: Uuid) -> Option<PollRecord> {
        self.votes.remove(&poll_id);
        self.polls.remove(&poll_id).map(|(_, poll)| poll)
    }

    /// Append a vote to the poll's log.
    pub fn record_vote(
        &self,
        poll_id: Uuid,
        option_id: Uuid,
        occurred_at: DateTime<Utc>,
    ) -> Result<VoteEvent, StoreError> {
        let poll = self
            .polls
            .get(&poll_id)
            .ok_or(StoreError::PollNotFound(poll_id))?;

        if !poll.options.iter().any(|o| o.id == option_id) {
            return Err(StoreError::UnknownOption { poll_id, option_id });
        }
        drop(poll);

        let event = VoteEvent {
            event_id: Uuid::new_v4(),
            poll_id,
            option_id,
            occurred_at,
        };
        self.votes.entry(poll_id).or_default().push(event.clone());

        tracing::trace!(poll_id = %poll_id, option_id = %option_id, "Vote recorded");
        Ok(event)
    }

    pub fn vote_count(&self, poll_id: Uuid) -> usize {
        self.votes.get(&poll_id).map(|v| v.len()).unwrap_or(0)
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn get_poll(&self, poll_id: Uuid) -> Result<Option<PollRecord>, StoreError> {
        Ok(self.polls.get(&poll_id).map(|p| p.clone()))
    }

    async fn vote_events(&self, poll_id: Uuid) -> Result<Vec<VoteEvent>, StoreError> {
        let mut events = self
            .votes
            .get(&poll_id)
            .map(|v| v.clone())
            .unwrap_or_default();
        // Votes may be recorded with back-dated timestamps; stable sort keeps
        // append order among equal instants.
        events.sort_by_key(|e| e.occurred_at);
        Ok(events)
    }
}
