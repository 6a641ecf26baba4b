use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::config::Settings;
use crate::connection_manager::{Channel, ConnectionManager};
use crate::error::AppError;
use crate::events::PollEventPublisher;
use crate::store::EventStore;
use crate::timeseries::TimeseriesEngine;
use crate::websocket::CLOSE_POLICY_VIOLATION;

const CLOSE_INTERNAL_ERROR: u16 = 1011;

/// Why a transport refused a channel.
#[derive(Debug, Error)]
pub enum ChannelRejection {
    #[error("Invalid poll ID")]
    InvalidPollId,

    #[error("Poll not found")]
    PollNotFound,

    #[error("Poll lookup failed: {0}")]
    Lookup(String),
}

impl ChannelRejection {
    /// Close frame reason sent to WebSocket clients
    pub fn reason(&self) -> &'static str {
        match self {
            Self::InvalidPollId => "Invalid poll ID",
            Self::PollNotFound => "Poll not found",
            Self::Lookup(_) => "Internal error",
        }
    }

    pub fn close_code(&self) -> u16 {
        match self {
            Self::InvalidPollId | Self::PollNotFound => CLOSE_POLICY_VIOLATION,
            Self::Lookup(_) => CLOSE_INTERNAL_ERROR,
        }
    }
}

impl From<ChannelRejection> for AppError {
    fn from(rejection: ChannelRejection) -> Self {
        match rejection {
            ChannelRejection::InvalidPollId => AppError::Validation(rejection.to_string()),
            ChannelRejection::PollNotFound => AppError::NotFound(rejection.to_string()),
            ChannelRejection::Lookup(msg) => AppError::Internal(msg),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub registry: Arc<ConnectionManager>,
    pub publisher: Arc<PollEventPublisher>,
    pub engine: Arc<TimeseriesEngine>,
    pub store: Arc<dyn EventStore>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(settings: Settings, store: Arc<dyn EventStore>) -> Self {
        Self::with_clock(settings, store, Arc::new(SystemClock))
    }

    pub fn with_clock(settings: Settings, store: Arc<dyn EventStore>, clock: Arc<dyn Clock>) -> Self {
        let registry = Arc::new(ConnectionManager::from_config(&settings.websocket));
        let publisher = Arc::new(PollEventPublisher::new(registry.clone()));
        let engine = Arc::new(TimeseriesEngine::new(
            store.clone(),
            clock,
            settings.timeseries.clone(),
        ));

        Self {
            settings: Arc::new(settings),
            registry,
            publisher,
            engine,
            store,
            start_time: Instant::now(),
        }
    }

    /// Map a transport path segment to a channel: `all`, or the id of an
    /// existing poll.
    pub async fn resolve_channel(&self, raw: &str) -> Result<Channel, ChannelRejection> {
        let channel: Channel = raw.parse().map_err(|_| ChannelRejection::InvalidPollId)?;
        if channel.is_global() {
            return Ok(channel);
        }

        let poll_id = Uuid::parse_str(channel.as_str()).map_err(|_| ChannelRejection::InvalidPollId)?;
        match self.store.poll_exists(poll_id).await {
            Ok(true) => Ok(Channel::poll(poll_id.to_string())),
            Ok(false) => Err(ChannelRejection::PollNotFound),
            Err(e) => {
                tracing::error!(poll_id = %poll_id, error = %e, "Poll lookup failed");
                Err(ChannelRejection::Lookup(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryEventStore, PollRecord};
    use chrono::Utc;

    fn state_with_poll() -> (AppState, Uuid) {
        let store = Arc::new(MemoryEventStore::new());
        let poll_id = Uuid::new_v4();
        store.insert_poll(PollRecord {
            id: poll_id,
            title: "t".to_string(),
            created_at: Utc::now(),
            expires_at: None,
            options: vec![],
        });
        (AppState::new(Settings::default(), store), poll_id)
    }

    #[tokio::test]
    async fn test_resolve_channel() {
        let (state, poll_id) = state_with_poll();

        assert_eq!(state.resolve_channel("all").await.unwrap(), Channel::Global);
        // normalized to the canonical hyphenated form
        let upper = poll_id.to_string().to_uppercase();
        assert_eq!(
            state.resolve_channel(&upper).await.unwrap(),
            Channel::poll(poll_id.to_string())
        );
        assert!(matches!(
            state.resolve_channel("not-a-uuid").await,
            Err(ChannelRejection::InvalidPollId)
        ));
        assert!(matches!(
            state.resolve_channel(&Uuid::new_v4().to_string()).await,
            Err(ChannelRejection::PollNotFound)
        ));
    }

    #[test]
    fn test_rejection_close_codes() {
        assert_eq!(ChannelRejection::InvalidPollId.close_code(), 1008);
        assert_eq!(ChannelRejection::PollNotFound.reason(), "Poll not found");
        assert_eq!(ChannelRejection::Lookup("db".into()).close_code(), 1011);
    }
}
