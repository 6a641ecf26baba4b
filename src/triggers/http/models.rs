use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct PublishEventResponse {
    pub event_type: &'static str,
    pub delivered: usize,
    pub failed: usize,
    pub pruned: usize,
    pub timestamp: DateTime<Utc>,
}
