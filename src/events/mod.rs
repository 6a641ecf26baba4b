//! Poll events relayed to live observers.
//!
//! The payload is a tagged union on `type`; the registry never inspects it,
//! it only carries the serialized bytes.

mod publisher;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use publisher::{PollEventPublisher, PublisherStats, PublisherStatsSnapshot};

/// Current vote count of one option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionTally {
    pub id: Uuid,
    pub text: String,
    pub vote_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentPayload {
    pub id: Uuid,
    pub content: String,
    pub user_email: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PollEvent {
    VoteUpdate {
        poll_id: Uuid,
        options: Vec<OptionTally>,
    },
    CommentAdded {
        poll_id: Uuid,
        comment: CommentPayload,
    },
    CommentDeleted {
        poll_id: Uuid,
        comment_id: Uuid,
    },
    BookmarkUpdate {
        poll_id: Uuid,
        bookmark_count: u64,
    },
    PollDeleted {
        poll_id: Uuid,
    },
}

impl PollEvent {
    pub fn poll_id(&self) -> Uuid {
        match self {
            Self::VoteUpdate { poll_id, .. }
            | Self::CommentAdded { poll_id, .. }
            | Self::CommentDeleted { poll_id, .. }
            | Self::BookmarkUpdate { poll_id, .. }
            | Self::PollDeleted { poll_id } => *poll_id,
        }
    }

    /// Wire name of the variant
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::VoteUpdate { .. } => "vote_update",
            Self::CommentAdded { .. } => "comment_added",
            Self::CommentDeleted { .. } => "comment_deleted",
            Self::BookmarkUpdate { .. } => "bookmark_update",
            Self::PollDeleted { .. } => "poll_deleted",
        }
    }
}
