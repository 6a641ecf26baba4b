//! HTTP trigger for poll events.
//!
//! The poll service calls `POST /api/v1/polls/{poll_id}/events` after each
//! committed mutation (vote, comment, bookmark, deletion).

mod handlers;
mod models;

pub use handlers::publish_event;
pub use models::PublishEventResponse;
