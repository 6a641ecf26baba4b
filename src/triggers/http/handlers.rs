use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::events::PollEvent;
use crate::server::AppState;

use super::models::PublishEventResponse;

/// Relay a poll event to the poll's observers and to the global channel
#[tracing::instrument(
    name = "http.publish_event",
    skip(state, event),
    fields(poll_id = %poll_id, event_type = event.event_type())
)]
pub async fn publish_event(
    State(state): State<AppState>,
    Path(poll_id): Path<Uuid>,
    Json(event): Json<PollEvent>,
) -> Result<Json<PublishEventResponse>> {
    if event.poll_id() != poll_id {
        return Err(AppError::Validation(format!(
            "Event poll_id {} does not match path poll_id {}",
            event.poll_id(),
            poll_id
        )));
    }

    let report = state
        .publisher
        .publish(&event)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to serialize event: {}", e)))?;

    Ok(Json(PublishEventResponse {
        event_type: event.event_type(),
        delivered: report.delivered,
        failed: report.failed,
        pruned: report.pruned,
        timestamp: Utc::now(),
    }))
}
