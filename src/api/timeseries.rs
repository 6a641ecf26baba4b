use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    Json,
};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::server::AppState;
use crate::timeseries::{TimeseriesParams, TimeseriesResponse};

/// GET /api/polls/{poll_id}/timeseries
#[tracing::instrument(name = "http.poll_timeseries", skip(state, params))]
pub async fn poll_timeseries(
    State(state): State<AppState>,
    Path(poll_id): Path<String>,
    params: std::result::Result<Query<TimeseriesParams>, QueryRejection>,
) -> Result<Json<TimeseriesResponse>> {
    let poll_id = Uuid::parse_str(&poll_id)
        .map_err(|_| AppError::Validation(format!("Invalid poll ID '{}'", poll_id)))?;
    // non-numeric points/window fail here rather than in validate
    let Query(params) = params.map_err(|e| AppError::Validation(e.body_text()))?;
    let query = params.validate(state.engine.limits())?;

    let response = state.engine.query(poll_id, &query).await?;
    Ok(Json(response.as_ref().clone()))
}
