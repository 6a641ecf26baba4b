use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::server::{api_key_auth, AppState};
use crate::triggers::publish_event;

use super::connection::{get_channel, list_channels};
use super::health::{health, stats};
use super::metrics::prometheus_metrics;
use super::timeseries::poll_timeseries;

pub fn api_routes(state: AppState) -> Router<AppState> {
    // Publishing is restricted to the poll service
    let protected = Router::new()
        .route("/polls/{poll_id}/events", post(publish_event))
        .route_layer(middleware::from_fn_with_state(state, api_key_auth));

    Router::new()
        // Health & Stats
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/metrics", get(prometheus_metrics))
        // Analytics
        .route("/api/polls/{poll_id}/timeseries", get(poll_timeseries))
        .nest(
            "/api/v1",
            Router::new()
                .route("/channels", get(list_channels))
                .route("/channels/{name}", get(get_channel))
                .merge(protected),
        )
}
