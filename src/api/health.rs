//! Health check and statistics endpoints.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::connection_manager::ConnectionStats;
use crate::events::PublisherStatsSnapshot;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub store: StoreHealthResponse,
    pub connections: ConnectionHealthResponse,
}

#[derive(Debug, Serialize)]
pub struct StoreHealthResponse {
    pub backend: String,
}

#[derive(Debug, Serialize)]
pub struct ConnectionHealthResponse {
    pub total: usize,
    pub channels_count: usize,
    pub accepting: bool,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub connections: ConnectionStats,
    pub events: PublisherStatsSnapshot,
    pub timeseries: TimeseriesStats,
}

#[derive(Debug, Serialize)]
pub struct TimeseriesStats {
    pub cache_entries: usize,
    pub cache_ttl_seconds: i64,
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let stats = state.registry.stats();
    let accepting = !state.registry.is_closed();

    Json(HealthResponse {
        status: if accepting { "healthy" } else { "shutting_down" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        store: StoreHealthResponse {
            backend: state.store.backend_name().to_string(),
        },
        connections: ConnectionHealthResponse {
            total: stats.total_connections,
            channels_count: stats.total_channels,
            accepting,
        },
    })
}

/// GET /stats
pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let cache = state.engine.cache();

    Json(StatsResponse {
        connections: state.registry.stats(),
        events: state.publisher.stats(),
        timeseries: TimeseriesStats {
            cache_entries: cache.len(),
            cache_ttl_seconds: cache.ttl().num_seconds(),
        },
    })
}
