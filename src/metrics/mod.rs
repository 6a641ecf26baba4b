//! Prometheus metrics for pollcast.
//!
//! - Connection metrics (active connections, channels)
//! - Broadcast metrics (fan-out, deliveries, failures, pruning)
//! - Timeseries metrics (requests, cache hits, build latency)
//! - Heartbeat and WebSocket inbound metrics

mod helpers;

pub use helpers::{
    encode_metrics, BroadcastMetrics, ConnectionMetrics, EventMetrics, HeartbeatMetrics,
    TimeseriesMetrics, WsMessageMetrics,
};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "pollcast";

lazy_static! {
    // ============================================================================
    // Connection Metrics
    // ============================================================================

    /// Total number of registered connections
    pub static ref CONNECTIONS_TOTAL: IntGauge = register_int_gauge!(
        format!("{}_connections_total", METRIC_PREFIX),
        "Total number of registered live connections"
    ).unwrap();

    /// Channels with at least one subscriber
    pub static ref CHANNELS_ACTIVE: IntGauge = register_int_gauge!(
        format!("{}_channels_active", METRIC_PREFIX),
        "Total number of channels with at least one subscriber"
    ).unwrap();

    /// Connections opened, by transport
    pub static ref CONNECTIONS_OPENED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_connections_opened_total", METRIC_PREFIX),
        "Total connections accepted",
        &["transport"]
    ).unwrap();

    // ============================================================================
    // Broadcast Metrics
    // ============================================================================

    /// Broadcasts by target scope (poll or global)
    pub static ref BROADCASTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_broadcasts_total", METRIC_PREFIX),
        "Total broadcasts issued",
        &["scope"]
    ).unwrap();

    pub static ref MESSAGES_DELIVERED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_messages_delivered_total", METRIC_PREFIX),
        "Total messages successfully handed to connections"
    ).unwrap();

    pub static ref MESSAGES_FAILED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_messages_failed_total", METRIC_PREFIX),
        "Total message deliveries that failed"
    ).unwrap();

    /// Connections removed because a send failed
    pub static ref CONNECTIONS_PRUNED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_connections_pruned_total", METRIC_PREFIX),
        "Total connections removed after a failed send"
    ).unwrap();

    /// Wall time of one broadcast fan-out
    pub static ref BROADCAST_LATENCY: Histogram = register_histogram!(
        format!("{}_broadcast_latency_seconds", METRIC_PREFIX),
        "Broadcast fan-out latency in seconds",
        vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]
    ).unwrap();

    /// Poll events accepted through the publish endpoint
    pub static ref EVENTS_PUBLISHED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_events_published_total", METRIC_PREFIX),
        "Total poll events published",
        &["type"]
    ).unwrap();

    // ============================================================================
    // Timeseries Metrics
    // ============================================================================

    /// Timeseries requests by cache outcome
    pub static ref TIMESERIES_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_timeseries_requests_total", METRIC_PREFIX),
        "Total timeseries requests",
        &["cache"]
    ).unwrap();

    pub static ref TIMESERIES_BUILD_SECONDS: Histogram = register_histogram!(
        format!("{}_timeseries_build_seconds", METRIC_PREFIX),
        "Time spent reconstructing a timeseries on cache miss",
        vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]
    ).unwrap();

    pub static ref TIMESERIES_CACHE_ENTRIES: IntGauge = register_int_gauge!(
        format!("{}_timeseries_cache_entries", METRIC_PREFIX),
        "Entries currently held in the timeseries cache"
    ).unwrap();

    // ============================================================================
    // WebSocket / Heartbeat Metrics
    // ============================================================================

    /// Inbound WebSocket frames by kind
    pub static ref WS_MESSAGES_RECEIVED: IntCounterVec = register_int_counter_vec!(
        format!("{}_ws_messages_received_total", METRIC_PREFIX),
        "Total WebSocket messages received from clients",
        &["kind"]
    ).unwrap();

    pub static ref HEARTBEAT_DURATION_MS: Histogram = register_histogram!(
        format!("{}_heartbeat_duration_ms", METRIC_PREFIX),
        "Heartbeat round duration in milliseconds",
        vec![1.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0, 5000.0]
    ).unwrap();

    pub static ref HEARTBEAT_TIMEOUTS: IntCounter = register_int_counter!(
        format!("{}_heartbeat_timeouts_total", METRIC_PREFIX),
        "Total heartbeat sends that timed out"
    ).unwrap();

    pub static ref STALE_CONNECTIONS_REMOVED: IntCounter = register_int_counter!(
        format!("{}_stale_connections_removed_total", METRIC_PREFIX),
        "Total connections removed for inactivity"
    ).unwrap();
}
