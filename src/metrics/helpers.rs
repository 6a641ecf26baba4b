//! Metrics helper structs for convenient metric recording

use prometheus::{Encoder, TextEncoder};

use super::{
    BROADCASTS_TOTAL, BROADCAST_LATENCY, CHANNELS_ACTIVE, CONNECTIONS_OPENED_TOTAL,
    CONNECTIONS_PRUNED_TOTAL, CONNECTIONS_TOTAL, EVENTS_PUBLISHED_TOTAL, HEARTBEAT_DURATION_MS,
    HEARTBEAT_TIMEOUTS, MESSAGES_DELIVERED_TOTAL, MESSAGES_FAILED_TOTAL, STALE_CONNECTIONS_REMOVED,
    TIMESERIES_BUILD_SECONDS, TIMESERIES_CACHE_ENTRIES, TIMESERIES_REQUESTS_TOTAL,
    WS_MESSAGES_RECEIVED,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

pub struct ConnectionMetrics;

impl ConnectionMetrics {
    /// Publish registry sizes
    pub fn set_totals(connections: usize, channels: usize) {
        CONNECTIONS_TOTAL.set(connections as i64);
        CHANNELS_ACTIVE.set(channels as i64);
    }

    pub fn record_opened(transport: &str) {
        CONNECTIONS_OPENED_TOTAL.with_label_values(&[transport]).inc();
    }
}

/// Helper struct for recording broadcast metrics
pub struct BroadcastMetrics;

impl BroadcastMetrics {
    pub fn record_global() {
        BROADCASTS_TOTAL.with_label_values(&["global"]).inc();
    }

    pub fn record_poll() {
        BROADCASTS_TOTAL.with_label_values(&["poll"]).inc();
    }

    /// Record the outcome of one fan-out
    pub fn record_outcome(delivered: usize, failed: usize, pruned: usize, latency_secs: f64) {
        MESSAGES_DELIVERED_TOTAL.inc_by(delivered as u64);
        MESSAGES_FAILED_TOTAL.inc_by(failed as u64);
        CONNECTIONS_PRUNED_TOTAL.inc_by(pruned as u64);
        BROADCAST_LATENCY.observe(latency_secs);
    }
}

pub struct EventMetrics;

impl EventMetrics {
    pub fn record_published(event_type: &str) {
        EVENTS_PUBLISHED_TOTAL.with_label_values(&[event_type]).inc();
    }
}

/// Helper struct for recording timeseries metrics
pub struct TimeseriesMetrics;

impl TimeseriesMetrics {
    pub fn record_cache_hit() {
        TIMESERIES_REQUESTS_TOTAL.with_label_values(&["hit"]).inc();
    }

    pub fn record_cache_miss(build_secs: f64) {
        TIMESERIES_REQUESTS_TOTAL.with_label_values(&["miss"]).inc();
        TIMESERIES_BUILD_SECONDS.observe(build_secs);
    }

    pub fn set_cache_entries(entries: usize) {
        TIMESERIES_CACHE_ENTRIES.set(entries as i64);
    }
}

pub struct HeartbeatMetrics;

impl HeartbeatMetrics {
    /// Record heartbeat round duration
    pub fn record_duration_ms(duration_ms: u64) {
        HEARTBEAT_DURATION_MS.observe(duration_ms as f64);
    }

    /// Record heartbeat timeouts
    pub fn record_timeouts(count: u64) {
        HEARTBEAT_TIMEOUTS.inc_by(count);
    }

    pub fn record_stale_removed(count: u64) {
        STALE_CONNECTIONS_REMOVED.inc_by(count);
    }
}

/// Helper struct for inbound WebSocket frames
pub struct WsMessageMetrics;

impl WsMessageMetrics {
    pub fn record_text() {
        WS_MESSAGES_RECEIVED.with_label_values(&["text"]).inc();
    }

    pub fn record_binary() {
        WS_MESSAGES_RECEIVED.with_label_values(&["binary"]).inc();
    }

    pub fn record_ping() {
        WS_MESSAGES_RECEIVED.with_label_values(&["ping"]).inc();
    }
}
