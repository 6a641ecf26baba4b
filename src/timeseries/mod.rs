//! Vote timeseries reconstruction.
//!
//! Rebuilds per-option cumulative vote curves from the append-only event log:
//!
//! 1. resolve the sampling window from the poll and the query bounds
//! 2. generate evenly spaced sample instants
//! 3. sweep the chronologically sorted events once, recording running counts
//! 4. convert to the requested metric, optionally smooth, round
//!
//! Results are cached for a short TTL keyed on every input that changes the
//! output.

mod cache;
mod engine;
mod query;
mod sampling;
mod transform;

use thiserror::Error;
use uuid::Uuid;

use crate::store::StoreError;

pub use cache::{CacheKey, TimeseriesCache};
pub use engine::{build_series, DataPoint, Series, SeriesMeta, TimeseriesEngine, TimeseriesResponse};
pub use query::{parse_timestamp, Metric, Smoothing, TimeseriesParams, TimeseriesQuery};
pub use sampling::{
    cumulative_counts, ensure_chronological, fallback_width, resolve_window, sample_timestamps,
    TimeWindow,
};
pub use transform::{apply_metric, exponential, moving_average, round_to, OUTPUT_PRECISION};

/// Errors raised while validating or answering a timeseries query.
#[derive(Debug, Error)]
pub enum TimeseriesError {
    #[error("Poll {0} not found")]
    PollNotFound(Uuid),

    #[error("Invalid timestamp format '{value}'; use ISO 8601 (e.g. 2024-01-01T12:00:00Z)")]
    InvalidTimestamp { value: String },

    #[error("{name} must be between {min} and {max}, got {value}")]
    OutOfRange {
        name: &'static str,
        value: usize,
        min: usize,
        max: usize,
    },

    #[error("Invalid {name} '{value}', expected {expected}")]
    InvalidParameter {
        name: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("Event store error: {0}")]
    Store(#[from] StoreError),
}

impl TimeseriesError {
    /// Whether the caller supplied bad input, as opposed to a lookup or
    /// backend failure.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidTimestamp { .. } | Self::OutOfRange { .. } | Self::InvalidParameter { .. }
        )
    }
}
