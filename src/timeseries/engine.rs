use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::TimeseriesConfig;
use crate::metrics::TimeseriesMetrics;
use crate::store::{EventStore, PollRecord, VoteEvent};

use super::cache::{CacheKey, TimeseriesCache};
use super::query::TimeseriesQuery;
use super::sampling::{
    cumulative_counts, ensure_chronological, resolve_window, sample_timestamps, TimeWindow,
};
use super::transform::{apply_metric, round_to, OUTPUT_PRECISION};
use super::TimeseriesError;

/// One sample of a series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub x: DateTime<Utc>,
    pub y: f64,
}

/// The curve of one poll option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub id: Uuid,
    pub label: String,
    pub data: Vec<DataPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesMeta {
    pub option_id_to_label: BTreeMap<Uuid, String>,
}

/// Body of `GET /api/polls/{poll_id}/timeseries`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeseriesResponse {
    pub series: Vec<Series>,
    pub meta: SeriesMeta,
}

/// Answers timeseries queries against an [`EventStore`], memoizing results
/// in a [`TimeseriesCache`].
pub struct TimeseriesEngine {
    store: Arc<dyn EventStore>,
    cache: TimeseriesCache,
    clock: Arc<dyn Clock>,
    limits: TimeseriesConfig,
}

impl TimeseriesEngine {
    pub fn new(store: Arc<dyn EventStore>, clock: Arc<dyn Clock>, limits: TimeseriesConfig) -> Self {
        let ttl = Duration::seconds(limits.cache_ttl_seconds as i64);
        Self {
            store,
            cache: TimeseriesCache::new(ttl),
            clock,
            limits,
        }
    }

    /// Bounds used to validate incoming parameters
    pub fn limits(&self) -> &TimeseriesConfig {
        &self.limits
    }

    pub fn cache(&self) -> &TimeseriesCache {
        &self.cache
    }

    /// Evict expired cache entries.
    pub fn purge_expired_cache(&self) -> usize {
        let removed = self.cache.purge_expired(self.clock.now());
        TimeseriesMetrics::set_cache_entries(self.cache.len());
        removed
    }

    #[instrument(
        name = "timeseries.query",
        skip(self, query),
        fields(points = query.points, metric = ?query.metric)
    )]
    pub async fn query(
        &self,
        poll_id: Uuid,
        query: &TimeseriesQuery,
    ) -> Result<Arc<TimeseriesResponse>, TimeseriesError> {
        let poll = self
            .store
            .get_poll(poll_id)
            .await?
            .ok_or(TimeseriesError::PollNotFound(poll_id))?;

        let now = self.clock.now();
        let window = resolve_window(&poll, query.from, query.to, now, query.points);

        let key = CacheKey {
            poll_id,
            points: query.points,
            metric: query.metric,
            from: query.from,
            to: query.to,
            smoothing: query.smoothing,
            window: query.window,
        };

        if let Some(cached) = self.cache.get(&key, now) {
            TimeseriesMetrics::record_cache_hit();
            tracing::debug!(poll_id = %poll_id, "Timeseries cache hit");
            return Ok(cached);
        }

        let started = Instant::now();
        let mut events = self.store.vote_events(poll_id).await?;
        ensure_chronological(&mut events);

        let response = Arc::new(build_series(&poll, &events, &window, query));
        self.cache.insert(key, response.clone(), now);

        TimeseriesMetrics::record_cache_miss(started.elapsed().as_secs_f64());
        TimeseriesMetrics::set_cache_entries(self.cache.len());
        tracing::debug!(
            poll_id = %poll_id,
            events = events.len(),
            options = poll.options.len(),
            "Timeseries computed"
        );

        Ok(response)
    }
}

/// Reconstruct every option's curve over `window`.
///
/// `events` must already be sorted by `occurred_at`.
pub fn build_series(
    poll: &PollRecord,
    events: &[VoteEvent],
    window: &TimeWindow,
    query: &TimeseriesQuery,
) -> TimeseriesResponse {
    let samples = sample_timestamps(window, query.points);
    let counts = cumulative_counts(events, &samples, &poll.options);
    let values = apply_metric(&counts, query.metric);

    let series = poll
        .options
        .iter()
        .zip(values)
        .map(|(option, values)| {
            let values = match query.smoothing {
                Some(smoothing) => smoothing.apply(&values, query.window),
                None => values,
            };
            Series {
                id: option.id,
                label: option.label.clone(),
                data: samples
                    .iter()
                    .zip(values)
                    .map(|(&x, y)| DataPoint {
                        x,
                        y: round_to(y, OUTPUT_PRECISION),
                    })
                    .collect(),
            }
        })
        .collect();

    TimeseriesResponse {
        series,
        meta: SeriesMeta {
            option_id_to_label: poll
                .options
                .iter()
                .map(|o| (o.id, o.label.clone()))
                .collect(),
        },
    }
}
