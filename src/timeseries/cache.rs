//! Short-lived memo of computed timeseries.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use super::engine::TimeseriesResponse;
use super::query::{Metric, Smoothing};

/// Everything that changes the computed output. Bounds are the caller's
/// `from`/`to` normalized to UTC, so equivalent spellings share an entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub poll_id: Uuid,
    pub points: usize,
    pub metric: Metric,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub smoothing: Option<Smoothing>,
    pub window: usize,
}

struct CacheEntry {
    computed_at: DateTime<Utc>,
    response: Arc<TimeseriesResponse>,
}

/// TTL cache. Entries older than the TTL are never returned and are
/// evicted lazily on lookup or by [`TimeseriesCache::purge_expired`].
pub struct TimeseriesCache {
    entries: DashMap<CacheKey, CacheEntry>,
    ttl: Duration,
}

impl TimeseriesCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, key: &CacheKey, now: DateTime<Utc>) -> Option<Arc<TimeseriesResponse>> {
        let fresh = {
            let entry = self.entries.get(key)?;
            if now - entry.computed_at < self.ttl {
                Some(entry.response.clone())
            } else {
                None
            }
        };

        if fresh.is_none() {
            self.entries
                .remove_if(key, |_, entry| now - entry.computed_at >= self.ttl);
        }
        fresh
    }

    pub fn insert(&self, key: CacheKey, response: Arc<TimeseriesResponse>, now: DateTime<Utc>) {
        self.entries.insert(
            key,
            CacheEntry {
                computed_at: now,
                response,
            },
        );
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now - entry.computed_at < self.ttl);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::timeseries::engine::SeriesMeta;

    fn key(points: usize) -> CacheKey {
        let t = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        CacheKey {
            poll_id: Uuid::nil(),
            points,
            metric: Metric::Percent,
            from: Some(t),
            to: None,
            smoothing: None,
            window: 3,
        }
    }

    fn response() -> Arc<TimeseriesResponse> {
        Arc::new(TimeseriesResponse {
            series: vec![],
            meta: SeriesMeta {
                option_id_to_label: BTreeMap::new(),
            },
        })
    }

    #[test]
    fn test_hit_within_ttl_miss_after() {
        let cache = TimeseriesCache::new(Duration::seconds(5));
        let t0 = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        cache.insert(key(10), response(), t0);

        assert!(cache.get(&key(10), t0 + Duration::seconds(4)).is_some());
        assert!(cache.get(&key(11), t0).is_none());
        assert!(cache.get(&key(10), t0 + Duration::seconds(5)).is_none());
        // expired entry evicted on lookup
        assert!(cache.is_empty());
    }

    #[test]
    fn test_purge_expired() {
        let cache = TimeseriesCache::new(Duration::seconds(5));
        let t0 = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        cache.insert(key(10), response(), t0);
        cache.insert(key(20), response(), t0 + Duration::seconds(3));

        assert_eq!(cache.purge_expired(t0 + Duration::seconds(6)), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&key(20), t0 + Duration::seconds(6)).is_some());
    }
}
