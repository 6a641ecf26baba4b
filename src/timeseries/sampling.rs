//! Window resolution, sample generation and the cumulative sweep.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::store::{PollOption, PollRecord, VoteEvent};

/// Closed time interval `[start, end]` the samples span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Resolve the sampling window for a poll.
///
/// Defaults to `[created_at, min(now, expires_at)]`. An explicit `from`
/// replaces the start, an explicit `to` can only pull the end earlier. When
/// the result is empty or inverted the window becomes a short trailing range
/// ending at `end`, so sampling always yields `points` timestamps.
pub fn resolve_window(
    poll: &PollRecord,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    points: usize,
) -> TimeWindow {
    let mut start = from.unwrap_or(poll.created_at);

    let mut end = now;
    if let Some(expires_at) = poll.expires_at {
        end = end.min(expires_at);
    }
    if let Some(to) = to {
        end = end.min(to);
    }

    if start >= end {
        start = end - fallback_width(points);
    }

    TimeWindow { start, end }
}

/// One second per sample step, never zero.
pub fn fallback_width(points: usize) -> Duration {
    Duration::seconds(points.saturating_sub(1).max(1) as i64)
}

/// `points` evenly spaced instants from `window.start` to `window.end`.
///
/// Offsets are computed with integer arithmetic from the start, so the
/// sequence is non-decreasing and the last sample is exactly `window.end`.
pub fn sample_timestamps(window: &TimeWindow, points: usize) -> Vec<DateTime<Utc>> {
    match points {
        0 => return Vec::new(),
        1 => return vec![window.start],
        _ => {}
    }

    let span = window.end - window.start;
    let (span_units, unit): (i64, fn(i64) -> Duration) = match span.num_nanoseconds() {
        Some(ns) => (ns, Duration::nanoseconds),
        None => (span.num_milliseconds(), Duration::milliseconds),
    };

    let steps = (points - 1) as i128;
    let mut samples = Vec::with_capacity(points);
    for i in 0..points - 1 {
        let offset = (span_units as i128 * i as i128 / steps) as i64;
        samples.push(window.start + unit(offset));
    }
    samples.push(window.end);
    samples
}

/// Cumulative votes per option at every sample instant.
///
/// `events` must be sorted ascending by `occurred_at`. One pass advances an
/// event cursor and a sample cursor together: for each sample every event at
/// or before it is applied, then the running counts are recorded. Votes for
/// options not listed in `options` are consumed but not counted.
///
/// The result is indexed `[option][sample]`, in the order of `options`.
pub fn cumulative_counts(
    events: &[VoteEvent],
    samples: &[DateTime<Utc>],
    options: &[PollOption],
) -> Vec<Vec<u64>> {
    let slots: HashMap<Uuid, usize> = options
        .iter()
        .enumerate()
        .map(|(slot, option)| (option.id, slot))
        .collect();

    let mut running = vec![0u64; options.len()];
    let mut series: Vec<Vec<u64>> = (0..options.len())
        .map(|_| Vec::with_capacity(samples.len()))
        .collect();

    let mut cursor = 0;
    for &sample in samples {
        while let Some(event) = events.get(cursor) {
            if event.occurred_at > sample {
                break;
            }
            if let Some(&slot) = slots.get(&event.option_id) {
                running[slot] += 1;
            }
            cursor += 1;
        }

        for (slot, count) in running.iter().enumerate() {
            series[slot].push(*count);
        }
    }

    series
}

/// Sort by `occurred_at` unless already ordered. The sort is stable, so
/// events sharing an instant keep their log order.
pub fn ensure_chronological(events: &mut [VoteEvent]) {
    let ordered = events
        .windows(2)
        .all(|pair| pair[0].occurred_at <= pair[1].occurred_at);
    if !ordered {
        events.sort_by_key(|e| e.occurred_at);
    }
}
