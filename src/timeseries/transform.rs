//! Metric conversion, smoothing filters and output rounding.

use super::query::{Metric, Smoothing};

/// Decimal places kept in every output value.
pub const OUTPUT_PRECISION: i32 = 4;

/// Convert `[option][sample]` cumulative counts into the requested metric.
///
/// Percent divides by the cross-option total at the same sample; a zero
/// total yields 0 for every option.
pub fn apply_metric(counts: &[Vec<u64>], metric: Metric) -> Vec<Vec<f64>> {
    match metric {
        Metric::Count => counts
            .iter()
            .map(|series| series.iter().map(|&c| c as f64).collect())
            .collect(),
        Metric::Percent => {
            let samples = counts.first().map(Vec::len).unwrap_or(0);
            let totals: Vec<u64> = (0..samples)
                .map(|i| counts.iter().map(|series| series[i]).sum())
                .collect();

            counts
                .iter()
                .map(|series| {
                    series
                        .iter()
                        .zip(&totals)
                        .map(|(&count, &total)| {
                            if total == 0 {
                                0.0
                            } else {
                                count as f64 / total as f64 * 100.0
                            }
                        })
                        .collect()
                })
                .collect()
        }
    }
}

impl Smoothing {
    pub fn apply(self, values: &[f64], window: usize) -> Vec<f64> {
        match self {
            Smoothing::MovingAverage => moving_average(values, window),
            Smoothing::Exponential => exponential(values, window),
        }
    }
}

/// Centered mean over `window / 2` neighbours on each side, clipped at the
/// sequence edges rather than padded.
pub fn moving_average(values: &[f64], window: usize) -> Vec<f64> {
    if window <= 1 || values.is_empty() {
        return values.to_vec();
    }

    let half = window / 2;
    (0..values.len())
        .map(|i| {
            let lo = i.saturating_sub(half);
            let hi = (i + half + 1).min(values.len());
            let segment = &values[lo..hi];
            segment.iter().sum::<f64>() / segment.len() as f64
        })
        .collect()
}

/// Exponential smoothing with `alpha = 2 / (window + 1)`, seeded with the
/// first value.
pub fn exponential(values: &[f64], window: usize) -> Vec<f64> {
    let Some(&seed) = values.first() else {
        return Vec::new();
    };
    if window <= 1 {
        return values.to_vec();
    }

    let alpha = 2.0 / (window as f64 + 1.0);
    let mut prev = seed;
    values
        .iter()
        .map(|&v| {
            prev = alpha * v + (1.0 - alpha) * prev;
            prev
        })
        .collect()
}

pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_percent_sums_to_hundred_or_zero() {
        let counts = vec![vec![0, 1, 1, 2], vec![0, 0, 2, 5], vec![0, 0, 0, 3]];
        let pct = apply_metric(&counts, Metric::Percent);

        for i in 0..4 {
            let sum: f64 = pct.iter().map(|s| s[i]).sum();
            if i == 0 {
                assert!(pct.iter().all(|s| s[0] == 0.0));
            } else {
                assert!(close(sum, 100.0), "sample {i} sums to {sum}");
            }
        }
        assert!(close(pct[0][3], 20.0));
    }

    #[test]
    fn test_count_metric_passes_through() {
        let counts = vec![vec![0, 3, 7]];
        assert_eq!(apply_metric(&counts, Metric::Count), vec![vec![0.0, 3.0, 7.0]]);
        assert!(apply_metric(&[], Metric::Percent).is_empty());
    }

    #[test]
    fn test_moving_average_clips_edges() {
        let values = [0.0, 3.0, 6.0, 9.0];
        // window 3 -> half 1: [0,3], [0,3,6], [3,6,9], [6,9]
        assert_eq!(moving_average(&values, 3), vec![1.5, 3.0, 6.0, 7.5]);
        // window 4 -> half 2, symmetric
        assert_eq!(moving_average(&values, 4), vec![3.0, 4.5, 4.5, 6.0]);
    }

    #[test]
    fn test_exponential_seeds_with_first_value() {
        let values = [10.0, 20.0, 20.0];
        let out = exponential(&values, 3);
        // alpha = 0.5
        assert!(close(out[0], 10.0));
        assert!(close(out[1], 15.0));
        assert!(close(out[2], 17.5));
    }

    #[test]
    fn test_smoothing_noop_for_small_window() {
        let values = [1.0, 5.0, 2.0];
        for window in [0, 1] {
            assert_eq!(moving_average(&values, window), values.to_vec());
            assert_eq!(exponential(&values, window), values.to_vec());
        }
        assert!(moving_average(&[], 5).is_empty());
        assert!(exponential(&[], 5).is_empty());
    }

    #[test]
    fn test_round_to_four_places() {
        assert_eq!(round_to(33.333333, OUTPUT_PRECISION), 33.3333);
        assert_eq!(round_to(66.666666, OUTPUT_PRECISION), 66.6667);
        assert_eq!(round_to(0.0, OUTPUT_PRECISION), 0.0);
    }
}
