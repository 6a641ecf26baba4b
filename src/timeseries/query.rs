//! Query parameters for timeseries requests and their validation.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::TimeseriesConfig;

use super::TimeseriesError;

/// Naive layouts accepted when the input carries no offset; read as UTC.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Layouts with an explicit numeric offset that RFC 3339 rejects (`+0200`).
const OFFSET_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%z"];

/// What each sample value measures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Cumulative votes per option
    Count,
    /// Share of all votes cast so far, 0-100
    #[default]
    Percent,
}

impl FromStr for Metric {
    type Err = TimeseriesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "count" => Ok(Self::Count),
            "percent" => Ok(Self::Percent),
            other => Err(TimeseriesError::InvalidParameter {
                name: "metric",
                value: other.to_string(),
                expected: "count|percent",
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Smoothing {
    #[serde(rename = "ma")]
    MovingAverage,
    #[serde(rename = "ema")]
    Exponential,
}

impl FromStr for Smoothing {
    type Err = TimeseriesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ma" => Ok(Self::MovingAverage),
            "ema" => Ok(Self::Exponential),
            other => Err(TimeseriesError::InvalidParameter {
                name: "smooth",
                value: other.to_string(),
                expected: "ma|ema",
            }),
        }
    }
}

/// Raw query string of `GET /api/polls/{poll_id}/timeseries`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TimeseriesParams {
    pub points: Option<usize>,
    pub metric: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub smooth: Option<String>,
    pub window: Option<usize>,
}

/// A validated query. Every numeric field is within the configured bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeseriesQuery {
    pub points: usize,
    pub metric: Metric,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub smoothing: Option<Smoothing>,
    pub window: usize,
}

impl TimeseriesParams {
    /// Apply defaults, parse bounds and check ranges.
    pub fn validate(self, limits: &TimeseriesConfig) -> Result<TimeseriesQuery, TimeseriesError> {
        let points = self.points.unwrap_or(limits.default_points);
        check_range("points", points, limits.min_points, limits.max_points)?;

        let window = self.window.unwrap_or(limits.default_window);
        check_range("window", window, limits.min_window, limits.max_window)?;

        let metric = match self.metric.as_deref() {
            Some(m) => m.parse()?,
            None => Metric::default(),
        };
        let smoothing = self.smooth.as_deref().map(str::parse).transpose()?;

        Ok(TimeseriesQuery {
            points,
            metric,
            from: self.from.as_deref().map(parse_timestamp).transpose()?,
            to: self.to.as_deref().map(parse_timestamp).transpose()?,
            smoothing,
            window,
        })
    }
}

fn check_range(
    name: &'static str,
    value: usize,
    min: usize,
    max: usize,
) -> Result<(), TimeseriesError> {
    if value < min || value > max {
        return Err(TimeseriesError::OutOfRange {
            name,
            value,
            min,
            max,
        });
    }
    Ok(())
}

/// Parse an ISO 8601 timestamp and normalize it to UTC.
///
/// Accepts a trailing `Z`, an explicit offset (`+02:00` or `+0200`), or no
/// zone at all, in which case the value is taken to be UTC already. A bare
/// date means midnight UTC.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, TimeseriesError> {
    let value = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }

    for format in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(value, format) {
            return Ok(dt.with_timezone(&Utc));
        }
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(naive.and_utc());
        }
    }

    if let Some(midnight) = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    {
        return Ok(midnight.and_utc());
    }

    Err(TimeseriesError::InvalidTimestamp {
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_parse_timestamp_zone_spellings_agree() {
        let expected = utc("2024-03-01T12:00:00Z");
        assert_eq!(parse_timestamp("2024-03-01T12:00:00Z").unwrap(), expected);
        assert_eq!(parse_timestamp("2024-03-01T12:00:00+00:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2024-03-01T14:00:00+02:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2024-03-01T14:00:00+0200").unwrap(), expected);
        assert_eq!(parse_timestamp("2024-03-01T12:00:00").unwrap(), expected);
        assert_eq!(parse_timestamp(" 2024-03-01 12:00:00 ").unwrap(), expected);
    }

    #[test]
    fn test_parse_timestamp_fractional_and_date_only() {
        assert_eq!(
            parse_timestamp("2024-03-01T12:00:00.250Z").unwrap(),
            utc("2024-03-01T12:00:00.250Z")
        );
        assert_eq!(
            parse_timestamp("2024-03-01").unwrap(),
            utc("2024-03-01T00:00:00Z")
        );
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        let err = parse_timestamp("yesterday").unwrap_err();
        assert!(matches!(err, TimeseriesError::InvalidTimestamp { .. }));
        assert!(err.to_string().contains("ISO 8601"));
    }

    #[test]
    fn test_validate_applies_defaults() {
        let limits = TimeseriesConfig::default();
        let query = TimeseriesParams::default().validate(&limits).unwrap();
        assert_eq!(query.points, 120);
        assert_eq!(query.window, 3);
        assert_eq!(query.metric, Metric::Percent);
        assert_eq!(query.smoothing, None);
        assert!(query.from.is_none() && query.to.is_none());
    }

    #[test]
    fn test_validate_bounds() {
        let limits = TimeseriesConfig::default();

        let too_few = TimeseriesParams {
            points: Some(9),
            ..Default::default()
        };
        assert!(matches!(
            too_few.validate(&limits),
            Err(TimeseriesError::OutOfRange { name: "points", .. })
        ));

        let too_wide = TimeseriesParams {
            window: Some(26),
            ..Default::default()
        };
        assert!(matches!(
            too_wide.validate(&limits),
            Err(TimeseriesError::OutOfRange { name: "window", .. })
        ));

        let edges = TimeseriesParams {
            points: Some(200),
            window: Some(2),
            ..Default::default()
        };
        assert!(edges.validate(&limits).is_ok());
    }

    #[test]
    fn test_validate_parses_enums_and_bounds() {
        let limits = TimeseriesConfig::default();
        let params = TimeseriesParams {
            points: Some(50),
            metric: Some("count".to_string()),
            from: Some("2024-01-01T00:00:00Z".to_string()),
            to: Some("2024-01-02T00:00:00+00:00".to_string()),
            smooth: Some("ema".to_string()),
            window: Some(5),
        };
        let query = params.validate(&limits).unwrap();
        assert_eq!(query.metric, Metric::Count);
        assert_eq!(query.smoothing, Some(Smoothing::Exponential));
        assert_eq!(query.from, Some(utc("2024-01-01T00:00:00Z")));
        assert_eq!(query.to, Some(utc("2024-01-02T00:00:00Z")));
    }

    #[test]
    fn test_validate_rejects_unknown_metric_and_smoothing() {
        let limits = TimeseriesConfig::default();
        let bad_metric = TimeseriesParams {
            metric: Some("ratio".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            bad_metric.validate(&limits),
            Err(TimeseriesError::InvalidParameter { name: "metric", .. })
        ));

        let bad_smooth = TimeseriesParams {
            smooth: Some("lowess".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            bad_smooth.validate(&limits),
            Err(TimeseriesError::InvalidParameter { name: "smooth", .. })
        ));
    }
}
