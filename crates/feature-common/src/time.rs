//! Temporal interval parsing for the `datetime` parameter.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// The open-interval token. Only `..` is accepted; anything else on an
/// interval side must parse as a timestamp.
const OPEN_TOKEN: &str = "..";

/// A half-open or closed temporal interval.
///
/// Both sides `None` is unrepresentable through the parser; "no temporal
/// filter" is expressed by the parameter being absent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemporalInterval {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TemporalInterval {
    /// Create a closed interval.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    /// Create an interval covering a single instant.
    pub fn instant(at: DateTime<Utc>) -> Self {
        Self {
            start: Some(at),
            end: Some(at),
        }
    }

    /// Parse a `datetime` parameter value.
    ///
    /// Accepts a single instant (`2024-01-15T12:00:00Z`), a closed interval
    /// (`start/end`), or an interval open on one side (`../end`, `start/..`).
    pub fn from_query_string(s: &str) -> Result<Self, TimeParseError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(TimeParseError::Empty);
        }

        if let Some((start, end)) = s.split_once('/') {
            let start = Self::parse_side(start)?;
            let end = Self::parse_side(end)?;

            if start.is_none() && end.is_none() {
                return Err(TimeParseError::FullyUnbounded);
            }
            if let (Some(start), Some(end)) = (start, end) {
                if start > end {
                    return Err(TimeParseError::StartAfterEnd { start, end });
                }
            }
            return Ok(Self { start, end });
        }

        let at = parse_instant(s)?;
        Ok(Self::instant(at))
    }

    fn parse_side(s: &str) -> Result<Option<DateTime<Utc>>, TimeParseError> {
        let s = s.trim();
        if s == OPEN_TOKEN {
            return Ok(None);
        }
        parse_instant(s).map(Some)
    }

    /// Whether the interval is a single instant.
    pub fn is_instant(&self) -> bool {
        self.start.is_some() && self.start == self.end
    }
}

/// Parse an ISO 8601 timestamp, accepting RFC 3339, a naive datetime
/// (assumed UTC), or a bare date.
pub fn parse_instant(s: &str) -> Result<DateTime<Utc>, TimeParseError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    if let Ok(ndt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Ok(Utc.from_utc_datetime(&ndt));
    }

    if let Ok(nd) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        let ndt = nd.and_hms_opt(0, 0, 0).expect("midnight is valid");
        return Ok(Utc.from_utc_datetime(&ndt));
    }

    Err(TimeParseError::InvalidFormat(s.to_string()))
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum TimeParseError {
    #[error("Empty datetime value")]
    Empty,

    #[error("Invalid datetime format: {0}")]
    InvalidFormat(String),

    #[error("Interval unbounded on both sides")]
    FullyUnbounded,

    #[error("Interval start {start} is after end {end}")]
    StartAfterEnd {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}
