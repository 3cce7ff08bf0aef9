use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use core::fmt;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Naive layouts accepted after RFC 3339 fails; all read as UTC.
const NAIVE_DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"];

/// A measurement or configuration timestamp that none of the accepted layouts could read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampError {
    pub input: String,
}

impl Display for TimestampError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "unrecognised timestamp: {:?}", self.input)
    }
}

impl Error for TimestampError {}

/// Parse an ISO-8601-like date string.
///
/// Accepted, in order:
/// - RFC 3339 with any offset (`2023-01-01T02:00:00+02:00`)
/// - naive date-time with `T` or space separator, optional fraction (UTC assumed)
/// - bare date (midnight UTC)
pub fn parse_timestamp(input: &str) -> Result<DateTime<Utc>, TimestampError> {
    let s = input.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    // "2023-01-01 00:00:00 +0100" and similar
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f %z") {
        return Ok(dt.with_timezone(&Utc));
    }
    for fmt in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        && let Some(naive) = date.and_hms_opt(0, 0, 0)
    {
        return Ok(naive.and_utc());
    }
    Err(TimestampError { input: input.to_string() })
}

/// Seconds since the Unix epoch for an ISO-8601-like date string.
pub fn unix_timestamp(input: &str) -> Result<i64, TimestampError> {
    parse_timestamp(input).map(|dt| dt.timestamp())
}
