//! ISO-8601 timestamps as stored in requests and cache files

use chrono::{DateTime, SecondsFormat, Utc};

/// Formats a UTC instant as an ISO-8601 string with millisecond precision
pub fn to_iso8601(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Returns the current time as an ISO-8601 string
pub fn now_iso8601() -> String {
    to_iso8601(Utc::now())
}

/// Parses an ISO-8601 (RFC 3339) string into a UTC instant
pub fn parse_iso8601(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Seconds elapsed between two ISO-8601 timestamps, negative if `to` precedes `from`
///
/// Returns `None` if either string fails to parse.
pub fn elapsed_seconds(from: &str, to: &str) -> Option<f64> {
    let from = parse_iso8601(from)?;
    let to = parse_iso8601(to)?;
    Some(seconds_between(from, to))
}

/// Seconds elapsed between two instants with millisecond resolution
pub fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 1000.0
}
