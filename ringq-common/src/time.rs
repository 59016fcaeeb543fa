//! Timestamp utilities

use chrono::{DateTime, SecondsFormat, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Render a timestamp the way log entries carry it (RFC 3339, UTC, milliseconds)
pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Current wall-clock time as a log entry timestamp string
pub fn wall_clock() -> String {
    format_timestamp(now())
}
