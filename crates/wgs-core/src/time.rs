//! Time utilities for wgs

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, UtcOffset};

/// Get the current Unix timestamp in milliseconds.
///
/// Returns 0 if the system clock is set before the Unix epoch, which is the
/// normal state of a device that has not synchronized its clock yet.
pub fn current_time_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Time elapsed since a millisecond timestamp.
///
/// Returns Duration::ZERO if the given time is in the future.
pub fn elapsed_since(since_millis: u64) -> Duration {
    Duration::from_millis(current_time_millis().saturating_sub(since_millis))
}

/// Render a wall-clock time as RFC 3339 in UTC
pub fn format_utc(at: SystemTime) -> String {
    format_at_offset(at, UtcOffset::UTC)
}

/// Render a wall-clock time as RFC 3339 at a fixed offset from UTC
pub fn format_at_offset(at: SystemTime, offset: UtcOffset) -> String {
    OffsetDateTime::from(at)
        .to_offset(offset)
        .format(&Rfc3339)
        .unwrap_or_else(|_| "<unrepresentable time>".to_string())
}
