//! Unix-seconds helpers.
//!
//! Cache records store wall-clock times as fractional Unix seconds, and the
//! at-rest key schedule rotates on whole-hour buckets of the same clock.

use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds in one hour.
pub const SECS_PER_HOUR: i64 = 60 * 60;

/// Seconds in one day.
pub const SECS_PER_DAY: i64 = 24 * SECS_PER_HOUR;

/// Returns the current time as fractional seconds since the Unix epoch.
///
/// A clock set before the epoch reads as `0.0`.
#[must_use]
pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Returns the hour bucket (`floor(secs / 3600)`) containing `unix_secs`.
#[must_use]
pub fn hour_bucket(unix_secs: f64) -> i64 {
    (unix_secs / SECS_PER_HOUR as f64).floor() as i64
}
