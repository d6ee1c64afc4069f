//! Utility functions for tokengate

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Seconds in one day
pub const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Get the current timestamp in seconds
pub fn timestamp_secs() -> u64 {
    let start = SystemTime::now();
    let since_epoch = start.duration_since(UNIX_EPOCH).unwrap_or(Duration::from_secs(0));
    since_epoch.as_secs()
}

/// Convert a number of days to seconds
pub fn days_to_secs(days: u64) -> u64 {
    days.saturating_mul(SECONDS_PER_DAY)
}
