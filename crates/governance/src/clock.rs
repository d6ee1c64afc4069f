//! Time sources

use std::sync::atomic::{AtomicU64, Ordering};

use tokengate_common::utils::timestamp_secs;

/// A monotonic source of "now" in whole seconds
pub trait Clock: Send + Sync {
    /// Current time in seconds
    fn now(&self) -> u64;
}

/// Wall-clock time as unix seconds
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        timestamp_secs()
    }
}

/// A clock that only moves when told to.
///
/// Time never goes backwards: [`ManualClock::set`] ignores values earlier
/// than the current reading.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    /// Create a clock reading `start`
    pub fn new(start: u64) -> Self {
        Self {
            now: AtomicU64::new(start),
        }
    }

    /// Move the clock forward to `time`
    pub fn set(&self, time: u64) {
        self.now.fetch_max(time, Ordering::SeqCst);
    }

    /// Move the clock forward by `secs`, returning the new reading
    pub fn advance(&self, secs: u64) -> u64 {
        let previous = self
            .now
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |now| {
                Some(now.saturating_add(secs))
            })
            .unwrap_or_else(|current| current);
        previous.saturating_add(secs)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}
