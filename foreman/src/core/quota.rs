//! Hourly invocation quota.
//!
//! The bucket is keyed by calendar hour, not a sliding window: a call at
//! minute 59 and one at minute 1 of the next hour land in different buckets.
//! This is an intentional, auditable quota rather than precise rate control.

use serde::{Deserialize, Serialize};

pub const DEFAULT_HOURLY_CEILING: u32 = 20;

const SECS_PER_HOUR: u64 = 3600;

/// Bucket key for a wall-clock instant (hours since the unix epoch).
pub fn hour_key(epoch_secs: u64) -> u64 {
    epoch_secs / SECS_PER_HOUR
}

/// Seconds until the current bucket rolls over.
pub fn secs_until_rollover(epoch_secs: u64) -> u64 {
    SECS_PER_HOUR - (epoch_secs % SECS_PER_HOUR)
}

/// Persisted limiter state (`.foreman/state/limiter.json`).
///
/// A corrupt or missing document is recreated with zero usage; the limiter
/// has no failure mode of its own.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimiterState {
    /// Bucket the current count belongs to.
    hour_key: u64,
    calls_this_hour: u32,
    /// Lifetime counter across buckets, for reporting only.
    session_calls: u64,
}

impl LimiterState {
    /// Whether an invocation is permitted at `epoch_secs` under `ceiling`.
    pub fn can_invoke(&self, epoch_secs: u64, ceiling: u32) -> bool {
        if hour_key(epoch_secs) != self.hour_key {
            return true;
        }
        self.calls_this_hour < ceiling
    }

    /// Count one invocation at `epoch_secs`, rolling the bucket first.
    pub fn record_invocation(&mut self, epoch_secs: u64) {
        self.roll(epoch_secs);
        self.calls_this_hour += 1;
        self.session_calls += 1;
    }

    /// Zero the counter if the wall-clock hour has moved past the bucket.
    pub fn roll(&mut self, epoch_secs: u64) {
        let key = hour_key(epoch_secs);
        if key != self.hour_key {
            self.hour_key = key;
            self.calls_this_hour = 0;
        }
    }

    pub fn calls_this_hour(&self, epoch_secs: u64) -> u32 {
        if hour_key(epoch_secs) != self.hour_key {
            return 0;
        }
        self.calls_this_hour
    }

    pub fn session_calls(&self) -> u64 {
        self.session_calls
    }
}
