//! Stagnation circuit breaker over recent invocation outcomes.
//!
//! This is not a classical fault-tolerance breaker: it exists to stop burning
//! invocation quota on a worker that loops without changing anything. Once
//! open it stays open until an explicit reset; a new sprint resets it
//! implicitly.

use serde::{Deserialize, Serialize};

use crate::core::ring::Ring;

/// Consecutive failed invocations before the breaker opens.
pub const DEFAULT_FAILURE_CEILING: u32 = 3;
/// Consecutive zero-change invocations before the breaker opens.
pub const DEFAULT_NO_PROGRESS_CEILING: u32 = 5;

const RECENT_CAPACITY: usize = 10;

/// Ceilings the breaker trips at, taken from configuration.
#[derive(Debug, Clone, Copy)]
pub struct BreakerLimits {
    pub failure_ceiling: u32,
    pub no_progress_ceiling: u32,
}

impl Default for BreakerLimits {
    fn default() -> Self {
        Self {
            failure_ceiling: DEFAULT_FAILURE_CEILING,
            no_progress_ceiling: DEFAULT_NO_PROGRESS_CEILING,
        }
    }
}

/// One observed invocation outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeSample {
    pub loop_number: u32,
    pub files_changed: u32,
    pub had_error: bool,
    pub output_bytes: usize,
}

/// Persisted breaker state (`.foreman/state/breaker.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerState {
    recent: Ring<OutcomeSample>,
    consecutive_failures: u32,
    consecutive_no_progress: u32,
    open: bool,
    /// Why the breaker opened, while it is open.
    reason: Option<String>,
    /// Why the breaker was last reset, for the audit trail.
    last_reset: Option<String>,
}

impl Default for BreakerState {
    fn default() -> Self {
        Self {
            recent: Ring::new(RECENT_CAPACITY),
            consecutive_failures: 0,
            consecutive_no_progress: 0,
            open: false,
            reason: None,
            last_reset: None,
        }
    }
}

impl BreakerState {
    /// Feed one invocation outcome. Returns true when this outcome opened the
    /// breaker (already-open stays open without re-reporting).
    pub fn record_outcome(&mut self, sample: OutcomeSample, limits: &BreakerLimits) -> bool {
        if sample.had_error {
            self.consecutive_failures += 1;
        } else {
            self.consecutive_failures = 0;
        }
        if sample.files_changed == 0 {
            self.consecutive_no_progress += 1;
        } else {
            self.consecutive_no_progress = 0;
        }
        self.recent.push(sample);

        if self.open {
            return false;
        }
        if self.consecutive_failures >= limits.failure_ceiling {
            self.open = true;
            self.reason = Some(format!(
                "{} consecutive failed invocations",
                self.consecutive_failures
            ));
            return true;
        }
        if self.consecutive_no_progress >= limits.no_progress_ceiling {
            self.open = true;
            self.reason = Some(format!(
                "{} consecutive invocations with no observable change",
                self.consecutive_no_progress
            ));
            return true;
        }
        false
    }

    /// Whether the controller must halt. No auto-heal: only [`reset`] closes
    /// an open breaker.
    ///
    /// [`reset`]: BreakerState::reset
    pub fn should_halt(&self) -> bool {
        self.open
    }

    pub fn open_reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// Close the breaker and zero all counters, recording why.
    pub fn reset(&mut self, reason: &str) {
        self.open = false;
        self.reason = None;
        self.consecutive_failures = 0;
        self.consecutive_no_progress = 0;
        self.recent.clear();
        self.last_reset = Some(reason.to_string());
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn consecutive_no_progress(&self) -> u32 {
        self.consecutive_no_progress
    }

    pub fn recent(&self) -> impl Iterator<Item = &OutcomeSample> {
        self.recent.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(files_changed: u32, had_error: bool) -> OutcomeSample {
        OutcomeSample {
            loop_number: 1,
            files_changed,
            had_error,
            output_bytes: 100,
        }
    }

    #[test]
    fn opens_at_no_progress_ceiling_not_before() {
        let limits = BreakerLimits::default();
        let mut state = BreakerState::default();

        for n in 1..DEFAULT_NO_PROGRESS_CEILING {
            assert!(!state.record_outcome(sample(0, false), &limits), "loop {n}");
            assert!(!state.should_halt());
        }
        assert!(state.record_outcome(sample(0, false), &limits));
        assert!(state.should_halt());
        assert!(
            state
                .open_reason()
                .is_some_and(|r| r.contains("no observable change"))
        );
    }

    #[test]
    fn opens_at_failure_ceiling() {
        let limits = BreakerLimits::default();
        let mut state = BreakerState::default();

        assert!(!state.record_outcome(sample(2, true), &limits));
        assert!(!state.record_outcome(sample(1, true), &limits));
        assert!(state.record_outcome(sample(3, true), &limits));
        assert!(state.should_halt());
    }

    #[test]
    fn progress_resets_no_progress_counter() {
        let limits = BreakerLimits::default();
        let mut state = BreakerState::default();

        for _ in 0..4 {
            state.record_outcome(sample(0, false), &limits);
        }
        state.record_outcome(sample(1, false), &limits);
        assert_eq!(state.consecutive_no_progress(), 0);

        for _ in 0..4 {
            state.record_outcome(sample(0, false), &limits);
        }
        assert!(!state.should_halt());
    }

    #[test]
    fn success_resets_failure_counter() {
        let limits = BreakerLimits::default();
        let mut state = BreakerState::default();

        state.record_outcome(sample(1, true), &limits);
        state.record_outcome(sample(1, true), &limits);
        state.record_outcome(sample(1, false), &limits);
        assert_eq!(state.consecutive_failures(), 0);
    }

    #[test]
    fn stays_open_until_reset() {
        let limits = BreakerLimits::default();
        let mut state = BreakerState::default();

        for _ in 0..3 {
            state.record_outcome(sample(5, true), &limits);
        }
        assert!(state.should_halt());

        // Healthy outcomes do not close an open breaker.
        state.record_outcome(sample(5, false), &limits);
        assert!(state.should_halt());

        state.reset("operator reset");
        assert!(!state.should_halt());
        assert_eq!(state.consecutive_failures(), 0);
        assert_eq!(state.consecutive_no_progress(), 0);
        assert_eq!(state.recent().count(), 0);
    }

    #[test]
    fn error_with_no_change_advances_both_counters() {
        let limits = BreakerLimits {
            failure_ceiling: 10,
            no_progress_ceiling: 10,
        };
        let mut state = BreakerState::default();

        state.record_outcome(sample(0, true), &limits);
        assert_eq!(state.consecutive_failures(), 1);
        assert_eq!(state.consecutive_no_progress(), 1);
    }

    #[test]
    fn recent_history_is_bounded() {
        let limits = BreakerLimits {
            failure_ceiling: 100,
            no_progress_ceiling: 100,
        };
        let mut state = BreakerState::default();
        for n in 0..20 {
            state.record_outcome(sample(n, false), &limits);
        }
        assert_eq!(state.recent().count(), 10);
    }
}
