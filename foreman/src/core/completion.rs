//! Multi-signal completion detection.
//!
//! Hard signals come from ground truth (the persisted backlog and the fix
//! plan); soft signals come from untrusted free-text worker output and are
//! trusted only cumulatively, and only when no work is known to remain. A
//! single "Sprint 1 complete" sentence must never read as "project complete".

use serde::{Deserialize, Serialize};

use crate::core::phase::Phase;
use crate::core::ring::Ring;
use crate::core::status_block::strip_control_sequences;

/// Capacity of each bounded signal list.
pub const SIGNAL_CAPACITY: usize = 10;

pub const DONE_SIGNAL_THRESHOLD: usize = 3;
pub const IDLE_LOOP_THRESHOLD: usize = 5;
pub const TEST_ONLY_THRESHOLD: usize = 5;
pub const COMPLETION_INDICATOR_THRESHOLD: usize = 3;

/// Phrases treated as a completion claim in worker output.
///
/// Deliberately narrow and explicitly enumerated: widening this table widens
/// the false-positive surface for graceful exit. Extend here, not with
/// broader pattern matching.
const COMPLETION_INDICATORS: &[&str] = &[
    "all tasks are complete",
    "all tasks complete",
    "the project is complete",
    "project is complete",
    "no remaining work",
    "nothing left to implement",
    "backlog is empty",
];

/// Phrases indicating a test run. Same extension point rules as above.
const TEST_RUN_MARKERS: &[&str] = &[
    "running tests",
    "cargo test",
    "test suite",
    "all tests pass",
    "tests passed",
    "tests are passing",
];

/// Verbs indicating actual implementation work happened.
const IMPLEMENTATION_VERBS: &[&str] = &[
    "implemented",
    "created",
    "added",
    "wrote",
    "fixed",
    "refactored",
    "updated",
];

/// Where a recorded signal came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalEntry {
    pub sprint: u32,
    pub phase: Phase,
    pub loop_number: u32,
}

/// Persisted soft-signal history (`.foreman/state/signals.json`).
///
/// Reset at the start of every run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitSignals {
    idle_loops: Ring<SignalEntry>,
    done_signals: Ring<SignalEntry>,
    completion_indicators: Ring<SignalEntry>,
    test_only_loops: Ring<SignalEntry>,
}

impl Default for ExitSignals {
    fn default() -> Self {
        Self {
            idle_loops: Ring::new(SIGNAL_CAPACITY),
            done_signals: Ring::new(SIGNAL_CAPACITY),
            completion_indicators: Ring::new(SIGNAL_CAPACITY),
            test_only_loops: Ring::new(SIGNAL_CAPACITY),
        }
    }
}

impl ExitSignals {
    pub fn record_idle_loop(&mut self, entry: SignalEntry) {
        self.idle_loops.push(entry);
    }

    pub fn record_done_signal(&mut self, entry: SignalEntry) {
        self.done_signals.push(entry);
    }

    pub fn record_completion_indicator(&mut self, entry: SignalEntry) {
        self.completion_indicators.push(entry);
    }

    pub fn record_test_only_loop(&mut self, entry: SignalEntry) {
        self.test_only_loops.push(entry);
    }

    pub fn idle_loops(&self) -> usize {
        self.idle_loops.len()
    }

    pub fn done_signals(&self) -> usize {
        self.done_signals.len()
    }

    pub fn completion_indicators(&self) -> usize {
        self.completion_indicators.len()
    }

    pub fn test_only_loops(&self) -> usize {
        self.test_only_loops.len()
    }
}

/// Why the run should stop gracefully.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    BacklogComplete,
    FixPlanComplete,
    DoneSignals,
    IdleLoops,
    TestSaturation,
    CompletionIndicators,
}

impl ExitReason {
    pub fn as_str(self) -> &'static str {
        match self {
            ExitReason::BacklogComplete => "backlog_complete",
            ExitReason::FixPlanComplete => "fix_plan_complete",
            ExitReason::DoneSignals => "done_signals",
            ExitReason::IdleLoops => "idle_loops",
            ExitReason::TestSaturation => "test_saturation",
            ExitReason::CompletionIndicators => "completion_indicators",
        }
    }

    /// Hard reasons are derived from ground truth; soft reasons are
    /// accumulated from untrusted output.
    pub fn is_hard(self) -> bool {
        matches!(
            self,
            ExitReason::BacklogComplete | ExitReason::FixPlanComplete
        )
    }
}

/// Ground-truth facts derived from the backlog document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BacklogFacts {
    pub total: usize,
    /// Tasks not yet done or cancelled.
    pub unresolved: usize,
    pub open_p1_bugs: usize,
}

impl BacklogFacts {
    pub fn fully_resolved(&self) -> bool {
        self.total > 0 && self.unresolved == 0
    }
}

/// Facts derived from the optional fix-plan checklist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChecklistFacts {
    pub checked: usize,
    pub unchecked: usize,
}

/// Decide whether the run should stop gracefully. First match wins.
pub fn should_exit_gracefully(
    backlog: &BacklogFacts,
    checklist: Option<&ChecklistFacts>,
    signals: &ExitSignals,
) -> Option<ExitReason> {
    let unchecked = checklist.map_or(0, |c| c.unchecked);

    if backlog.fully_resolved() && backlog.open_p1_bugs == 0 && unchecked == 0 {
        return Some(ExitReason::BacklogComplete);
    }
    if let Some(checklist) = checklist
        && checklist.unchecked == 0
        && checklist.checked > 0
    {
        return Some(ExitReason::FixPlanComplete);
    }
    // Unchecked fix-plan items are known remaining work: suppress every soft
    // signal no matter how many have accumulated.
    if unchecked > 0 {
        return None;
    }
    if signals.done_signals() >= DONE_SIGNAL_THRESHOLD {
        return Some(ExitReason::DoneSignals);
    }
    if signals.idle_loops() >= IDLE_LOOP_THRESHOLD {
        return Some(ExitReason::IdleLoops);
    }
    if signals.test_only_loops() >= TEST_ONLY_THRESHOLD {
        return Some(ExitReason::TestSaturation);
    }
    if signals.completion_indicators() >= COMPLETION_INDICATOR_THRESHOLD {
        return Some(ExitReason::CompletionIndicators);
    }
    None
}

/// Authoritative final check behind the process exit code.
///
/// Never consults soft signals.
pub fn is_project_complete(backlog: &BacklogFacts, checklist: Option<&ChecklistFacts>) -> bool {
    backlog.fully_resolved()
        && backlog.open_p1_bugs == 0
        && checklist.is_none_or(|c| c.unchecked == 0)
}

/// Soft signals found by scanning one invocation's output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutputSignals {
    pub completion_indicator: bool,
    pub test_only: bool,
}

/// Scan cleaned worker output against the keyword tables.
pub fn scan_output(output: &str) -> OutputSignals {
    let text = strip_control_sequences(output).to_ascii_lowercase();
    let completion_indicator = COMPLETION_INDICATORS
        .iter()
        .any(|phrase| text.contains(phrase));
    let mentions_tests = TEST_RUN_MARKERS.iter().any(|phrase| text.contains(phrase));
    let mentions_implementation = IMPLEMENTATION_VERBS.iter().any(|verb| text.contains(verb));
    OutputSignals {
        completion_indicator,
        test_only: mentions_tests && !mentions_implementation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(loop_number: u32) -> SignalEntry {
        SignalEntry {
            sprint: 1,
            phase: Phase::Implementation,
            loop_number,
        }
    }

    fn signals_with(done: usize, idle: usize, test_only: usize, indicators: usize) -> ExitSignals {
        let mut signals = ExitSignals::default();
        for n in 0..done {
            signals.record_done_signal(entry(n as u32));
        }
        for n in 0..idle {
            signals.record_idle_loop(entry(n as u32));
        }
        for n in 0..test_only {
            signals.record_test_only_loop(entry(n as u32));
        }
        for n in 0..indicators {
            signals.record_completion_indicator(entry(n as u32));
        }
        signals
    }

    #[test]
    fn resolved_backlog_wins_regardless_of_soft_state() {
        let backlog = BacklogFacts {
            total: 3,
            unresolved: 0,
            open_p1_bugs: 0,
        };
        assert_eq!(
            should_exit_gracefully(&backlog, None, &ExitSignals::default()),
            Some(ExitReason::BacklogComplete)
        );
        // Saturated soft signals do not change the hard reason.
        assert_eq!(
            should_exit_gracefully(&backlog, None, &signals_with(8, 8, 8, 8)),
            Some(ExitReason::BacklogComplete)
        );
    }

    #[test]
    fn open_p1_bug_blocks_backlog_complete() {
        let backlog = BacklogFacts {
            total: 3,
            unresolved: 1,
            open_p1_bugs: 1,
        };
        assert_eq!(
            should_exit_gracefully(&backlog, None, &ExitSignals::default()),
            None
        );
    }

    #[test]
    fn unchecked_fix_plan_defers_backlog_complete() {
        let backlog = BacklogFacts {
            total: 3,
            unresolved: 0,
            open_p1_bugs: 0,
        };
        let checklist = ChecklistFacts {
            checked: 2,
            unchecked: 1,
        };
        assert_eq!(
            should_exit_gracefully(&backlog, Some(&checklist), &ExitSignals::default()),
            None
        );
    }

    #[test]
    fn fully_checked_fix_plan_completes() {
        let backlog = BacklogFacts {
            total: 3,
            unresolved: 2,
            open_p1_bugs: 0,
        };
        let checklist = ChecklistFacts {
            checked: 4,
            unchecked: 0,
        };
        assert_eq!(
            should_exit_gracefully(&backlog, Some(&checklist), &ExitSignals::default()),
            Some(ExitReason::FixPlanComplete)
        );
    }

    #[test]
    fn unchecked_items_suppress_all_soft_signals() {
        let backlog = BacklogFacts {
            total: 3,
            unresolved: 2,
            open_p1_bugs: 0,
        };
        let checklist = ChecklistFacts {
            checked: 2,
            unchecked: 1,
        };
        let signals = signals_with(5, 8, 8, 5);
        assert_eq!(
            should_exit_gracefully(&backlog, Some(&checklist), &signals),
            None
        );
    }

    #[test]
    fn soft_thresholds_fire_in_order() {
        let backlog = BacklogFacts {
            total: 3,
            unresolved: 2,
            open_p1_bugs: 0,
        };

        assert_eq!(
            should_exit_gracefully(&backlog, None, &signals_with(3, 0, 0, 0)),
            Some(ExitReason::DoneSignals)
        );
        assert_eq!(
            should_exit_gracefully(&backlog, None, &signals_with(0, 5, 0, 0)),
            Some(ExitReason::IdleLoops)
        );
        assert_eq!(
            should_exit_gracefully(&backlog, None, &signals_with(0, 0, 5, 0)),
            Some(ExitReason::TestSaturation)
        );
        assert_eq!(
            should_exit_gracefully(&backlog, None, &signals_with(0, 0, 0, 3)),
            Some(ExitReason::CompletionIndicators)
        );
        assert_eq!(
            should_exit_gracefully(&backlog, None, &signals_with(2, 4, 4, 2)),
            None
        );
        // Done-signals outrank idle loops when both are over threshold.
        assert_eq!(
            should_exit_gracefully(&backlog, None, &signals_with(3, 5, 0, 0)),
            Some(ExitReason::DoneSignals)
        );
    }

    #[test]
    fn project_complete_ignores_soft_signals_entirely() {
        let resolved = BacklogFacts {
            total: 3,
            unresolved: 0,
            open_p1_bugs: 0,
        };
        assert!(is_project_complete(&resolved, None));

        let empty = BacklogFacts::default();
        assert!(!is_project_complete(&empty, None));

        let with_bug = BacklogFacts {
            total: 3,
            unresolved: 1,
            open_p1_bugs: 1,
        };
        assert!(!is_project_complete(&with_bug, None));

        let unchecked = ChecklistFacts {
            checked: 1,
            unchecked: 2,
        };
        assert!(!is_project_complete(&resolved, Some(&unchecked)));
        let checked = ChecklistFacts {
            checked: 3,
            unchecked: 0,
        };
        assert!(is_project_complete(&resolved, Some(&checked)));
    }

    #[test]
    fn scan_finds_completion_indicators_narrowly() {
        assert!(scan_output("Summary: all tasks are complete.").completion_indicator);
        // "Sprint 1 complete" is not in the table and must not match.
        assert!(!scan_output("Sprint 1 complete, moving on").completion_indicator);
    }

    #[test]
    fn scan_flags_test_only_output() {
        let output = "running tests... 42 passed";
        assert!(scan_output(output).test_only);

        let output = "implemented the parser, then running tests... 42 passed";
        assert!(!scan_output(output).test_only);

        let output = "thinking about architecture";
        assert!(!scan_output(output).test_only);
    }
}
