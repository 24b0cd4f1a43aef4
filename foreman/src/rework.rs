//! Bounded Implementation ⇄ QA rework cycle.

use anyhow::Result;
use tracing::{info, instrument, warn};

use crate::core::phase::Phase;
use crate::invocation::{PhaseResult, PhaseRunner};
use crate::io::backlog::load_backlog;
use crate::io::clock::Clock;
use crate::io::git::ChangeTracker;
use crate::io::worker::Worker;

/// How the rework cycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReworkResult {
    /// No task is left in `qa_failed`.
    Settled { cycles: u32 },
    /// The rework ceiling was reached with failures remaining; the sprint
    /// proceeds to Review and leaves them for the next planning pass.
    CeilingReached { cycles: u32 },
    /// A phase ended the run early (circuit, graceful exit, interrupt).
    Early(PhaseResult),
}

/// Run Implementation and QA, then repeat the pair while any sprint task
/// holds `qa_failed`, up to the configured ceiling.
///
/// A phase that merely hits its own loop ceiling does not end the cycle: the
/// controller prefers forward progress and moves to the next stage.
#[instrument(skip_all, fields(sprint = sprint))]
pub fn run_rework<W: Worker, T: ChangeTracker, C: Clock>(
    runner: &PhaseRunner<'_, W, T, C>,
    sprint: u32,
) -> Result<ReworkResult> {
    let ceiling = runner.config.rework_ceiling;
    let mut cycles = 0u32;

    loop {
        match runner.run_phase(sprint, Phase::Implementation)? {
            PhaseResult::Complete => {}
            PhaseResult::CeilingReached => {}
            early => return Ok(ReworkResult::Early(early)),
        }
        match runner.run_phase(sprint, Phase::Qa)? {
            PhaseResult::Complete => {}
            PhaseResult::CeilingReached => {}
            early => return Ok(ReworkResult::Early(early)),
        }

        let failed = load_backlog(&runner.store.paths().backlog_path)?
            .map(|backlog| backlog.qa_failed_count(sprint))
            .unwrap_or(0);
        if failed == 0 {
            info!(cycles, "no qa_failed tasks remain");
            return Ok(ReworkResult::Settled { cycles });
        }
        if cycles >= ceiling {
            warn!(
                failed,
                ceiling, "rework ceiling reached, proceeding to review with unresolved tasks"
            );
            return Ok(ReworkResult::CeilingReached { cycles });
        }

        cycles += 1;
        info!(cycles, failed, "tasks failed verification, starting rework cycle");
        let mut state = runner.store.load_sprint_state()?;
        state.rework_cycles = cycles;
        runner.store.save_sprint_state(&state)?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::TaskStatus;
    use crate::invocation::PhaseRunner;
    use crate::io::config::ForemanConfig;
    use crate::io::prompt::PromptEngine;
    use crate::test_support::{
        FixedClock, ScriptedStep, ScriptedTracker, ScriptedWorker, TestProject, task,
    };

    const T0: u64 = 1_700_000_400;

    fn run(
        project: &TestProject,
        config: &ForemanConfig,
        worker: &ScriptedWorker,
    ) -> ReworkResult {
        let store = project.store();
        let tracker = ScriptedTracker::always(1);
        let clock = FixedClock::new(T0);
        let engine = PromptEngine::new();
        let runner = PhaseRunner {
            store: &store,
            config,
            worker,
            tracker: &tracker,
            clock: &clock,
            engine: &engine,
        };
        run_rework(&runner, 1).expect("rework")
    }

    /// A clean pass through Implementation and QA settles in zero cycles.
    #[test]
    fn clean_pass_settles_without_rework() {
        let project = TestProject::new().expect("project");
        project
            .write_tasks(vec![task(1, TaskStatus::Ready, Some(1))])
            .expect("tasks");

        let worker = ScriptedWorker::new(
            project.root(),
            vec![
                ScriptedStep::success("implemented it")
                    .with_tasks(vec![task(1, TaskStatus::Implemented, Some(1))]),
                ScriptedStep::success("verified it")
                    .with_tasks(vec![task(1, TaskStatus::Done, Some(1))]),
            ],
        );
        let result = run(&project, &ForemanConfig::default(), &worker);
        assert_eq!(result, ReworkResult::Settled { cycles: 0 });
        assert_eq!(worker.invocations(), 2);
    }

    /// A qa_failed round-trip (in_progress → implemented → qa_passed) counts
    /// exactly one rework cycle.
    #[test]
    fn failed_verification_counts_one_cycle() {
        let project = TestProject::new().expect("project");
        project
            .write_tasks(vec![task(1, TaskStatus::Ready, Some(1))])
            .expect("tasks");

        let worker = ScriptedWorker::new(
            project.root(),
            vec![
                // Implementation, then QA fails the task.
                ScriptedStep::success("implemented it")
                    .with_tasks(vec![task(1, TaskStatus::Implemented, Some(1))]),
                ScriptedStep::success("rejected it").with_tasks(vec![{
                    let mut failed = task(1, TaskStatus::QaFailed, Some(1));
                    failed.failure_reason = Some("acceptance 2 unmet".to_string());
                    failed
                }]),
                // Rework cycle: fix and pass.
                ScriptedStep::success("fixed it")
                    .with_tasks(vec![task(1, TaskStatus::Implemented, Some(1))]),
                ScriptedStep::success("verified it")
                    .with_tasks(vec![task(1, TaskStatus::Done, Some(1))]),
            ],
        );
        let result = run(&project, &ForemanConfig::default(), &worker);
        assert_eq!(result, ReworkResult::Settled { cycles: 1 });
        assert_eq!(worker.invocations(), 4);

        let state = project.store().load_sprint_state().expect("state");
        assert_eq!(state.rework_cycles, 1);
    }

    /// Persistent qa_failed exits at the rework ceiling and leaves the task
    /// for the next sprint rather than retrying forever.
    #[test]
    fn persistent_failure_stops_at_the_ceiling() {
        let project = TestProject::new().expect("project");
        project
            .write_tasks(vec![task(1, TaskStatus::QaFailed, Some(1))])
            .expect("tasks");

        // The worker never fixes anything; the exhausted script keeps
        // returning empty successes, so both phase predicates hold trivially
        // (nothing ready/in_progress, nothing implemented) while qa_failed
        // persists.
        let worker = ScriptedWorker::new(project.root(), Vec::new());
        let result = run(&project, &ForemanConfig::default(), &worker);
        assert_eq!(result, ReworkResult::CeilingReached { cycles: 3 });
        // Initial pass plus three rework cycles, two phases each.
        assert_eq!(worker.invocations(), 8);

        let backlog = crate::io::backlog::load_backlog(&project.store().paths().backlog_path)
            .expect("load")
            .expect("present");
        assert_eq!(backlog.qa_failed_count(1), 1);
    }

    /// An open breaker inside a phase surfaces as an early exit.
    #[test]
    fn early_circuit_exit_propagates() {
        let project = TestProject::new().expect("project");
        project
            .write_tasks(vec![task(1, TaskStatus::Ready, Some(1))])
            .expect("tasks");

        let store = project.store();
        let mut breaker = store.load_breaker().expect("breaker");
        breaker.record_outcome(
            crate::core::breaker::OutcomeSample {
                loop_number: 1,
                files_changed: 0,
                had_error: true,
                output_bytes: 0,
            },
            &crate::core::breaker::BreakerLimits {
                failure_ceiling: 1,
                no_progress_ceiling: 1,
            },
        );
        store.save_breaker(&breaker).expect("save");

        let worker = ScriptedWorker::new(project.root(), Vec::new());
        let result = run(&project, &ForemanConfig::default(), &worker);
        assert_eq!(
            result,
            ReworkResult::Early(crate::invocation::PhaseResult::CircuitOpen)
        );
        assert_eq!(worker.invocations(), 0);
    }
}
