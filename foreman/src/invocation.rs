//! Phase executor: the per-(sprint, phase) invocation loop.
//!
//! Each iteration checks the circuit breaker, the rate limiter, and the
//! completion detector before invoking the worker, then feeds the classified
//! outcome back into all three and asks the phase predicate whether the phase
//! is done. The loop never talks past its collaborators: everything above it
//! (rework, sprint) only sees a [`PhaseResult`].

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::core::breaker::OutcomeSample;
use crate::core::completion::{
    ExitReason, SignalEntry, scan_output, should_exit_gracefully,
};
use crate::core::phase::{Phase, SprintArtifacts, phase_complete};
use crate::core::quota::{hour_key, secs_until_rollover};
use crate::core::status_block::{StatusBlock, parse_status_block};
use crate::core::transition::validate_transitions;
use crate::core::types::{Task, WorkerVerdict};
use crate::interrupt;
use crate::io::backlog::{Backlog, load_backlog};
use crate::io::clock::Clock;
use crate::io::config::ForemanConfig;
use crate::io::fix_plan::{load_checklist, load_unchecked_items};
use crate::io::git::ChangeTracker;
use crate::io::invocation_log::{InvocationRecord, StatusSummary, write_invocation_record};
use crate::io::prompt::{PromptEngine, PromptInputs};
use crate::io::store::StateStore;
use crate::io::worker::{WorkRequest, Worker, WorkerInvocation};

/// Longest single sleep while waiting out the quota window, so the countdown
/// stays visible and interrupts are noticed.
const QUOTA_WAIT_STEP_SECS: u64 = 30;

/// Most backlog lines included in a prompt.
const PROMPT_BACKLOG_LINES: usize = 100;

/// How one phase execution ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseResult {
    /// The phase-specific predicate reported done.
    Complete,
    /// The per-phase loop ceiling was reached without completion. Not fatal:
    /// the caller proceeds to the next stage with a warning.
    CeilingReached,
    /// The circuit breaker is open; the run must halt.
    CircuitOpen,
    /// The completion detector asked for a graceful stop.
    GracefulExit(ExitReason),
    /// The operator interrupted the run.
    Interrupted,
}

/// Bundle of collaborators for running phases.
pub struct PhaseRunner<'a, W, T, C> {
    pub store: &'a StateStore,
    pub config: &'a ForemanConfig,
    pub worker: &'a W,
    pub tracker: &'a T,
    pub clock: &'a C,
    pub engine: &'a PromptEngine,
}

impl<W: Worker, T: ChangeTracker, C: Clock> PhaseRunner<'_, W, T, C> {
    /// Run the invocation loop for one phase of one sprint.
    #[instrument(skip_all, fields(sprint = sprint, phase = phase.as_str()))]
    pub fn run_phase(&self, sprint: u32, phase: Phase) -> Result<PhaseResult> {
        let paths = self.store.paths();
        let ceiling = self.config.phase_loops.ceiling(phase);
        let limits = self.config.breaker.limits();

        let mut state = self.store.load_sprint_state()?;
        if state.sprint != sprint || state.phase != phase {
            state.sprint = sprint;
            state.phase = phase;
            state.phase_loop = 0;
            self.store.save_sprint_state(&state)?;
        }

        let mut last_blockers: Option<String> = None;

        loop {
            if interrupt::interrupted() {
                return Ok(PhaseResult::Interrupted);
            }

            let mut breaker = self.store.load_breaker()?;
            if breaker.should_halt() {
                warn!(
                    reason = breaker.open_reason().unwrap_or("unknown"),
                    "circuit breaker is open, halting"
                );
                return Ok(PhaseResult::CircuitOpen);
            }

            if state.phase_loop >= ceiling {
                warn!(ceiling, "phase loop ceiling reached without completion");
                return Ok(PhaseResult::CeilingReached);
            }

            let backlog = load_backlog(&paths.backlog_path)?.unwrap_or_default();
            let checklist = load_checklist(&paths.fix_plan_path)?;
            let signals = self.store.load_signals()?;
            if let Some(reason) =
                should_exit_gracefully(&backlog.facts(), checklist.as_ref(), &signals)
            {
                info!(reason = reason.as_str(), "completion detector requested exit");
                return Ok(PhaseResult::GracefulExit(reason));
            }

            let mut limiter = self.store.load_limiter();
            if !limiter.can_invoke(
                self.clock.now_epoch_secs(),
                self.config.hourly_invocation_ceiling,
            ) {
                self.wait_for_reset()?;
                continue;
            }

            let loop_number = state.phase_loop + 1;
            let prompt = self.engine.render(
                phase,
                &self.prompt_inputs(sprint, phase, loop_number, &backlog, &last_blockers)?,
            )?;

            let before = self.tracker.snapshot()?;
            limiter.record_invocation(self.clock.now_epoch_secs());
            self.store.save_limiter(&limiter)?;

            let role = phase.role();
            let started = Instant::now();
            let invocation = self.worker.invoke(&WorkRequest {
                role,
                phase,
                sprint,
                prompt,
                workdir: paths.root().to_path_buf(),
                log_path: paths.invocation_log_path(sprint, phase, loop_number),
                timeout: self.config.timeouts.for_role(role),
                output_limit_bytes: self.config.worker_output_limit_bytes,
            })?;
            let duration_ms = started.elapsed().as_millis() as u64;

            if invocation.verdict == WorkerVerdict::RateLimited {
                // Upstream back-pressure carries no stagnation information:
                // wait out the quota window and retry the same loop.
                warn!("worker reported an upstream rate limit, backing off");
                self.wait_for_reset()?;
                continue;
            }

            let files_changed = self
                .tracker
                .changes_since(&before)
                .context("measure worker changes")?;

            let after = load_backlog(&paths.backlog_path)?.unwrap_or_default();
            self.check_transitions(backlog.tasks(), after.tasks());

            let status = match invocation.verdict {
                WorkerVerdict::Success => parse_status_block(&invocation.output),
                _ => None,
            };

            let opened = breaker.record_outcome(
                OutcomeSample {
                    loop_number,
                    files_changed,
                    had_error: invocation.verdict.is_error(),
                    output_bytes: invocation.output.len(),
                },
                &limits,
            );
            self.store.save_breaker(&breaker)?;
            if opened {
                warn!(
                    reason = breaker.open_reason().unwrap_or("unknown"),
                    "circuit breaker opened"
                );
            }

            self.record_signals(sprint, phase, loop_number, &invocation, &status, files_changed)?;

            write_invocation_record(
                paths,
                &InvocationRecord {
                    sprint,
                    phase,
                    loop_number,
                    verdict: invocation.verdict,
                    files_changed,
                    output_bytes: invocation.output.len(),
                    duration_ms,
                    status: status.as_ref().map(StatusSummary::from_block),
                },
            )?;

            state.phase_loop = loop_number;
            self.store.save_sprint_state(&state)?;
            last_blockers = status.as_ref().and_then(|block| block.blockers.clone());

            // Ground truth decides phase completion; a missing status block
            // must not stall a phase whose tasks have all moved on.
            let artifacts = SprintArtifacts {
                plan_exists: paths.plan_path(sprint).exists(),
                review_exists: paths.review_path(sprint).exists(),
            };
            if phase_complete(
                phase,
                after.tasks().len(),
                &after.sprint_tasks(sprint),
                artifacts,
            ) {
                info!(loops = loop_number, "phase complete");
                return Ok(PhaseResult::Complete);
            }

            if invocation.verdict == WorkerVerdict::Error {
                debug!(
                    delay_secs = self.config.retry_delay_secs,
                    "unclassified worker error, sleeping before retry"
                );
                self.clock
                    .sleep(Duration::from_secs(self.config.retry_delay_secs));
            }
        }
    }

    /// Block until the hourly bucket rolls over, logging a countdown, then
    /// zero the counter. Interrupts cut the wait short; the caller notices
    /// the flag on its next iteration.
    fn wait_for_reset(&self) -> Result<()> {
        let mut remaining = secs_until_rollover(self.clock.now_epoch_secs());
        info!(
            remaining_secs = remaining,
            "hourly invocation quota exhausted, waiting for the next window"
        );
        let started_key = hour_key(self.clock.now_epoch_secs());
        loop {
            if interrupt::interrupted() {
                return Ok(());
            }
            if hour_key(self.clock.now_epoch_secs()) != started_key {
                break;
            }
            self.clock
                .sleep(Duration::from_secs(remaining.min(QUOTA_WAIT_STEP_SECS)));
            remaining = secs_until_rollover(self.clock.now_epoch_secs());
            info!(remaining_secs = remaining, "waiting for quota reset");
        }
        let mut limiter = self.store.load_limiter();
        limiter.roll(self.clock.now_epoch_secs());
        self.store.save_limiter(&limiter)?;
        info!("quota window rolled over");
        Ok(())
    }

    fn prompt_inputs(
        &self,
        sprint: u32,
        phase: Phase,
        loop_number: u32,
        backlog: &Backlog,
        last_blockers: &Option<String>,
    ) -> Result<PromptInputs> {
        let tasks: Vec<&Task> = match phase {
            // Planning and bootstrap see the whole backlog; execution phases
            // only their sprint.
            Phase::Initialization | Phase::Planning => backlog.tasks().iter().collect(),
            _ => backlog.sprint_tasks(sprint),
        };
        let backlog_summary = tasks
            .iter()
            .take(PROMPT_BACKLOG_LINES)
            .map(|task| {
                format!(
                    "T-{} [{}] p{} {}",
                    task.id,
                    task.status.as_str(),
                    task.priority,
                    task.title
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        let unchecked = load_unchecked_items(&self.store.paths().fix_plan_path)?;
        let fix_plan_summary = if unchecked.is_empty() {
            None
        } else {
            Some(unchecked.join("\n"))
        };

        Ok(PromptInputs {
            sprint,
            loop_number,
            backlog_summary,
            fix_plan_summary,
            last_blockers: last_blockers.clone(),
        })
    }

    /// The worker owns the backlog, so violations are warnings, not failures.
    fn check_transitions(&self, prev: &[Task], next: &[Task]) {
        for violation in validate_transitions(prev, next) {
            warn!(%violation, "worker broke the task status graph");
        }
    }

    fn record_signals(
        &self,
        sprint: u32,
        phase: Phase,
        loop_number: u32,
        invocation: &WorkerInvocation,
        status: &Option<StatusBlock>,
        files_changed: u32,
    ) -> Result<()> {
        if invocation.verdict != WorkerVerdict::Success {
            return Ok(());
        }
        let mut signals = self.store.load_signals()?;
        let entry = SignalEntry {
            sprint,
            phase,
            loop_number,
        };
        if status.is_none() && files_changed == 0 {
            debug!("success without status block or changes, recording idle loop");
            signals.record_idle_loop(entry.clone());
        }
        if status.as_ref().is_some_and(|block| block.project_complete) {
            signals.record_done_signal(entry.clone());
        }
        let scanned = scan_output(&invocation.output);
        if scanned.completion_indicator {
            signals.record_completion_indicator(entry.clone());
        }
        if scanned.test_only {
            signals.record_test_only_loop(entry);
        }
        self.store.save_signals(&signals)
    }
}
