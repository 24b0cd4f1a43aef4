//! Outermost project loop: initialization, then sprints until done.

use anyhow::Result;
use tracing::{info, instrument, warn};

use crate::core::completion::{ExitReason, is_project_complete};
use crate::core::phase::Phase;
use crate::exit_codes;
use crate::invocation::{PhaseResult, PhaseRunner};
use crate::io::backlog::load_backlog;
use crate::io::clock::Clock;
use crate::io::fix_plan::load_checklist;
use crate::io::git::ChangeTracker;
use crate::io::store::{SprintOutcome, SprintRecord, SprintState};
use crate::io::worker::Worker;

/// Terminal outcome of a run; the closed set behind the exit-code contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every task resolved, no open P1 bug, fix plan (if any) fully checked.
    ProjectComplete,
    /// The circuit breaker opened; an operator reset is required.
    CircuitOpen,
    /// The sprint ceiling was reached without completion.
    SprintCeiling,
    /// The completion detector stopped the run on accumulated soft signals.
    GracefulStop(ExitReason),
    /// The operator interrupted the run.
    Interrupted,
}

impl RunOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::ProjectComplete => exit_codes::PROJECT_COMPLETE,
            RunOutcome::CircuitOpen => exit_codes::CIRCUIT_OPEN,
            RunOutcome::SprintCeiling => exit_codes::SPRINT_CEILING,
            RunOutcome::GracefulStop(_) => exit_codes::OK,
            RunOutcome::Interrupted => exit_codes::INTERRUPTED,
        }
    }
}

/// Drive the whole project: one initialization phase, then
/// {Planning, Implementation ⇄ QA, Review} per sprint until the completion
/// detector fires or the sprint ceiling is reached.
#[instrument(skip_all)]
pub fn run_project<W: Worker, T: ChangeTracker, C: Clock>(
    runner: &PhaseRunner<'_, W, T, C>,
) -> Result<RunOutcome> {
    let store = runner.store;

    // Soft signals are per-run evidence, not durable state.
    store.save_signals(&Default::default())?;

    let mut state = store.load_sprint_state()?;
    if state.project_done {
        info!("project already marked done");
        return Ok(RunOutcome::ProjectComplete);
    }

    if state.sprint == 0 {
        info!("running initialization");
        match runner.run_phase(0, Phase::Initialization)? {
            PhaseResult::Complete | PhaseResult::CeilingReached => {}
            PhaseResult::GracefulExit(reason) => return finish_graceful(runner, reason),
            PhaseResult::CircuitOpen => return Ok(RunOutcome::CircuitOpen),
            PhaseResult::Interrupted => return finish_interrupted(runner),
        }
        state = store.load_sprint_state()?;
        state.sprint = 1;
        state.rework_cycles = 0;
        state.sprint_started_at = None;
        store.save_sprint_state(&state)?;
    }

    while state.sprint <= runner.config.sprint_ceiling {
        let sprint = state.sprint;
        info!(sprint, "starting sprint");

        // A new sprint implicitly resets the stagnation breaker.
        let mut breaker = store.load_breaker()?;
        breaker.reset(&format!("sprint {sprint} start"));
        store.save_breaker(&breaker)?;

        if state.sprint_started_at.is_none() {
            state.sprint_started_at = Some(runner.clock.now_epoch_secs());
            state.rework_cycles = 0;
            store.save_sprint_state(&state)?;
        }

        match runner.run_phase(sprint, Phase::Planning)? {
            PhaseResult::Complete | PhaseResult::CeilingReached => {}
            PhaseResult::GracefulExit(reason) => return finish_graceful(runner, reason),
            PhaseResult::CircuitOpen => return finish_halted(runner, sprint),
            PhaseResult::Interrupted => return finish_interrupted(runner),
        }

        match crate::rework::run_rework(runner, sprint)? {
            crate::rework::ReworkResult::Settled { .. }
            | crate::rework::ReworkResult::CeilingReached { .. } => {}
            crate::rework::ReworkResult::Early(PhaseResult::GracefulExit(reason)) => {
                return finish_graceful(runner, reason);
            }
            crate::rework::ReworkResult::Early(PhaseResult::CircuitOpen) => {
                return finish_halted(runner, sprint);
            }
            crate::rework::ReworkResult::Early(_) => return finish_interrupted(runner),
        }

        match runner.run_phase(sprint, Phase::Review)? {
            PhaseResult::Complete | PhaseResult::CeilingReached => {}
            PhaseResult::GracefulExit(reason) => return finish_graceful(runner, reason),
            PhaseResult::CircuitOpen => return finish_halted(runner, sprint),
            PhaseResult::Interrupted => return finish_interrupted(runner),
        }

        if project_complete_now(runner)? {
            return finish_complete(runner);
        }

        close_sprint(runner, SprintOutcome::Advanced)?;
        state = store.load_sprint_state()?;
        state.sprint += 1;
        state.sprint_started_at = None;
        state.rework_cycles = 0;
        store.save_sprint_state(&state)?;
    }

    warn!(
        ceiling = runner.config.sprint_ceiling,
        "sprint ceiling reached without completion"
    );
    Ok(RunOutcome::SprintCeiling)
}

fn project_complete_now<W: Worker, T: ChangeTracker, C: Clock>(
    runner: &PhaseRunner<'_, W, T, C>,
) -> Result<bool> {
    let paths = runner.store.paths();
    let backlog = load_backlog(&paths.backlog_path)?.unwrap_or_default();
    let checklist = load_checklist(&paths.fix_plan_path)?;
    Ok(is_project_complete(&backlog.facts(), checklist.as_ref()))
}

fn finish_complete<W: Worker, T: ChangeTracker, C: Clock>(
    runner: &PhaseRunner<'_, W, T, C>,
) -> Result<RunOutcome> {
    info!("project complete");
    close_sprint(runner, SprintOutcome::ProjectComplete)?;
    let mut state = runner.store.load_sprint_state()?;
    state.project_done = true;
    runner.store.save_sprint_state(&state)?;
    Ok(RunOutcome::ProjectComplete)
}

/// Graceful exits on hard reasons are completion; soft reasons stop normally.
fn finish_graceful<W: Worker, T: ChangeTracker, C: Clock>(
    runner: &PhaseRunner<'_, W, T, C>,
    reason: ExitReason,
) -> Result<RunOutcome> {
    info!(reason = reason.as_str(), "graceful exit");
    if project_complete_now(runner)? {
        return finish_complete(runner);
    }
    close_sprint(runner, SprintOutcome::GracefulExit)?;
    Ok(RunOutcome::GracefulStop(reason))
}

fn finish_halted<W: Worker, T: ChangeTracker, C: Clock>(
    runner: &PhaseRunner<'_, W, T, C>,
    sprint: u32,
) -> Result<RunOutcome> {
    warn!(sprint, "halting on open circuit breaker");
    close_sprint(runner, SprintOutcome::CircuitOpen)?;
    Ok(RunOutcome::CircuitOpen)
}

fn finish_interrupted<W: Worker, T: ChangeTracker, C: Clock>(
    runner: &PhaseRunner<'_, W, T, C>,
) -> Result<RunOutcome> {
    warn!("interrupted, persisting final snapshot");
    close_sprint(runner, SprintOutcome::Interrupted)?;
    Ok(RunOutcome::Interrupted)
}

/// Append the current sprint to history with its outcome. Sprint 0
/// (initialization) and sprints that never started are not recorded.
fn close_sprint<W: Worker, T: ChangeTracker, C: Clock>(
    runner: &PhaseRunner<'_, W, T, C>,
    outcome: SprintOutcome,
) -> Result<()> {
    let mut state: SprintState = runner.store.load_sprint_state()?;
    let Some(started_at) = state.sprint_started_at else {
        return Ok(());
    };
    let record = SprintRecord {
        sprint: state.sprint,
        started_at,
        ended_at: runner.clock.now_epoch_secs(),
        outcome,
    };
    state.history.push(record);
    state.sprint_started_at = None;
    runner.store.save_sprint_state(&state)
}
