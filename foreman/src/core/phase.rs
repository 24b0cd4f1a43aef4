//! Phases, roles, and phase-completion predicates.

use serde::{Deserialize, Serialize};

use crate::core::types::{Task, TaskStatus};

/// One stage of a sprint. Sprint 0 runs only `Initialization`; every later
/// sprint runs Planning → (Implementation ⇄ Qa, bounded) → Review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Initialization,
    Planning,
    Implementation,
    Qa,
    Review,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Initialization => "initialization",
            Phase::Planning => "planning",
            Phase::Implementation => "implementation",
            Phase::Qa => "qa",
            Phase::Review => "review",
        }
    }

    /// The worker role that executes this phase.
    pub fn role(self) -> Role {
        match self {
            Phase::Initialization => Role::Bootstrap,
            Phase::Planning => Role::Planner,
            Phase::Implementation => Role::Implementer,
            Phase::Qa => Role::Qa,
            Phase::Review => Role::Reviewer,
        }
    }
}

/// Worker persona passed through the invocation contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Bootstrap,
    Planner,
    Implementer,
    Qa,
    Reviewer,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Bootstrap => "bootstrap",
            Role::Planner => "planner",
            Role::Implementer => "implementer",
            Role::Qa => "qa",
            Role::Reviewer => "reviewer",
        }
    }
}

/// Existence of the per-sprint documents the predicates consult.
#[derive(Debug, Clone, Copy, Default)]
pub struct SprintArtifacts {
    pub plan_exists: bool,
    pub review_exists: bool,
}

/// Ground-truth phase completion.
///
/// These predicates read the persisted backlog, never the worker's
/// self-reported status: a missing status block must not stall a phase whose
/// tasks have in fact all moved forward.
pub fn phase_complete(
    phase: Phase,
    backlog_total: usize,
    sprint_tasks: &[&Task],
    artifacts: SprintArtifacts,
) -> bool {
    match phase {
        Phase::Initialization => backlog_total > 0,
        Phase::Planning => artifacts.plan_exists,
        Phase::Implementation => !sprint_tasks.iter().any(|task| {
            matches!(task.status, TaskStatus::Ready | TaskStatus::InProgress)
        }),
        // "Dispositioned" means past QA: neither awaiting QA nor mid-QA.
        Phase::Qa => !sprint_tasks.iter().any(|task| {
            matches!(
                task.status,
                TaskStatus::Implemented | TaskStatus::QaInProgress
            )
        }),
        Phase::Review => artifacts.review_exists,
    }
}
