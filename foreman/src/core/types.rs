//! Shared deterministic types for the controller core.
//!
//! These types define stable contracts between core components. They must not
//! depend on external state or I/O and must remain deterministic across runs.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a backlog task.
///
/// Transitions follow a fixed graph (see [`crate::core::transition`]); the
/// worker owns the backlog, the controller only observes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Backlog,
    Ready,
    InProgress,
    Implemented,
    QaInProgress,
    QaPassed,
    QaFailed,
    Done,
    Cancelled,
}

impl TaskStatus {
    /// Terminal statuses never leave their state (except via cancellation,
    /// which is itself terminal).
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Cancelled)
    }

    /// A task that still requires controller attention this sprint.
    pub fn is_resolved(self) -> bool {
        self.is_terminal()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Backlog => "backlog",
            TaskStatus::Ready => "ready",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Implemented => "implemented",
            TaskStatus::QaInProgress => "qa_in_progress",
            TaskStatus::QaPassed => "qa_passed",
            TaskStatus::QaFailed => "qa_failed",
            TaskStatus::Done => "done",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

/// Category of work a task represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Feature,
    Bug,
    Spike,
    Infra,
    Chore,
}

/// One unit of work in the backlog document.
///
/// The task list is worker-owned; the controller reads it as ground truth for
/// completion and phase decisions but never writes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Stable, monotonically assigned identifier.
    pub id: u64,
    pub title: String,
    pub kind: TaskKind,
    /// Lower is more urgent; 1 is the highest priority.
    pub priority: u8,
    /// Size estimate in effort units.
    pub estimate: u32,
    pub status: TaskStatus,
    /// Owning sprint, if the task has been planned into one.
    #[serde(default)]
    pub sprint: Option<u32>,
    /// Ordered acceptance conditions.
    #[serde(default)]
    pub acceptance: Vec<String>,
    /// Ids of tasks this one depends on.
    #[serde(default)]
    pub depends_on: Vec<u64>,
    /// Free-text reason, set only while the task is `qa_failed`.
    #[serde(default)]
    pub failure_reason: Option<String>,
}

impl Task {
    /// An unresolved priority-1 bug blocks project completion.
    pub fn is_open_p1_bug(&self) -> bool {
        self.kind == TaskKind::Bug && self.priority == 1 && !self.status.is_resolved()
    }
}

/// Tests field of the worker status block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestsStatus {
    Passing,
    Failing,
    NotRun,
}

/// Classification of one worker invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerVerdict {
    /// The worker process exited cleanly.
    Success,
    /// The invocation exceeded its wall-clock budget and was killed.
    Timeout,
    /// The failure output looks like an upstream rate limit.
    RateLimited,
    /// Any other failure.
    Error,
}

impl WorkerVerdict {
    /// Whether this outcome counts as an error for stagnation tracking.
    ///
    /// Rate limits are back-pressure, not stagnation; they are excluded.
    pub fn is_error(self) -> bool {
        matches!(self, WorkerVerdict::Timeout | WorkerVerdict::Error)
    }
}
