//! Test-only helpers: scripted collaborators and a scaffolded project dir.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};

use crate::core::types::{Task, TaskKind, TaskStatus, WorkerVerdict};
use crate::io::backlog::BacklogDoc;
use crate::io::clock::Clock;
use crate::io::git::{ChangeSnapshot, ChangeTracker};
use crate::io::init::{InitOptions, init_project};
use crate::io::store::{StateStore, write_json};
use crate::io::worker::{WorkRequest, Worker, WorkerInvocation};

/// Create a deterministic task with default fields.
pub fn task(id: u64, status: TaskStatus, sprint: Option<u32>) -> Task {
    Task {
        id,
        title: format!("task {id}"),
        kind: TaskKind::Feature,
        priority: 2,
        estimate: 1,
        status,
        sprint,
        acceptance: Vec::new(),
        depends_on: Vec::new(),
        failure_reason: None,
    }
}

/// Create a priority-1 bug (blocks project completion while unresolved).
pub fn p1_bug(id: u64, status: TaskStatus, sprint: Option<u32>) -> Task {
    let mut task = task(id, status, sprint);
    task.kind = TaskKind::Bug;
    task.priority = 1;
    task
}

/// One scripted worker invocation.
#[derive(Debug, Clone, Default)]
pub struct ScriptedStep {
    pub verdict: Option<WorkerVerdict>,
    pub output: String,
    /// Replace the backlog document after this invocation.
    pub tasks: Option<Vec<Task>>,
    /// Files to write relative to the project root (e.g. a sprint plan).
    pub files: Vec<(String, String)>,
}

impl ScriptedStep {
    pub fn success(output: &str) -> Self {
        Self {
            verdict: Some(WorkerVerdict::Success),
            output: output.to_string(),
            ..Self::default()
        }
    }

    pub fn with_tasks(mut self, tasks: Vec<Task>) -> Self {
        self.tasks = Some(tasks);
        self
    }

    pub fn with_file(mut self, rel_path: &str, contents: &str) -> Self {
        self.files.push((rel_path.to_string(), contents.to_string()));
        self
    }

    pub fn with_verdict(mut self, verdict: WorkerVerdict) -> Self {
        self.verdict = Some(verdict);
        self
    }
}

/// Worker that replays a fixed script instead of spawning processes.
///
/// An exhausted script keeps returning empty successes — the shape of a
/// worker that runs but does nothing.
pub struct ScriptedWorker {
    root: PathBuf,
    steps: RefCell<VecDeque<ScriptedStep>>,
    invocations: Cell<usize>,
}

impl ScriptedWorker {
    pub fn new(root: impl Into<PathBuf>, steps: Vec<ScriptedStep>) -> Self {
        Self {
            root: root.into(),
            steps: RefCell::new(steps.into()),
            invocations: Cell::new(0),
        }
    }

    pub fn invocations(&self) -> usize {
        self.invocations.get()
    }
}

impl Worker for ScriptedWorker {
    fn invoke(&self, request: &WorkRequest) -> Result<WorkerInvocation> {
        self.invocations.set(self.invocations.get() + 1);
        let step = self.steps.borrow_mut().pop_front().unwrap_or_default();

        if let Some(tasks) = &step.tasks {
            let doc = BacklogDoc {
                tasks: tasks.clone(),
                summary: None,
            };
            write_json(&self.root.join(".foreman/state/backlog.json"), &doc)?;
        }
        for (rel_path, contents) in &step.files {
            let path = self.root.join(rel_path);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("create {}", parent.display()))?;
            }
            fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
        }
        if let Some(parent) = request.log_path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        fs::write(&request.log_path, &step.output)
            .with_context(|| format!("write {}", request.log_path.display()))?;

        Ok(WorkerInvocation {
            verdict: step.verdict.unwrap_or(WorkerVerdict::Success),
            output: step.output,
        })
    }
}

/// Tracker that replays scripted change counts (0 when exhausted).
pub struct ScriptedTracker {
    counts: RefCell<VecDeque<u32>>,
}

impl ScriptedTracker {
    pub fn new(counts: Vec<u32>) -> Self {
        Self {
            counts: RefCell::new(counts.into()),
        }
    }

    /// Every invocation changes `n` files (the final value repeats forever).
    pub fn always(n: u32) -> Self {
        Self::new(vec![n])
    }
}

impl ChangeTracker for ScriptedTracker {
    fn snapshot(&self) -> Result<ChangeSnapshot> {
        Ok(ChangeSnapshot::empty())
    }

    fn changes_since(&self, _before: &ChangeSnapshot) -> Result<u32> {
        let mut counts = self.counts.borrow_mut();
        match counts.len() {
            0 => Ok(0),
            // Keep repeating the final scripted value.
            1 => Ok(*counts.front().expect("non-empty")),
            _ => Ok(counts.pop_front().expect("non-empty")),
        }
    }
}

/// Deterministic clock; `sleep` advances it so quota waits terminate.
pub struct FixedClock {
    now: Cell<u64>,
}

impl FixedClock {
    pub fn new(epoch_secs: u64) -> Self {
        Self {
            now: Cell::new(epoch_secs),
        }
    }

    pub fn advance(&self, secs: u64) {
        self.now.set(self.now.get() + secs);
    }
}

impl Clock for FixedClock {
    fn now_epoch_secs(&self) -> u64 {
        self.now.get()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration.as_secs().max(1));
    }
}

/// Scaffolded project directory backed by a temp dir.
pub struct TestProject {
    temp: tempfile::TempDir,
}

impl TestProject {
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir().context("tempdir")?;
        init_project(temp.path(), &InitOptions { force: false })?;
        Ok(Self { temp })
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn store(&self) -> StateStore {
        StateStore::new(self.root())
    }

    pub fn write_tasks(&self, tasks: Vec<Task>) -> Result<()> {
        let doc = BacklogDoc {
            tasks,
            summary: None,
        };
        write_json(&self.store().paths().backlog_path, &doc)
    }

    pub fn write_fix_plan(&self, contents: &str) -> Result<()> {
        fs::write(&self.store().paths().fix_plan_path, contents).context("write fix plan")
    }

    pub fn write_plan(&self, sprint: u32) -> Result<()> {
        let path = self.store().paths().plan_path(sprint);
        fs::create_dir_all(path.parent().expect("parent")).context("create sprint dir")?;
        fs::write(&path, "# Sprint plan\n").context("write plan")
    }

    pub fn write_review(&self, sprint: u32) -> Result<()> {
        let path = self.store().paths().review_path(sprint);
        fs::create_dir_all(path.parent().expect("parent")).context("create sprint dir")?;
        fs::write(&path, "# Sprint review\n").context("write review")
    }
}
