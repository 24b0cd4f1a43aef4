//! Canonical paths under `.foreman/` for a project root.

use std::path::{Path, PathBuf};

use crate::core::phase::Phase;

/// All controller-owned locations within a project directory.
#[derive(Debug, Clone)]
pub struct ForemanPaths {
    pub root: PathBuf,
    pub foreman_dir: PathBuf,
    pub state_dir: PathBuf,
    pub sprints_dir: PathBuf,
    pub invocations_dir: PathBuf,
    pub config_path: PathBuf,
    pub backlog_path: PathBuf,
    pub backlog_schema_path: PathBuf,
    pub sprint_state_path: PathBuf,
    pub breaker_path: PathBuf,
    pub limiter_path: PathBuf,
    pub signals_path: PathBuf,
    /// Optional worker-maintained checklist at the project root.
    pub fix_plan_path: PathBuf,
}

impl ForemanPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let foreman_dir = root.join(".foreman");
        let state_dir = foreman_dir.join("state");
        let sprints_dir = foreman_dir.join("sprints");
        let invocations_dir = foreman_dir.join("invocations");
        Self {
            root: root.clone(),
            foreman_dir,
            config_path: state_dir.join("config.toml"),
            backlog_path: state_dir.join("backlog.json"),
            backlog_schema_path: state_dir.join("backlog.schema.json"),
            sprint_state_path: state_dir.join("sprint_state.json"),
            breaker_path: state_dir.join("breaker.json"),
            limiter_path: state_dir.join("limiter.json"),
            signals_path: state_dir.join("signals.json"),
            fix_plan_path: root.join("FIX_PLAN.md"),
            state_dir,
            sprints_dir,
            invocations_dir,
        }
    }

    pub fn sprint_dir(&self, sprint: u32) -> PathBuf {
        self.sprints_dir.join(sprint.to_string())
    }

    /// Sprint plan document; its existence completes the Planning phase.
    pub fn plan_path(&self, sprint: u32) -> PathBuf {
        self.sprint_dir(sprint).join("plan.md")
    }

    /// Sprint review document; its existence completes the Review phase.
    pub fn review_path(&self, sprint: u32) -> PathBuf {
        self.sprint_dir(sprint).join("review.md")
    }

    /// Combined worker output for one invocation.
    pub fn invocation_log_path(&self, sprint: u32, phase: Phase, loop_number: u32) -> PathBuf {
        self.invocations_dir
            .join(sprint.to_string())
            .join(format!("{}-{loop_number}.log", phase.as_str()))
    }

    /// Structured record written beside each invocation log.
    pub fn invocation_meta_path(&self, sprint: u32, phase: Phase, loop_number: u32) -> PathBuf {
        self.invocations_dir
            .join(sprint.to_string())
            .join(format!("{}-{loop_number}.json", phase.as_str()))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}
