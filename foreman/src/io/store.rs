//! Whole-document state store for every persisted controller document.
//!
//! All writes are atomic whole-document replacements (temp file + rename);
//! no reader ever observes a half-written document. The store is constructed
//! once and passed by reference into every component — there is no ambient
//! global state.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::breaker::BreakerState;
use crate::core::completion::ExitSignals;
use crate::core::phase::Phase;
use crate::core::quota::LimiterState;
use crate::io::paths::ForemanPaths;

/// Outcome recorded for a finished sprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SprintOutcome {
    /// The sprint ran its phases and the project continued.
    Advanced,
    ProjectComplete,
    CircuitOpen,
    GracefulExit,
    Interrupted,
}

/// History entry for one past sprint. Timestamps are unix epoch seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SprintRecord {
    pub sprint: u32,
    pub started_at: u64,
    pub ended_at: u64,
    pub outcome: SprintOutcome,
}

/// Persisted sprint bookkeeping (`.foreman/state/sprint_state.json`).
///
/// Survives process restarts so an interrupted run resumes where it left off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SprintState {
    /// Current sprint number; 0 is initialization.
    pub sprint: u32,
    pub phase: Phase,
    /// Completed invocation loops within the current phase.
    pub phase_loop: u32,
    /// Rework cycles consumed in the current sprint.
    pub rework_cycles: u32,
    pub project_done: bool,
    /// When the current sprint started (epoch seconds), once known.
    #[serde(default)]
    pub sprint_started_at: Option<u64>,
    #[serde(default)]
    pub history: Vec<SprintRecord>,
}

impl Default for SprintState {
    fn default() -> Self {
        Self {
            sprint: 0,
            phase: Phase::Initialization,
            phase_loop: 0,
            rework_cycles: 0,
            project_done: false,
            sprint_started_at: None,
            history: Vec::new(),
        }
    }
}

/// Handle to every persisted controller document.
#[derive(Debug, Clone)]
pub struct StateStore {
    paths: ForemanPaths,
}

impl StateStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            paths: ForemanPaths::new(root.as_ref()),
        }
    }

    pub fn paths(&self) -> &ForemanPaths {
        &self.paths
    }

    pub fn load_sprint_state(&self) -> Result<SprintState> {
        load_or_default(&self.paths.sprint_state_path)
    }

    pub fn save_sprint_state(&self, state: &SprintState) -> Result<()> {
        debug!(
            sprint = state.sprint,
            phase = state.phase.as_str(),
            phase_loop = state.phase_loop,
            "writing sprint state"
        );
        write_json(&self.paths.sprint_state_path, state)
    }

    pub fn load_breaker(&self) -> Result<BreakerState> {
        load_or_default(&self.paths.breaker_path)
    }

    pub fn save_breaker(&self, state: &BreakerState) -> Result<()> {
        write_json(&self.paths.breaker_path, state)
    }

    /// The limiter has no failure mode: a corrupt or missing document is
    /// recreated with zero usage instead of failing the run.
    pub fn load_limiter(&self) -> LimiterState {
        let path = &self.paths.limiter_path;
        if !path.exists() {
            return LimiterState::default();
        }
        match fs::read_to_string(path)
            .ok()
            .and_then(|contents| serde_json::from_str(&contents).ok())
        {
            Some(state) => state,
            None => {
                warn!(path = %path.display(), "limiter state unreadable, recreating with zero usage");
                LimiterState::default()
            }
        }
    }

    pub fn save_limiter(&self, state: &LimiterState) -> Result<()> {
        write_json(&self.paths.limiter_path, state)
    }

    pub fn load_signals(&self) -> Result<ExitSignals> {
        load_or_default(&self.paths.signals_path)
    }

    pub fn save_signals(&self, signals: &ExitSignals) -> Result<()> {
        write_json(&self.paths.signals_path, signals)
    }
}

fn load_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Ok(T::default());
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))
}

/// Serialize to pretty JSON with a trailing newline and replace the document
/// atomically (temp file + rename).
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value).context("serialize json")?;
    buf.push('\n');
    let parent = path
        .parent()
        .with_context(|| format!("state path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, &buf).with_context(|| format!("write temp {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}
