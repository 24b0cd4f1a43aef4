//! Read-only access to the worker-owned backlog document.
//!
//! The backlog is ground truth for every completion and phase decision, so it
//! is validated against a schema before anything trusts it. The controller
//! never writes task data; only `init` writes the empty skeleton.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use jsonschema::Draft;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::core::completion::BacklogFacts;
use crate::core::types::{Task, TaskStatus};
use crate::io::store::write_json;

pub const BACKLOG_SCHEMA: &str = include_str!("../../schemas/backlog.schema.json");

/// On-disk shape of `.foreman/state/backlog.json`.
///
/// The worker maintains `summary`; the controller recomputes aggregates from
/// the task records and ignores the stored copy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BacklogDoc {
    pub tasks: Vec<Task>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<Value>,
}

/// Validated snapshot of the backlog with derived queries.
#[derive(Debug, Clone, Default)]
pub struct Backlog {
    tasks: Vec<Task>,
}

impl Backlog {
    pub fn from_tasks(tasks: Vec<Task>) -> Self {
        Self { tasks }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn facts(&self) -> BacklogFacts {
        BacklogFacts {
            total: self.tasks.len(),
            unresolved: self
                .tasks
                .iter()
                .filter(|task| !task.status.is_resolved())
                .count(),
            open_p1_bugs: self.tasks.iter().filter(|t| t.is_open_p1_bug()).count(),
        }
    }

    /// Tasks planned into the given sprint.
    pub fn sprint_tasks(&self, sprint: u32) -> Vec<&Task> {
        self.tasks
            .iter()
            .filter(|task| task.sprint == Some(sprint))
            .collect()
    }

    /// Tasks in the sprint that failed verification and await rework.
    pub fn qa_failed_count(&self, sprint: u32) -> usize {
        self.sprint_tasks(sprint)
            .iter()
            .filter(|task| task.status == TaskStatus::QaFailed)
            .count()
    }
}

/// Load and validate the backlog document. A missing file yields `None`.
pub fn load_backlog(path: &Path) -> Result<Option<Backlog>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let raw: Value = serde_json::from_str(&contents)
        .with_context(|| format!("parse {}", path.display()))?;
    validate_schema(&raw)?;
    let doc: BacklogDoc = serde_json::from_value(raw)
        .with_context(|| format!("parse {} as backlog", path.display()))?;
    debug!(tasks = doc.tasks.len(), "backlog loaded");
    Ok(Some(Backlog::from_tasks(doc.tasks)))
}

/// Write the empty backlog skeleton at init time.
pub fn write_backlog_skeleton(path: &Path) -> Result<()> {
    write_json(path, &BacklogDoc::default())
}

fn validate_schema(instance: &Value) -> Result<()> {
    let schema: Value = serde_json::from_str(BACKLOG_SCHEMA).context("parse backlog schema")?;
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .context("compile backlog schema")?;
    let messages: Vec<String> = compiled
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        bail!("backlog schema validation failed:\n- {}", messages.join("\n- "));
    }
    Ok(())
}
