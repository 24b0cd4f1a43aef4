//! Structured per-invocation records under `.foreman/invocations/`.
//!
//! The raw worker output goes to the `.log` file (written by the worker
//! adapter); this module writes the `.json` record beside it so halts can be
//! audited without replaying logs.

use anyhow::Result;
use serde::Serialize;

use crate::core::phase::Phase;
use crate::core::status_block::StatusBlock;
use crate::core::types::{TestsStatus, WorkerVerdict};
use crate::io::paths::ForemanPaths;
use crate::io::store::write_json;

#[derive(Debug, Clone, Serialize)]
pub struct InvocationRecord {
    pub sprint: u32,
    pub phase: Phase,
    pub loop_number: u32,
    pub verdict: WorkerVerdict,
    pub files_changed: u32,
    pub output_bytes: usize,
    pub duration_ms: u64,
    /// Whether a status block was present, and its salient fields.
    pub status: Option<StatusSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusSummary {
    pub tasks_completed: Option<u32>,
    pub tasks_remaining: Option<u32>,
    pub tests: Option<TestsStatus>,
    pub phase_complete: bool,
    pub project_complete: bool,
    pub blockers: Option<String>,
}

impl StatusSummary {
    pub fn from_block(block: &StatusBlock) -> Self {
        Self {
            tasks_completed: block.tasks_completed,
            tasks_remaining: block.tasks_remaining,
            tests: block.tests,
            phase_complete: block.phase_complete,
            project_complete: block.project_complete,
            blockers: block.blockers.clone(),
        }
    }
}

pub fn write_invocation_record(paths: &ForemanPaths, record: &InvocationRecord) -> Result<()> {
    let path = paths.invocation_meta_path(record.sprint, record.phase, record.loop_number);
    write_json(&path, record)
}
