//! Worker invocation boundary.
//!
//! The [`Worker`] trait decouples the invocation loop from the actual agent
//! backend (an external coding-agent CLI). Tests use scripted workers that
//! return predetermined outputs without spawning processes.

use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::core::phase::{Phase, Role};
use crate::core::status_block::strip_control_sequences;
use crate::core::types::WorkerVerdict;
use crate::io::process::run_command_with_timeout;

/// Failure output shapes treated as an upstream rate limit rather than a
/// worker error. Matched case-insensitively against combined output.
const RATE_LIMIT_MARKERS: &[&str] = &[
    "rate limit",
    "rate-limited",
    "too many requests",
    "usage limit reached",
    "quota exceeded",
    "429",
];

/// Parameters for one worker invocation.
#[derive(Debug, Clone)]
pub struct WorkRequest {
    pub role: Role,
    pub phase: Phase,
    pub sprint: u32,
    /// Rendered prompt text.
    pub prompt: String,
    /// Working directory for the worker process.
    pub workdir: PathBuf,
    /// Where combined (cleaned) output is persisted.
    pub log_path: PathBuf,
    /// Hard wall-clock budget; the process is killed past it.
    pub timeout: Duration,
    /// Truncate captured output beyond this many bytes.
    pub output_limit_bytes: usize,
}

/// Result of one worker invocation.
#[derive(Debug, Clone)]
pub struct WorkerInvocation {
    pub verdict: WorkerVerdict,
    /// Combined output, cleaned of terminal control sequences.
    pub output: String,
}

/// Abstraction over worker backends.
pub trait Worker {
    /// Invoke the worker. `Err` means a controller-side failure (e.g. the log
    /// could not be written); worker misbehavior is a verdict, not an error.
    fn invoke(&self, request: &WorkRequest) -> Result<WorkerInvocation>;
}

/// Worker that spawns an external coding-agent CLI.
///
/// The command line follows the agent wrapper convention:
/// `<command> [--model <model>] -p <prompt>`.
#[derive(Debug, Clone)]
pub struct AgentWorker {
    command: Vec<String>,
    model: Option<String>,
}

impl AgentWorker {
    pub fn new(command: Vec<String>, model: Option<String>) -> Self {
        Self { command, model }
    }
}

impl Worker for AgentWorker {
    #[instrument(skip_all, fields(role = request.role.as_str(), phase = request.phase.as_str(), sprint = request.sprint, timeout_secs = request.timeout.as_secs()))]
    fn invoke(&self, request: &WorkRequest) -> Result<WorkerInvocation> {
        info!(workdir = %request.workdir.display(), "invoking worker");

        let (program, leading) = self
            .command
            .split_first()
            .context("worker command is empty")?;
        let mut cmd = Command::new(program);
        cmd.args(leading);
        if let Some(model) = &self.model {
            cmd.arg("--model").arg(model);
        }
        cmd.arg("-p")
            .arg(&request.prompt)
            .current_dir(&request.workdir);

        let captured =
            run_command_with_timeout(cmd, request.timeout, request.output_limit_bytes)
                .context("run worker command")?;

        let output = strip_control_sequences(&captured.combined());
        write_invocation_log(&request.log_path, &output)?;

        let verdict = if captured.timed_out {
            warn!(timeout_secs = request.timeout.as_secs(), "worker timed out");
            WorkerVerdict::Timeout
        } else if captured.status.success() {
            WorkerVerdict::Success
        } else if looks_rate_limited(&output) {
            warn!("worker reported an upstream rate limit");
            WorkerVerdict::RateLimited
        } else {
            warn!(exit_code = ?captured.status.code(), "worker failed");
            WorkerVerdict::Error
        };

        debug!(verdict = ?verdict, output_bytes = output.len(), "worker invocation classified");
        Ok(WorkerInvocation { verdict, output })
    }
}

fn looks_rate_limited(output: &str) -> bool {
    let text = output.to_ascii_lowercase();
    RATE_LIMIT_MARKERS.iter().any(|marker| text.contains(marker))
}

fn write_invocation_log(path: &PathBuf, output: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create invocation log dir {}", parent.display()))?;
    }
    fs::write(path, output).with_context(|| format!("write invocation log {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(temp: &tempfile::TempDir) -> WorkRequest {
        WorkRequest {
            role: Role::Implementer,
            phase: Phase::Implementation,
            sprint: 1,
            prompt: "do the work".to_string(),
            workdir: temp.path().to_path_buf(),
            log_path: temp.path().join("logs/impl-1.log"),
            timeout: Duration::from_secs(5),
            output_limit_bytes: 10_000,
        }
    }

    #[test]
    fn successful_command_is_classified_success() {
        let temp = tempfile::tempdir().expect("tempdir");
        // `sh -c 'echo done' sh` treats the appended `-p <prompt>` as
        // positional parameters and ignores them.
        let worker = AgentWorker::new(
            vec![
                "sh".to_string(),
                "-c".to_string(),
                "echo done".to_string(),
                "sh".to_string(),
            ],
            None,
        );
        let invocation = worker.invoke(&request(&temp)).expect("invoke");
        assert_eq!(invocation.verdict, WorkerVerdict::Success);
        assert!(invocation.output.contains("done"));
        assert!(temp.path().join("logs/impl-1.log").is_file());
    }

    #[test]
    fn failing_command_with_rate_limit_text_is_rate_limited() {
        let temp = tempfile::tempdir().expect("tempdir");
        let worker = AgentWorker::new(
            vec![
                "sh".to_string(),
                "-c".to_string(),
                "echo 'HTTP 429 Too Many Requests' >&2; exit 1".to_string(),
                "sh".to_string(),
            ],
            None,
        );
        let invocation = worker.invoke(&request(&temp)).expect("invoke");
        assert_eq!(invocation.verdict, WorkerVerdict::RateLimited);
    }

    #[test]
    fn failing_command_without_markers_is_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let worker = AgentWorker::new(
            vec![
                "sh".to_string(),
                "-c".to_string(),
                "echo boom >&2; exit 3".to_string(),
                "sh".to_string(),
            ],
            None,
        );
        let invocation = worker.invoke(&request(&temp)).expect("invoke");
        assert_eq!(invocation.verdict, WorkerVerdict::Error);
        assert!(invocation.output.contains("boom"));
    }

    #[test]
    fn timeout_is_classified_timeout() {
        let temp = tempfile::tempdir().expect("tempdir");
        let worker = AgentWorker::new(
            vec![
                "sh".to_string(),
                "-c".to_string(),
                "sleep 30".to_string(),
                "sh".to_string(),
            ],
            None,
        );
        let mut req = request(&temp);
        req.timeout = Duration::from_millis(100);
        let invocation = worker.invoke(&req).expect("invoke");
        assert_eq!(invocation.verdict, WorkerVerdict::Timeout);
    }
}
