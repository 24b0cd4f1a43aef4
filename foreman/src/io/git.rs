//! Change detection over the worker's working tree.
//!
//! The breaker's progress signal is "did the worker change any files"; we
//! derive it from git rather than trusting the worker's own claims. A small,
//! explicit wrapper around `git` subprocess calls keeps this auditable.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument};

/// Working-tree state captured before an invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSnapshot {
    /// HEAD commit, if the repository has one.
    head: Option<String>,
    /// Paths with uncommitted changes (porcelain, including untracked).
    dirty: BTreeSet<String>,
}

impl ChangeSnapshot {
    /// A snapshot with no observed state; scripted trackers use this.
    pub fn empty() -> Self {
        Self {
            head: None,
            dirty: BTreeSet::new(),
        }
    }
}

/// Seam for observing worker progress. Scripted in tests.
pub trait ChangeTracker {
    fn snapshot(&self) -> Result<ChangeSnapshot>;
    /// Number of distinct paths changed since `before` (worktree edits plus
    /// files touched by new commits).
    fn changes_since(&self, before: &ChangeSnapshot) -> Result<u32>;
}

/// Tracker backed by `git` in the project directory.
#[derive(Debug, Clone)]
pub struct GitChangeTracker {
    workdir: PathBuf,
}

impl GitChangeTracker {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    /// Fail fast when the project directory is not a git repository; a
    /// tracker that always reported zero progress would open the breaker
    /// spuriously.
    pub fn ensure_repository(&self) -> Result<()> {
        self.run_capture(&["rev-parse", "--git-dir"])
            .map(|_| ())
            .context("project directory is not a git repository")
    }

    fn head(&self) -> Result<Option<String>> {
        // An empty repository has no HEAD yet; that is not an error.
        let out = self.run(&["rev-parse", "--verify", "--quiet", "HEAD"])?;
        if !out.status.success() {
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&out.stdout).trim().to_string()))
    }

    fn dirty_paths(&self) -> Result<BTreeSet<String>> {
        let out = self.run_capture(&["status", "--porcelain=v1", "-uall"])?;
        let mut paths = BTreeSet::new();
        for line in out.lines() {
            if line.len() > 3 {
                paths.insert(line[3..].trim().to_string());
            }
        }
        Ok(paths)
    }

    fn committed_paths(&self, from: &str, to: &str) -> Result<BTreeSet<String>> {
        let range = format!("{from}..{to}");
        let out = self.run_capture(&["diff", "--name-only", &range])?;
        Ok(out.lines().map(|l| l.trim().to_string()).collect())
    }

    fn first_commit_paths(&self, head: &str) -> Result<BTreeSet<String>> {
        let out = self.run_capture(&["show", "--pretty=", "--name-only", head])?;
        Ok(out.lines().map(|l| l.trim().to_string()).collect())
    }

    fn run(&self, args: &[&str]) -> Result<std::process::Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("run git {}", args.join(" ")))
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let out = self.run(args)?;
        if !out.status.success() {
            return Err(anyhow!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&out.stderr).trim()
            ));
        }
        Ok(String::from_utf8_lossy(&out.stdout).to_string())
    }
}

impl ChangeTracker for GitChangeTracker {
    fn snapshot(&self) -> Result<ChangeSnapshot> {
        Ok(ChangeSnapshot {
            head: self.head()?,
            dirty: self.dirty_paths()?,
        })
    }

    #[instrument(skip_all)]
    fn changes_since(&self, before: &ChangeSnapshot) -> Result<u32> {
        let after = self.snapshot()?;

        let mut changed: BTreeSet<String> = before
            .dirty
            .symmetric_difference(&after.dirty)
            .cloned()
            .collect();
        match (&before.head, &after.head) {
            (Some(old), Some(new)) if old != new => {
                changed.extend(self.committed_paths(old, new)?);
            }
            (None, Some(new)) => {
                changed.extend(self.first_commit_paths(new)?);
            }
            _ => {}
        }
        changed.retain(|path| !path.is_empty());

        debug!(changed = changed.len(), "changes since snapshot");
        Ok(changed.len() as u32)
    }
}
