//! Controller configuration stored under `.foreman/state/config.toml`.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::breaker::{
    BreakerLimits, DEFAULT_FAILURE_CEILING, DEFAULT_NO_PROGRESS_CEILING,
};
use crate::core::phase::{Phase, Role};
use crate::core::quota::DEFAULT_HOURLY_CEILING;

/// Controller configuration (TOML).
///
/// Edited by humans, read once per run (no hot reload). Missing fields
/// default to sensible values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ForemanConfig {
    /// Hard cap on sprint numbers before the run stops with a warning.
    pub sprint_ceiling: u32,

    /// Maximum Implementation ⇄ QA repetitions per sprint.
    pub rework_ceiling: u32,

    /// Invocations permitted per calendar hour.
    pub hourly_invocation_ceiling: u32,

    /// Fixed delay before retrying an unclassified worker error, in seconds.
    pub retry_delay_secs: u64,

    /// Truncate captured worker output beyond this many bytes.
    pub worker_output_limit_bytes: usize,

    pub phase_loops: PhaseLoopConfig,
    pub breaker: BreakerConfig,
    pub timeouts: TimeoutConfig,
    pub worker: WorkerConfig,
}

/// Per-phase invocation-loop ceilings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PhaseLoopConfig {
    pub initialization: u32,
    pub planning: u32,
    pub implementation: u32,
    pub qa: u32,
    pub review: u32,
}

impl Default for PhaseLoopConfig {
    fn default() -> Self {
        Self {
            initialization: 5,
            planning: 5,
            implementation: 25,
            qa: 15,
            review: 5,
        }
    }
}

impl PhaseLoopConfig {
    pub fn ceiling(&self, phase: Phase) -> u32 {
        match phase {
            Phase::Initialization => self.initialization,
            Phase::Planning => self.planning,
            Phase::Implementation => self.implementation,
            Phase::Qa => self.qa,
            Phase::Review => self.review,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BreakerConfig {
    pub failure_ceiling: u32,
    pub no_progress_ceiling: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_ceiling: DEFAULT_FAILURE_CEILING,
            no_progress_ceiling: DEFAULT_NO_PROGRESS_CEILING,
        }
    }
}

impl BreakerConfig {
    pub fn limits(&self) -> BreakerLimits {
        BreakerLimits {
            failure_ceiling: self.failure_ceiling,
            no_progress_ceiling: self.no_progress_ceiling,
        }
    }
}

/// Per-role invocation timeouts in seconds; unset roles use `default_secs`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TimeoutConfig {
    pub default_secs: u64,
    pub bootstrap_secs: Option<u64>,
    pub planner_secs: Option<u64>,
    pub implementer_secs: Option<u64>,
    pub qa_secs: Option<u64>,
    pub reviewer_secs: Option<u64>,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            default_secs: 900,
            bootstrap_secs: None,
            planner_secs: None,
            implementer_secs: None,
            qa_secs: None,
            reviewer_secs: None,
        }
    }
}

impl TimeoutConfig {
    pub fn for_role(&self, role: Role) -> Duration {
        let secs = match role {
            Role::Bootstrap => self.bootstrap_secs,
            Role::Planner => self.planner_secs,
            Role::Implementer => self.implementer_secs,
            Role::Qa => self.qa_secs,
            Role::Reviewer => self.reviewer_secs,
        };
        Duration::from_secs(secs.unwrap_or(self.default_secs))
    }
}

/// How to launch the worker process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WorkerConfig {
    /// Command and leading arguments (e.g. `["cursor-agent"]`).
    pub command: Vec<String>,
    /// Model identifier passed through to the worker.
    pub model: Option<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            command: vec!["cursor-agent".to_string()],
            model: None,
        }
    }
}

impl Default for ForemanConfig {
    fn default() -> Self {
        Self {
            sprint_ceiling: 10,
            rework_ceiling: 3,
            hourly_invocation_ceiling: DEFAULT_HOURLY_CEILING,
            retry_delay_secs: 10,
            worker_output_limit_bytes: 200_000,
            phase_loops: PhaseLoopConfig::default(),
            breaker: BreakerConfig::default(),
            timeouts: TimeoutConfig::default(),
            worker: WorkerConfig::default(),
        }
    }
}

impl ForemanConfig {
    pub fn validate(&self) -> Result<()> {
        if self.sprint_ceiling == 0 {
            return Err(anyhow!("sprint_ceiling must be > 0"));
        }
        if self.hourly_invocation_ceiling == 0 {
            return Err(anyhow!("hourly_invocation_ceiling must be > 0"));
        }
        if self.worker_output_limit_bytes == 0 {
            return Err(anyhow!("worker_output_limit_bytes must be > 0"));
        }
        if self.timeouts.default_secs == 0 {
            return Err(anyhow!("timeouts.default_secs must be > 0"));
        }
        if self.breaker.failure_ceiling == 0 || self.breaker.no_progress_ceiling == 0 {
            return Err(anyhow!("breaker ceilings must be > 0"));
        }
        for (phase, ceiling) in [
            ("initialization", self.phase_loops.initialization),
            ("planning", self.phase_loops.planning),
            ("implementation", self.phase_loops.implementation),
            ("qa", self.phase_loops.qa),
            ("review", self.phase_loops.review),
        ] {
            if ceiling == 0 {
                return Err(anyhow!("phase_loops.{phase} must be > 0"));
            }
        }
        if self.worker.command.is_empty() || self.worker.command[0].trim().is_empty() {
            return Err(anyhow!("worker.command must be a non-empty array"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `ForemanConfig::default()`.
pub fn load_config(path: &Path) -> Result<ForemanConfig> {
    if !path.exists() {
        let cfg = ForemanConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: ForemanConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &ForemanConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, &buf)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
