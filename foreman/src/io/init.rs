//! Initialization helpers for `.foreman/` scaffolding.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};

use crate::core::breaker::BreakerState;
use crate::core::completion::ExitSignals;
use crate::core::quota::LimiterState;
use crate::io::backlog::{BACKLOG_SCHEMA, write_backlog_skeleton};
use crate::io::config::{ForemanConfig, write_config};
use crate::io::paths::ForemanPaths;
use crate::io::store::{SprintState, write_json};

/// Options for `init_project`.
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// If true, overwrite existing controller-owned files.
    pub force: bool,
}

/// Create `.foreman/` scaffolding in `root`.
///
/// Fails if `.foreman/` already exists unless `options.force` is set.
pub fn init_project(root: &Path, options: &InitOptions) -> Result<ForemanPaths> {
    let paths = ForemanPaths::new(root);
    if paths.foreman_dir.exists() && !options.force {
        return Err(anyhow!(
            "foreman init: .foreman already exists (use --force to overwrite)"
        ));
    }
    if paths.foreman_dir.exists() && !paths.foreman_dir.is_dir() {
        return Err(anyhow!("foreman init: .foreman exists but is not a directory"));
    }

    create_dir(&paths.foreman_dir)?;
    create_dir(&paths.state_dir)?;
    create_dir(&paths.sprints_dir)?;
    create_dir(&paths.invocations_dir)?;

    write_config(&paths.config_path, &ForemanConfig::default())?;
    write_backlog_skeleton(&paths.backlog_path)?;
    fs::write(&paths.backlog_schema_path, BACKLOG_SCHEMA)
        .with_context(|| format!("write {}", paths.backlog_schema_path.display()))?;
    write_json(&paths.sprint_state_path, &SprintState::default())?;
    write_json(&paths.breaker_path, &BreakerState::default())?;
    write_json(&paths.limiter_path, &LimiterState::default())?;
    write_json(&paths.signals_path, &ExitSignals::default())?;

    Ok(paths)
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("create directory {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::store::StateStore;

    #[test]
    fn init_creates_expected_layout() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = init_project(temp.path(), &InitOptions { force: false }).expect("init");

        assert!(paths.foreman_dir.is_dir());
        assert!(paths.state_dir.is_dir());
        assert!(paths.sprints_dir.is_dir());
        assert!(paths.invocations_dir.is_dir());
        assert!(paths.config_path.is_file());
        assert!(paths.backlog_path.is_file());
        assert!(paths.backlog_schema_path.is_file());
        assert!(paths.sprint_state_path.is_file());
        assert!(paths.breaker_path.is_file());
        assert!(paths.limiter_path.is_file());
        assert!(paths.signals_path.is_file());

        // The scaffold must load back as defaults.
        let store = StateStore::new(temp.path());
        assert_eq!(store.load_sprint_state().expect("state"), SprintState::default());
        assert_eq!(store.load_limiter(), LimiterState::default());
    }

    #[test]
    fn init_without_force_refuses_existing_dir() {
        let temp = tempfile::tempdir().expect("tempdir");
        init_project(temp.path(), &InitOptions { force: false }).expect("init");
        let err = init_project(temp.path(), &InitOptions { force: false }).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn init_with_force_rewrites_state() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = init_project(temp.path(), &InitOptions { force: false }).expect("init");

        let store = StateStore::new(temp.path());
        let mut state = store.load_sprint_state().expect("state");
        state.sprint = 7;
        store.save_sprint_state(&state).expect("save");

        init_project(temp.path(), &InitOptions { force: true }).expect("re-init");
        let state = StateStore::new(temp.path()).load_sprint_state().expect("state");
        assert_eq!(state, SprintState::default());
        assert!(paths.backlog_path.is_file());
    }
}
