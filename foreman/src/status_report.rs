//! `foreman status`: a plain-text summary of the persisted state.

use std::path::Path;

use anyhow::Result;

use crate::core::types::TaskStatus;
use crate::io::backlog::load_backlog;
use crate::io::clock::Clock;
use crate::io::fix_plan::load_checklist;
use crate::io::store::StateStore;

/// Print the sprint, breaker, limiter, and backlog summary to stdout.
pub fn print_status<C: Clock>(root: &Path, clock: &C) -> Result<()> {
    let store = StateStore::new(root);
    let paths = store.paths();

    let state = store.load_sprint_state()?;
    println!("sprint:        {} ({})", state.sprint, state.phase.as_str());
    println!("phase loop:    {}", state.phase_loop);
    println!("rework cycles: {}", state.rework_cycles);
    println!("project done:  {}", state.project_done);
    println!("past sprints:  {}", state.history.len());

    let breaker = store.load_breaker()?;
    match breaker.open_reason() {
        Some(reason) => println!("breaker:       OPEN ({reason})"),
        None => println!(
            "breaker:       closed (failures {}, no-progress {})",
            breaker.consecutive_failures(),
            breaker.consecutive_no_progress()
        ),
    }

    let limiter = store.load_limiter();
    let now = clock.now_epoch_secs();
    println!(
        "quota:         {} this hour, {} total",
        limiter.calls_this_hour(now),
        limiter.session_calls()
    );

    match load_backlog(&paths.backlog_path)? {
        Some(backlog) => {
            let facts = backlog.facts();
            let done = backlog
                .tasks()
                .iter()
                .filter(|task| task.status == TaskStatus::Done)
                .count();
            println!(
                "backlog:       {} tasks, {} done, {} unresolved, {} open P1 bugs",
                facts.total, done, facts.unresolved, facts.open_p1_bugs
            );
        }
        None => println!("backlog:       (missing; run `foreman init`)"),
    }

    match load_checklist(&paths.fix_plan_path)? {
        Some(facts) => println!(
            "fix plan:      {} checked, {} unchecked",
            facts.checked, facts.unchecked
        ),
        None => println!("fix plan:      none"),
    }
    Ok(())
}
