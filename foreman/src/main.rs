//! Sprint execution controller for an external coding agent.
//!
//! Supervises a project through initialization and numbered sprints
//! (Planning → Implementation ⇄ QA → Review), invoking the worker agent one
//! bounded call at a time and halting on stagnation, quota, or completion.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

use foreman::invocation::PhaseRunner;
use foreman::io::clock::SystemClock;
use foreman::io::config::load_config;
use foreman::io::git::GitChangeTracker;
use foreman::io::init::{InitOptions, init_project};
use foreman::io::prompt::PromptEngine;
use foreman::io::store::StateStore;
use foreman::io::worker::AgentWorker;
use foreman::sprint::run_project;
use foreman::status_report::print_status;
use foreman::{exit_codes, interrupt, logging};

#[derive(Parser)]
#[command(
    name = "foreman",
    version,
    about = "Sprint execution controller for an external coding agent"
)]
struct Cli {
    /// Project directory (defaults to the current directory).
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create `.foreman/` scaffolding (config, backlog skeleton, state docs).
    Init {
        /// Overwrite existing controller-owned files.
        #[arg(short, long)]
        force: bool,
    },
    /// Run the project loop from persisted state until it halts or completes.
    Run,
    /// Print the sprint/breaker/quota/backlog summary.
    Status,
    /// Close an open circuit breaker so the next run may proceed.
    ResetBreaker {
        /// Why the breaker is being reset (recorded in the state document).
        #[arg(long)]
        reason: String,
    },
}

fn main() -> ExitCode {
    logging::init();
    let cli = Cli::parse();
    match dispatch(cli) {
        Ok(code) => ExitCode::from(code as u8),
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::from(exit_codes::ERROR as u8)
        }
    }
}

fn dispatch(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Init { force } => {
            init_project(&cli.root, &InitOptions { force })?;
            println!("initialized .foreman in {}", cli.root.display());
            Ok(exit_codes::OK)
        }
        Command::Run => cmd_run(&cli.root),
        Command::Status => {
            print_status(&cli.root, &SystemClock)?;
            Ok(exit_codes::OK)
        }
        Command::ResetBreaker { reason } => {
            let store = StateStore::new(&cli.root);
            let mut breaker = store.load_breaker()?;
            breaker.reset(&reason);
            store.save_breaker(&breaker)?;
            println!("circuit breaker reset");
            Ok(exit_codes::OK)
        }
    }
}

fn cmd_run(root: &Path) -> Result<i32> {
    interrupt::install_handler()?;

    let store = StateStore::new(root);
    let config = load_config(&store.paths().config_path)?;
    let tracker = GitChangeTracker::new(root);
    tracker.ensure_repository()?;
    let worker = AgentWorker::new(config.worker.command.clone(), config.worker.model.clone());
    let engine = PromptEngine::new();
    let clock = SystemClock;

    let runner = PhaseRunner {
        store: &store,
        config: &config,
        worker: &worker,
        tracker: &tracker,
        clock: &clock,
        engine: &engine,
    };
    let outcome = run_project(&runner)?;
    Ok(outcome.exit_code())
}
