//! Tolerant parser for the worker's delimited status block.
//!
//! Workers *may* end their output with a block like:
//!
//! ```text
//! ===STATUS===
//! role: implementer
//! phase: implementation
//! sprint: 2
//! tasks_completed: 3
//! tasks_remaining: 4
//! blockers: none
//! tests: PASSING
//! phase_complete: false
//! project_complete: false
//! next_action: move T-12 into QA
//! ===END STATUS===
//! ```
//!
//! Absence of the block is a normal, cheap case (the controller falls back to
//! ground truth), so parsing never errors: a missing block yields `None`, a
//! malformed field yields that field's default.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::types::TestsStatus;

const BLOCK_START: &str = "===STATUS===";
const BLOCK_END: &str = "===END STATUS===";

/// Structured worker self-report, when present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusBlock {
    pub role: Option<String>,
    pub phase: Option<String>,
    pub sprint: Option<u32>,
    pub tasks_completed: Option<u32>,
    pub tasks_remaining: Option<u32>,
    pub blockers: Option<String>,
    pub tests: Option<TestsStatus>,
    pub phase_complete: bool,
    pub project_complete: bool,
    pub next_action: Option<String>,
}

/// Extract the status block from raw worker output, if one exists.
///
/// Output is cleaned of terminal control sequences first; the last block wins
/// when several are present.
pub fn parse_status_block(output: &str) -> Option<StatusBlock> {
    let cleaned = strip_control_sequences(output);
    let start = cleaned.rfind(BLOCK_START)?;
    let body_start = start + BLOCK_START.len();
    let body = match cleaned[body_start..].find(BLOCK_END) {
        Some(end) => &cleaned[body_start..body_start + end],
        // Truncated output: parse what is there rather than rejecting it.
        None => &cleaned[body_start..],
    };

    let mut block = StatusBlock::default();
    for line in body.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        match key.trim().to_ascii_lowercase().as_str() {
            "role" => block.role = Some(value.to_string()),
            "phase" => block.phase = Some(value.to_string()),
            "sprint" => block.sprint = value.parse().ok(),
            "tasks_completed" => block.tasks_completed = value.parse().ok(),
            "tasks_remaining" => block.tasks_remaining = value.parse().ok(),
            "blockers" => {
                if !value.eq_ignore_ascii_case("none") {
                    block.blockers = Some(value.to_string());
                }
            }
            "tests" => block.tests = parse_tests(value),
            "phase_complete" => block.phase_complete = parse_bool(value),
            "project_complete" => block.project_complete = parse_bool(value),
            "next_action" => block.next_action = Some(value.to_string()),
            _ => {}
        }
    }
    Some(block)
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "true" | "yes" | "y" | "1"
    )
}

fn parse_tests(value: &str) -> Option<TestsStatus> {
    match value.to_ascii_uppercase().as_str() {
        "PASSING" => Some(TestsStatus::Passing),
        "FAILING" => Some(TestsStatus::Failing),
        "NOT_RUN" => Some(TestsStatus::NotRun),
        _ => None,
    }
}

/// Strip ANSI escape and other terminal control sequences from TUI output.
pub fn strip_control_sequences(text: &str) -> String {
    static CSI_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\x1b\[[0-9;?]*[A-Za-z]").expect("csi regex"));
    static OSC_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\x1b\][^\x07]*\x07").expect("osc regex"));

    let text = CSI_RE.replace_all(text, "");
    let text = OSC_RE.replace_all(&text, "");
    text.replace('\r', "")
}
