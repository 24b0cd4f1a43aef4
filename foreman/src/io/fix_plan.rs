//! Optional fix-plan checklist (`FIX_PLAN.md`).
//!
//! The worker maintains a markdown checklist of remaining repairs; the
//! controller only counts checked vs unchecked line items. The marker
//! convention is fixed: `- [ ]` unchecked, `- [x]` checked (also `*` bullets
//! and a capital X).

use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;

use crate::core::completion::ChecklistFacts;

static CHECKED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*[-*]\s+\[[xX]\]\s+\S").expect("checked regex"));
static UNCHECKED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*[-*]\s+\[ \]\s+\S").expect("unchecked regex"));

/// Count checklist items in a document body.
pub fn count_items(contents: &str) -> ChecklistFacts {
    let mut facts = ChecklistFacts::default();
    for line in contents.lines() {
        if CHECKED_RE.is_match(line) {
            facts.checked += 1;
        } else if UNCHECKED_RE.is_match(line) {
            facts.unchecked += 1;
        }
    }
    facts
}

/// Load the checklist if the document exists; `None` means no fix plan.
pub fn load_checklist(path: &Path) -> Result<Option<ChecklistFacts>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    Ok(Some(count_items(&contents)))
}

/// The unchecked line items themselves, for prompt context.
pub fn load_unchecked_items(path: &Path) -> Result<Vec<String>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    Ok(contents
        .lines()
        .filter(|line| UNCHECKED_RE.is_match(line))
        .map(|line| line.trim().to_string())
        .collect())
}
