//! Role/phase prompt rendering for worker invocations.

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use tracing::debug;

use crate::core::phase::{Phase, Role};

const BOOTSTRAP_TEMPLATE: &str = include_str!("prompts/bootstrap.md");
const PLANNER_TEMPLATE: &str = include_str!("prompts/planner.md");
const IMPLEMENTER_TEMPLATE: &str = include_str!("prompts/implementer.md");
const QA_TEMPLATE: &str = include_str!("prompts/qa.md");
const REVIEWER_TEMPLATE: &str = include_str!("prompts/reviewer.md");

/// Everything a role template may reference.
#[derive(Debug, Clone, Default)]
pub struct PromptInputs {
    pub sprint: u32,
    pub loop_number: u32,
    /// One line per task: id, status, title.
    pub backlog_summary: String,
    /// Unchecked fix-plan items, when a fix plan exists.
    pub fix_plan_summary: Option<String>,
    /// Blockers reported by the previous invocation's status block.
    pub last_blockers: Option<String>,
}

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        for (name, source) in [
            ("bootstrap", BOOTSTRAP_TEMPLATE),
            ("planner", PLANNER_TEMPLATE),
            ("implementer", IMPLEMENTER_TEMPLATE),
            ("qa", QA_TEMPLATE),
            ("reviewer", REVIEWER_TEMPLATE),
        ] {
            env.add_template(name, source)
                .expect("compiled-in template should be valid");
        }
        Self { env }
    }

    pub fn render(&self, phase: Phase, inputs: &PromptInputs) -> Result<String> {
        let role = phase.role();
        let template = self
            .env
            .get_template(role.as_str())
            .with_context(|| format!("template for role {}", role.as_str()))?;
        let rendered = template
            .render(context! {
                sprint => inputs.sprint,
                loop_number => inputs.loop_number,
                phase => phase.as_str(),
                role => role.as_str(),
                backlog => non_empty(&inputs.backlog_summary),
                fix_plan => inputs.fix_plan_summary.as_deref().and_then(non_empty),
                blockers => inputs.last_blockers.as_deref().and_then(non_empty),
            })
            .with_context(|| format!("render {} prompt", role.as_str()))?;
        debug!(role = role.as_str(), bytes = rendered.len(), "prompt rendered");
        Ok(rendered)
    }
}

impl Default for PromptEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn non_empty(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}
