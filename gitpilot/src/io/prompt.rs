//! Prompt rendering for agent calls.

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use tracing::debug;

use crate::core::types::{GitStatusSnapshot, RecoveryContext};

const PLAN_TEMPLATE: &str = include_str!("prompts/plan.md");
const RECOVERY_TEMPLATE: &str = include_str!("prompts/recovery.md");
const COMMIT_MESSAGE_TEMPLATE: &str = include_str!("prompts/commit_message.md");

pub const PLAN_SCHEMA: &str = include_str!("schemas/plan.schema.json");
pub const COMMIT_MESSAGE_SCHEMA: &str = include_str!("schemas/commit_message.schema.json");

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("plan", PLAN_TEMPLATE)
            .context("load plan template")?;
        env.add_template("recovery", RECOVERY_TEMPLATE)
            .context("load recovery template")?;
        env.add_template("commit_message", COMMIT_MESSAGE_TEMPLATE)
            .context("load commit_message template")?;
        Ok(Self { env })
    }

    pub fn render_plan(&self, task: &str, status: &GitStatusSnapshot) -> Result<String> {
        let template = self.env.get_template("plan")?;
        let rendered = template
            .render(context! {
                task => task.trim(),
                status => status,
            })
            .context("render plan prompt")?;
        debug!(bytes = rendered.len(), "rendered plan prompt");
        Ok(rendered)
    }

    pub fn render_recovery(&self, recovery: &RecoveryContext) -> Result<String> {
        let template = self.env.get_template("recovery")?;
        let rendered = template
            .render(context! {
                task => recovery.task.trim(),
                original => &recovery.original_plan,
                failed => &recovery.failed,
                status => &recovery.status,
                completed => &recovery.completed,
            })
            .context("render recovery prompt")?;
        debug!(bytes = rendered.len(), "rendered recovery prompt");
        Ok(rendered)
    }

    /// `truncated` tells the model it is seeing only part of the diff.
    pub fn render_commit_message(&self, diff: &str, truncated: bool) -> Result<String> {
        let template = self.env.get_template("commit_message")?;
        template
            .render(context! {
                diff => diff.trim_end(),
                truncated => truncated,
            })
            .context("render commit_message prompt")
    }
}
