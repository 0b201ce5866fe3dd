//! Run state owned by the engine for one top-level invocation.

use serde::Serialize;

use crate::core::types::{GitStatusSnapshot, Plan, StepResult};

pub const SUCCESS_MESSAGE: &str = "execution completed successfully";
pub const PARTIAL_FAILURE_MESSAGE: &str = "execution completed with some failures";

/// Everything the engine accumulates while walking a plan.
///
/// Collaborators only ever see `&RunState`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunState {
    /// Natural-language request the plan was generated for.
    pub task: String,
    /// Current plan; replaced when a recovery plan is accepted.
    pub plan: Plan,
    /// Latest status snapshot; replaced after a command failure.
    pub git_status: GitStatusSnapshot,
    /// Results of the current pass only.
    pub step_results: Vec<StepResult>,
    /// Append-only; duplicates are kept until display.
    pub lessons_learned: Vec<String>,
    /// Sticky once set.
    pub recovery_needed: bool,
    pub operation_complete: bool,
    pub operation_success: bool,
    pub final_message: String,
}

impl RunState {
    pub fn new(task: impl Into<String>, plan: Plan, git_status: GitStatusSnapshot) -> Self {
        Self {
            task: task.into(),
            plan,
            git_status,
            step_results: Vec::new(),
            lessons_learned: Vec::new(),
            recovery_needed: false,
            operation_complete: false,
            operation_success: false,
            final_message: String::new(),
        }
    }

    /// Record the terminal outcome of a run.
    pub fn finish(&mut self, all_success: bool) {
        self.operation_complete = true;
        self.operation_success = all_success;
        self.final_message = if all_success {
            SUCCESS_MESSAGE
        } else {
            PARTIAL_FAILURE_MESSAGE
        }
        .to_string();
    }

    /// Successful results of the current pass.
    pub fn successful_results(&self) -> Vec<StepResult> {
        self.step_results
            .iter()
            .filter(|result| result.success)
            .cloned()
            .collect()
    }

    /// Lessons for display: first-seen order, duplicates removed, at most `limit`.
    pub fn unique_lessons(&self, limit: usize) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for lesson in &self.lessons_learned {
            if seen.len() >= limit {
                break;
            }
            if !seen.contains(&lesson.as_str()) {
                seen.push(lesson.as_str());
            }
        }
        seen
    }
}
