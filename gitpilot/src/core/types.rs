//! Shared deterministic types for the execution core.
//!
//! These types define stable contracts between the engine and its
//! collaborators. Plans arrive as JSON from the agent backend, so every type
//! that crosses that boundary derives `Serialize`/`Deserialize`.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Ordinal risk rating attached to a step or a whole plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SafetyLevel {
    Safe,
    Caution,
    Risky,
    Dangerous,
}

impl SafetyLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            SafetyLevel::Safe => "safe",
            SafetyLevel::Caution => "caution",
            SafetyLevel::Risky => "risky",
            SafetyLevel::Dangerous => "dangerous",
        }
    }

    /// True for levels that warrant an explicit warning before running.
    pub fn is_elevated(self) -> bool {
        matches!(self, SafetyLevel::Risky | SafetyLevel::Dangerous)
    }
}

impl fmt::Display for SafetyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Plan-level warning with optional safer alternatives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    pub message: String,
    #[serde(default)]
    pub safer_alternatives: Vec<String>,
}

/// One proposed git command plus explanatory and safety metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    /// Rewritten by commit-message synthesis or by a user edit.
    pub command: String,
    pub description: String,
    pub safety_level: SafetyLevel,
    #[serde(default)]
    pub potential_issues: Vec<String>,
    /// Appended to after a successful execution.
    #[serde(default)]
    pub educational_note: String,
}

/// Ordered steps produced for one task or one recovery.
///
/// Replaced wholesale on recovery, never patched in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub steps: Vec<Step>,
    pub overall_safety: SafetyLevel,
    pub summary: String,
    /// Only populated on recovery plans.
    #[serde(default)]
    pub educational_summary: String,
    #[serde(default)]
    pub warnings: Vec<Warning>,
}

/// Recorded outcome of attempting (or skipping) one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    pub command: String,
    pub success: bool,
    pub output: String,
    pub error: String,
    pub educational_note: String,
    pub safety_note: String,
}

pub const SKIPPED_OUTPUT: &str = "step skipped by user";
pub const SKIPPED_NOTE: &str = "skipping steps gives you control over the process";
pub const SKIPPED_SAFETY_NOTE: &str = "you chose to skip this operation";
pub const BLOCKED_NOTE: &str = "this teaches us to always check git status before running commands";
pub const BLOCKED_SAFETY_NOTE: &str = "checking prerequisites prevents common git mistakes";

impl StepResult {
    /// Synthetic result for a step the user chose not to run.
    pub fn skipped(command: &str) -> Self {
        Self {
            command: command.to_string(),
            success: true,
            output: SKIPPED_OUTPUT.to_string(),
            error: String::new(),
            educational_note: SKIPPED_NOTE.to_string(),
            safety_note: SKIPPED_SAFETY_NOTE.to_string(),
        }
    }

    /// Failed result for a step stopped by the safety gate.
    pub fn blocked(command: &str, error: String) -> Self {
        Self {
            command: command.to_string(),
            success: false,
            output: String::new(),
            error,
            educational_note: BLOCKED_NOTE.to_string(),
            safety_note: BLOCKED_SAFETY_NOTE.to_string(),
        }
    }
}

/// Structured outcome of one literal git invocation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandResult {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CommandResult {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Point-in-time summary of repository state.
///
/// Never mutated in place: a fresh snapshot replaces the old one.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GitStatusSnapshot {
    /// `None` when HEAD is detached.
    pub current_branch: Option<String>,
    pub staged: BTreeSet<String>,
    pub modified: BTreeSet<String>,
    pub untracked: BTreeSet<String>,
    pub has_remote: bool,
    pub remote_name: Option<String>,
    pub ahead: u32,
    pub behind: u32,
    pub conflicts: BTreeSet<String>,
    /// Count of distinct paths with any kind of change.
    pub uncommitted_changes: usize,
}

impl GitStatusSnapshot {
    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }

    /// True if tracked files have staged or unstaged edits.
    pub fn has_tracked_changes(&self) -> bool {
        !self.staged.is_empty() || !self.modified.is_empty()
    }

    /// Recompute `uncommitted_changes` from the path sets.
    pub fn with_counted_changes(mut self) -> Self {
        let mut all: BTreeSet<&str> = BTreeSet::new();
        for set in [&self.staged, &self.modified, &self.untracked, &self.conflicts] {
            all.extend(set.iter().map(String::as_str));
        }
        self.uncommitted_changes = all.len();
        self
    }
}

/// Failure context handed to a provider when asking for a recovery plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecoveryContext {
    pub task: String,
    pub original_plan: Plan,
    pub failed: StepResult,
    /// Snapshot taken right after the failure.
    pub status: GitStatusSnapshot,
    /// Successful results of the abandoned pass, in order.
    pub completed: Vec<StepResult>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_parses_from_agent_json_with_defaults() {
        let raw = r#"{
            "steps": [
                {"command": "git status", "description": "look", "safety_level": "safe"}
            ],
            "overall_safety": "caution",
            "summary": "inspect"
        }"#;
        let plan: Plan = serde_json::from_str(raw).expect("parse plan");
        assert_eq!(plan.overall_safety, SafetyLevel::Caution);
        assert_eq!(plan.steps[0].safety_level, SafetyLevel::Safe);
        assert!(plan.steps[0].potential_issues.is_empty());
        assert!(plan.warnings.is_empty());
        assert!(plan.educational_summary.is_empty());
    }

    #[test]
    fn safety_levels_are_ordered() {
        assert!(SafetyLevel::Safe < SafetyLevel::Caution);
        assert!(SafetyLevel::Risky < SafetyLevel::Dangerous);
        assert!(SafetyLevel::Risky.is_elevated());
        assert!(!SafetyLevel::Caution.is_elevated());
    }

    #[test]
    fn counted_changes_deduplicates_paths() {
        let status = GitStatusSnapshot {
            staged: ["a.txt".to_string()].into(),
            modified: ["a.txt".to_string(), "b.txt".to_string()].into(),
            untracked: ["c.txt".to_string()].into(),
            ..GitStatusSnapshot::default()
        }
        .with_counted_changes();
        assert_eq!(status.uncommitted_changes, 3);
        assert!(status.has_tracked_changes());
        assert!(!status.has_conflicts());
    }

    #[test]
    fn skipped_result_counts_as_success() {
        let result = StepResult::skipped("git push");
        assert!(result.success);
        assert_eq!(result.output, SKIPPED_OUTPUT);
        assert!(result.error.is_empty());
    }
}
