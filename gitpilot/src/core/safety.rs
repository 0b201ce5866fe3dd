//! Prerequisite checks that block unsafe commands before they run.
//!
//! The gate is a pure function of the command text and a status snapshot. Any
//! violation blocks the step; the engine does not weigh one kind against
//! another.

use serde::Serialize;

use crate::core::classifier::{GitOperation, classify};
use crate::core::types::GitStatusSnapshot;

/// Branches where a force push is refused.
pub const PROTECTED_BRANCHES: &[&str] = &["main", "master"];

/// Category of a safety violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    NotGitCommand,
    NoRemote,
    DetachedHead,
    UnresolvedConflicts,
    BehindRemote,
    ForcePushToProtected,
    DiscardsUncommittedWork,
}

/// One reason a command may not run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub kind: ViolationKind,
    pub message: String,
}

/// Outcome of a gate check. Empty means no objection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SafetyReport {
    pub violations: Vec<Violation>,
}

impl SafetyReport {
    pub fn is_clear(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn has(&self, kind: ViolationKind) -> bool {
        self.violations.iter().any(|violation| violation.kind == kind)
    }

    pub fn messages(&self) -> Vec<&str> {
        self.violations
            .iter()
            .map(|violation| violation.message.as_str())
            .collect()
    }

    /// Error text recorded on the blocked step.
    pub fn describe(&self) -> String {
        format!("prerequisite check failed: {}", self.messages().join("; "))
    }

    fn push(&mut self, kind: ViolationKind, message: impl Into<String>) {
        self.violations.push(Violation {
            kind,
            message: message.into(),
        });
    }
}

/// Check `command` against the repository state in `status`.
pub fn check(command: &str, status: &GitStatusSnapshot) -> SafetyReport {
    check_operation(&classify(command), status)
}

/// Check an already classified command.
pub fn check_operation(operation: &GitOperation, status: &GitStatusSnapshot) -> SafetyReport {
    let mut report = SafetyReport::default();

    if *operation == GitOperation::NotGit {
        report.push(
            ViolationKind::NotGitCommand,
            "only git commands can be executed",
        );
        return report;
    }

    if operation.needs_remote() && !status.has_remote {
        report.push(
            ViolationKind::NoRemote,
            "no remote repository configured (add one with `git remote add`)",
        );
    }

    if status.has_conflicts()
        && (operation.changes_branch_state() || matches!(operation, GitOperation::Push { .. }))
    {
        report.push(
            ViolationKind::UnresolvedConflicts,
            format!(
                "{} unresolved conflict(s) must be resolved first",
                status.conflicts.len()
            ),
        );
    }

    match operation {
        GitOperation::Push {
            force,
            explicit_refspec,
            destinations,
        } => {
            if status.current_branch.is_none() && !explicit_refspec {
                report.push(
                    ViolationKind::DetachedHead,
                    "HEAD is detached; there is no branch to push",
                );
            }
            if !force && status.behind > 0 {
                report.push(
                    ViolationKind::BehindRemote,
                    format!(
                        "branch is {} commit(s) behind its upstream; pull before pushing",
                        status.behind
                    ),
                );
            }
            if *force {
                for branch in force_push_targets(destinations, status) {
                    if PROTECTED_BRANCHES.contains(&branch) {
                        report.push(
                            ViolationKind::ForcePushToProtected,
                            format!("force pushing '{branch}' rewrites shared history"),
                        );
                    }
                }
            }
        }
        GitOperation::Reset { hard: true }
        | GitOperation::Checkout {
            discards_worktree: true,
            ..
        }
        | GitOperation::Restore { worktree: true } => {
            if status.has_tracked_changes() {
                report.push(
                    ViolationKind::DiscardsUncommittedWork,
                    format!(
                        "{} file(s) with uncommitted changes would be lost (stash or commit first)",
                        status.staged.union(&status.modified).count()
                    ),
                );
            }
        }
        GitOperation::Clean { force: true } => {
            if !status.untracked.is_empty() {
                report.push(
                    ViolationKind::DiscardsUncommittedWork,
                    format!(
                        "{} untracked file(s) would be deleted permanently",
                        status.untracked.len()
                    ),
                );
            }
        }
        _ => {}
    }

    report
}

/// Remote branches a force push rewrites: the refspec destinations, or the
/// current branch when none were given. `HEAD` resolves to the current branch.
fn force_push_targets<'a>(
    destinations: &'a [String],
    status: &'a GitStatusSnapshot,
) -> Vec<&'a str> {
    let current = status.current_branch.as_deref();
    if destinations.is_empty() {
        return current.into_iter().collect();
    }
    let mut targets: Vec<&str> = Vec::new();
    for destination in destinations {
        let branch = if destination == "HEAD" {
            current
        } else {
            Some(destination.as_str())
        };
        if let Some(branch) = branch
            && !targets.contains(&branch)
        {
            targets.push(branch);
        }
    }
    targets
}
