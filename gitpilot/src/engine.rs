//! Plan execution with per-step approval, safety gating, and recovery.
//!
//! [`ExecutionEngine::execute_plan`] walks the current plan one step at a
//! time. A failing command asks the plan provider for a recovery plan; if the
//! user accepts it, the walk restarts from the top of the new plan. Restarts
//! are driven by a loop over passes, so any number of recoveries runs in
//! constant stack.
//!
//! Every collaborator is reached through a trait object held in
//! [`EnginePorts`], so the engine runs headless in tests.

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::agents::committer::{CommitMessage, CommitMessageWriter};
use crate::agents::planner::PlanProvider;
use crate::core::classifier::{GitOperation, classify, with_commit_message};
use crate::core::notes::{extend_note, lesson_for, recovery_lesson};
use crate::core::safety::{self, SafetyReport};
use crate::core::state::RunState;
use crate::core::types::{CommandResult, GitStatusSnapshot, Plan, Step, StepResult};
use crate::io::git::{DiffSource, GitRunner};
use crate::recovery::RecoveryCoordinator;

/// User's answer to a step approval prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepDecision {
    Proceed,
    Skip,
    /// Run this command instead of the proposed one.
    Modify(String),
}

/// Human approval points of a run.
pub trait InteractionPort {
    /// `position` is 1-based.
    fn confirm_step(&self, step: &Step, position: usize, total: usize) -> Result<StepDecision>;

    /// Asked after the safety gate blocked a step.
    fn confirm_continue_after_block(&self) -> Result<bool>;

    /// Asked after a recovery plan has been shown.
    fn confirm_recovery_plan(&self) -> Result<bool>;
}

/// Progress reported while a plan runs.
#[derive(Debug, Clone, Copy)]
pub enum ExecutionEvent<'a> {
    PassStarted { steps: usize, recovery: bool },
    StepSkipped { command: &'a str },
    StepBlocked { command: &'a str, report: &'a SafetyReport },
    NothingStaged,
    CommitMessageGenerated(&'a CommitMessage),
    Executing { command: &'a str },
    CommandSucceeded { stdout: &'a str },
    CommandFailed { error: &'a str },
    Replanning,
    RecoveryAccepted,
    Stopped,
}

/// Rendering side of a run. Fire-and-forget: nothing here can fail the run.
pub trait DisplayPort {
    fn show_status(&self, status: &GitStatusSnapshot);

    fn show_plan(&self, plan: &Plan);

    fn show_event(&self, event: ExecutionEvent<'_>);

    fn show_recovery_comparison(&self, original: &Plan, recovery: &Plan, error: &str);

    fn show_results(&self, state: &RunState);
}

/// Collaborators the engine talks to.
#[derive(Clone, Copy)]
pub struct EnginePorts<'a> {
    pub interaction: &'a dyn InteractionPort,
    pub display: &'a dyn DisplayPort,
    pub git: &'a dyn GitRunner,
    pub diffs: &'a dyn DiffSource,
    pub planner: &'a dyn PlanProvider,
    pub committer: &'a dyn CommitMessageWriter,
}

pub struct ExecutionEngine<'a> {
    ports: EnginePorts<'a>,
}

enum PassOutcome {
    Finished { all_success: bool },
    Restart(Plan),
}

enum StepOutcome {
    Next,
    Stop,
    Restart(Plan),
}

impl<'a> ExecutionEngine<'a> {
    pub fn new(ports: EnginePorts<'a>) -> Self {
        Self { ports }
    }

    /// Walk `state.plan` to completion.
    ///
    /// On return `state.operation_complete` is set. An `Err` means a provider
    /// (plan, diff, commit message) or a status capture failed; the run is
    /// abandoned and `state` keeps whatever was recorded up to that point.
    #[instrument(skip_all, fields(task = %state.task))]
    pub fn execute_plan(&self, state: &mut RunState) -> Result<()> {
        state.lessons_learned.clear();
        let mut pass = 0u32;

        let all_success = loop {
            pass += 1;
            state.step_results.clear();
            info!(pass, steps = state.plan.steps.len(), "starting pass");
            self.ports.display.show_event(ExecutionEvent::PassStarted {
                steps: state.plan.steps.len(),
                recovery: pass > 1,
            });

            match self.run_pass(state)? {
                PassOutcome::Finished { all_success } => break all_success,
                PassOutcome::Restart(plan) => {
                    info!(pass, steps = plan.steps.len(), "switching to recovery plan");
                    state.plan = plan;
                }
            }
        };

        state.finish(all_success);
        info!(
            success = state.operation_success,
            results = state.step_results.len(),
            "execution finished"
        );
        Ok(())
    }

    fn run_pass(&self, state: &mut RunState) -> Result<PassOutcome> {
        let total = state.plan.steps.len();
        for index in 0..total {
            match self.run_step(state, index, total)? {
                StepOutcome::Next => {}
                StepOutcome::Stop => {
                    self.ports.display.show_event(ExecutionEvent::Stopped);
                    return Ok(PassOutcome::Finished { all_success: false });
                }
                StepOutcome::Restart(plan) => return Ok(PassOutcome::Restart(plan)),
            }
        }
        Ok(PassOutcome::Finished { all_success: true })
    }

    #[instrument(skip_all, fields(position = index + 1, total))]
    fn run_step(&self, state: &mut RunState, index: usize, total: usize) -> Result<StepOutcome> {
        let decision = self
            .ports
            .interaction
            .confirm_step(&state.plan.steps[index], index + 1, total)?;
        match decision {
            StepDecision::Skip => {
                let command = &state.plan.steps[index].command;
                debug!(command = %command, "step skipped");
                self.ports
                    .display
                    .show_event(ExecutionEvent::StepSkipped { command });
                state.step_results.push(StepResult::skipped(command));
                return Ok(StepOutcome::Next);
            }
            StepDecision::Modify(command) => {
                debug!(from = %state.plan.steps[index].command, to = %command, "step modified");
                state.plan.steps[index].command = command;
            }
            StepDecision::Proceed => {}
        }

        let mut command = state.plan.steps[index].command.clone();
        let report = safety::check(&command, &state.git_status);
        if !report.is_clear() {
            warn!(command = %command, violations = report.violations.len(), "step blocked");
            self.ports.display.show_event(ExecutionEvent::StepBlocked {
                command: &command,
                report: &report,
            });
            state
                .step_results
                .push(StepResult::blocked(&command, report.describe()));
            if self.ports.interaction.confirm_continue_after_block()? {
                return Ok(StepOutcome::Next);
            }
            return Ok(StepOutcome::Stop);
        }

        let mut operation = classify(&command);
        if operation == (GitOperation::Commit { has_message: false }) {
            let Some(diff) = self.ports.diffs.staged_diff().context("read staged diff")? else {
                debug!("nothing staged, skipping commit");
                self.ports.display.show_event(ExecutionEvent::NothingStaged);
                return Ok(StepOutcome::Next);
            };
            let message = self
                .ports
                .committer
                .generate(&diff)
                .context("generate commit message")?;
            self.ports
                .display
                .show_event(ExecutionEvent::CommitMessageGenerated(&message));
            command = with_commit_message(&command, &message.message);
            operation = classify(&command);
            state.plan.steps[index].command = command.clone();
        }

        self.ports
            .display
            .show_event(ExecutionEvent::Executing { command: &command });
        let result = self.ports.git.run(&command);

        if result.success {
            self.ports
                .display
                .show_event(ExecutionEvent::CommandSucceeded {
                    stdout: &result.stdout,
                });
            let step = &mut state.plan.steps[index];
            if let Some(lesson) = lesson_for(&operation) {
                step.educational_note = extend_note(&step.educational_note, lesson.note_suffix);
                state.lessons_learned.push(lesson.lesson.to_string());
            }
            state.step_results.push(StepResult {
                command,
                success: true,
                output: result.stdout,
                error: result.stderr,
                educational_note: step.educational_note.clone(),
                safety_note: String::new(),
            });
            return Ok(StepOutcome::Next);
        }

        let error = failure_text(&result);
        warn!(command = %command, error = %error, "command failed");
        self.ports
            .display
            .show_event(ExecutionEvent::CommandFailed { error: &error });
        let failed = StepResult {
            command,
            success: false,
            output: result.stdout,
            error,
            educational_note: state.plan.steps[index].educational_note.clone(),
            safety_note: String::new(),
        };
        state.step_results.push(failed.clone());
        self.recover(state, &failed)
    }

    fn recover(&self, state: &mut RunState, failed: &StepResult) -> Result<StepOutcome> {
        self.ports.display.show_event(ExecutionEvent::Replanning);
        state.git_status = self
            .ports
            .git
            .status()
            .context("capture status after failure")?;
        let completed = state.successful_results();
        state.recovery_needed = true;
        state.lessons_learned.push(recovery_lesson(&failed.error));

        let recovery = RecoveryCoordinator::new(self.ports.planner).build_recovery_plan(
            state,
            failed,
            &state.git_status,
            &completed,
        )?;
        self.ports
            .display
            .show_recovery_comparison(&state.plan, &recovery, &failed.error);

        if self.ports.interaction.confirm_recovery_plan()? {
            self.ports.display.show_event(ExecutionEvent::RecoveryAccepted);
            return Ok(StepOutcome::Restart(recovery));
        }
        info!("recovery plan declined");
        Ok(StepOutcome::Stop)
    }
}

/// Error text recorded for a failed command; never empty.
fn failure_text(result: &CommandResult) -> String {
    let stderr = result.stderr.trim();
    if !stderr.is_empty() {
        return stderr.to_string();
    }
    let stdout = result.stdout.trim();
    if !stdout.is_empty() {
        return stdout.to_string();
    }
    "command exited with a non-zero status".to_string()
}
