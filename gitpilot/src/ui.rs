//! Terminal implementation of the interaction and display ports.
//!
//! Reads answers line by line from any `BufRead` and renders to any `Write`,
//! so tests drive it with in-memory buffers. Closed input counts as "no".

use std::cell::RefCell;
use std::fmt::Display;
use std::io::{BufRead, Write};

use anyhow::{Context, Result};
use colored::{ColoredString, Colorize};
use tracing::debug;

use crate::core::state::RunState;
use crate::core::types::{GitStatusSnapshot, Plan, SafetyLevel, Step};
use crate::engine::{DisplayPort, ExecutionEvent, InteractionPort, StepDecision};
use crate::io::config::DisplayConfig;
use crate::session::PlanApproval;

const EXAMPLE_TASKS: &[&str] = &[
    "undo my last commit but keep changes",
    "safely merge main into my branch",
    "clean up my commit history",
    "help me resolve merge conflicts",
    "push my changes without breaking things",
    "what would happen if i reset --hard?",
];

pub struct TerminalUi<R, W> {
    input: RefCell<R>,
    output: RefCell<W>,
    settings: DisplayConfig,
}

impl<R: BufRead, W: Write> TerminalUi<R, W> {
    pub fn new(input: R, output: W, settings: DisplayConfig) -> Self {
        Self {
            input: RefCell::new(input),
            output: RefCell::new(output),
            settings,
        }
    }

    pub fn into_output(self) -> W {
        self.output.into_inner()
    }

    pub fn show_welcome(&self) {
        self.emit("gitpilot: git with a co-pilot".bold());
        self.emit(format!("{} press {} for help", "1.".dimmed(), "h".cyan()));
        self.emit(format!("{} press {} to quit", "2.".dimmed(), "q".cyan()));
        self.emit("");
    }

    pub fn show_help(&self) {
        self.section("help");
        self.emit(format!("{}  help", "h".cyan()));
        self.emit(format!("{}  quit", "q".cyan()));
        self.emit("");
        self.emit("example git tasks:".bold());
        for task in EXAMPLE_TASKS {
            self.emit(format!("  {task}"));
        }
        self.emit("");
    }

    /// Next task from the interactive loop; `None` once input is closed.
    pub fn read_task(&self) -> Result<Option<String>> {
        self.ask(&format!("{} git task or question?", ">".cyan()))
    }

    pub fn confirm_exit(&self) -> Result<bool> {
        self.confirm("quit gitpilot?")
    }

    fn confirm(&self, prompt: &str) -> Result<bool> {
        loop {
            let Some(answer) = self.ask(&format!("{prompt} [y/n]"))? else {
                return Ok(false);
            };
            match answer.to_lowercase().as_str() {
                "y" | "yes" => return Ok(true),
                "n" | "no" => return Ok(false),
                _ => self.emit("please answer y or n".dimmed()),
            }
        }
    }

    fn ask(&self, prompt: &str) -> Result<Option<String>> {
        {
            let mut out = self.output.borrow_mut();
            write!(out, "{prompt} ").context("write prompt")?;
            out.flush().context("flush prompt")?;
        }
        let mut line = String::new();
        let read = self
            .input
            .borrow_mut()
            .read_line(&mut line)
            .context("read answer")?;
        if read == 0 {
            debug!("input closed");
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    fn emit(&self, text: impl Display) {
        let mut out = self.output.borrow_mut();
        if let Err(err) = writeln!(out, "{text}").and_then(|()| out.flush()) {
            debug!(error = %err, "terminal write failed");
        }
    }

    fn section(&self, title: &str) {
        self.emit("");
        self.emit(format!("── {title} ──").cyan().bold());
    }

    fn render_plan(&self, plan: &Plan) {
        self.section("plan");
        self.emit(paint_level(
            plan.overall_safety,
            &format!("safety: {}", plan.overall_safety),
        ));
        if !plan.summary.trim().is_empty() {
            self.emit(plan.summary.trim().dimmed());
        }
        for (index, step) in plan.steps.iter().enumerate() {
            let icon = match step.safety_level {
                SafetyLevel::Safe => "+",
                SafetyLevel::Caution | SafetyLevel::Risky => "!",
                SafetyLevel::Dangerous => "x",
            };
            self.emit(format!(
                "{} {}",
                paint_level(step.safety_level, &format!("{icon} {}.", index + 1)),
                step.command.bold()
            ));
            self.emit(format!("  {}", step.description));
            if step.safety_level.is_elevated()
                && let Some(issue) = step.potential_issues.first()
            {
                self.emit(format!("  ! {issue}").yellow());
            }
        }
        if let Some(warning) = plan.warnings.first() {
            self.emit("warnings:".yellow());
            self.emit(format!("! {}", warning.message).yellow());
            if let Some(alternative) = warning.safer_alternatives.first() {
                self.emit(format!("  > {alternative}"));
            }
        }
        self.emit("");
    }
}

fn paint_level(level: SafetyLevel, text: &str) -> ColoredString {
    match level {
        SafetyLevel::Safe => text.green(),
        SafetyLevel::Caution => text.yellow(),
        SafetyLevel::Risky => text.magenta(),
        SafetyLevel::Dangerous => text.red().bold(),
    }
}

/// First `limit` characters, with an ellipsis when cut.
fn preview(text: &str, limit: usize) -> String {
    let text = text.trim_end();
    match text.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

fn indented(text: &str) -> String {
    text.trim_end()
        .lines()
        .map(|line| format!("    {line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

impl<R: BufRead, W: Write> PlanApproval for TerminalUi<R, W> {
    /// Ask whether to run `plan`, phrased by its overall safety.
    fn confirm_plan(&self, plan: &Plan) -> Result<bool> {
        if plan.overall_safety.is_elevated() && !plan.warnings.is_empty() {
            self.emit("> tip: you can type 'n' to see safer alternatives".yellow());
        }
        let prompt = match plan.overall_safety {
            SafetyLevel::Dangerous => "this operation is dangerous! proceed anyway?".red().bold(),
            SafetyLevel::Risky => "this operation is risky. continue?".magenta(),
            SafetyLevel::Caution => "proceed with caution?".yellow(),
            SafetyLevel::Safe => "execute this plan?".normal(),
        };
        self.confirm(&prompt.to_string())
    }

    fn show_alternatives(&self, plan: &Plan) {
        self.section("safer alternatives");
        if plan.warnings.is_empty() {
            self.emit("no safer alternatives suggested".dimmed());
            return;
        }
        for warning in &plan.warnings {
            self.emit(format!("! {}", warning.message).yellow());
            for alternative in &warning.safer_alternatives {
                self.emit(format!("  > {alternative}"));
            }
        }
        self.emit("");
    }
}

impl<R: BufRead, W: Write> InteractionPort for TerminalUi<R, W> {
    fn confirm_step(&self, step: &Step, position: usize, total: usize) -> Result<StepDecision> {
        self.emit("");
        self.emit(format!("step {position}/{total}").cyan());
        self.emit(step.command.bold());
        self.emit(step.description.as_str());
        if step.safety_level.is_elevated() {
            self.emit(paint_level(
                step.safety_level,
                &format!("! {} operation", step.safety_level),
            ));
        }

        loop {
            let Some(answer) = self.ask("execute this command? [y/n/modify]")? else {
                return Ok(StepDecision::Skip);
            };
            match answer.to_lowercase().as_str() {
                "y" | "yes" => return Ok(StepDecision::Proceed),
                "n" | "no" => return Ok(StepDecision::Skip),
                "m" | "modify" => {
                    self.emit(format!("current: {}", step.command).dimmed());
                    let edited = self
                        .ask(&format!("enter new command [{}]:", step.command))?
                        .filter(|command| !command.is_empty());
                    let Some(command) = edited.filter(|command| *command != step.command) else {
                        return Ok(StepDecision::Proceed);
                    };
                    self.emit(format!("+ updated to: {command}").green());
                    return Ok(StepDecision::Modify(command));
                }
                _ => self.emit("please answer y, n, or modify".dimmed()),
            }
        }
    }

    fn confirm_continue_after_block(&self) -> Result<bool> {
        self.confirm("continue with remaining steps?")
    }

    fn confirm_recovery_plan(&self) -> Result<bool> {
        self.confirm("proceed with recovery plan?")
    }
}

impl<R: BufRead, W: Write> DisplayPort for TerminalUi<R, W> {
    fn show_status(&self, status: &GitStatusSnapshot) {
        self.section("status");
        let mut rows: Vec<(&str, String)> = vec![
            (
                "branch",
                status
                    .current_branch
                    .clone()
                    .unwrap_or_else(|| "(detached)".to_string()),
            ),
            ("staged", status.staged.len().to_string()),
            ("modified", status.modified.len().to_string()),
            ("untracked", status.untracked.len().to_string()),
        ];
        if status.has_remote {
            let mut sync = String::new();
            if status.ahead > 0 {
                sync.push_str(&format!("↑{}", status.ahead));
            }
            if status.behind > 0 {
                sync.push_str(&format!("↓{}", status.behind));
            }
            if sync.is_empty() {
                sync.push_str("synced");
            }
            let name = status.remote_name.as_deref().unwrap_or("remote");
            rows.push(("remote", format!("{name} ({sync})")));
        }
        if status.uncommitted_changes > 0 {
            rows.push((
                "note",
                format!("{} uncommitted changes", status.uncommitted_changes)
                    .yellow()
                    .to_string(),
            ));
        }
        if status.has_conflicts() {
            rows.push(("conflicts", "detected".red().to_string()));
        }
        for (key, value) in rows {
            self.emit(format!("{:>10}  {value}", key.dimmed()));
        }
    }

    fn show_plan(&self, plan: &Plan) {
        self.render_plan(plan);
    }

    fn show_event(&self, event: ExecutionEvent<'_>) {
        match event {
            ExecutionEvent::PassStarted { steps, recovery } => {
                let what = if recovery { "recovery plan: " } else { "" };
                self.emit(format!("\nexecuting {what}{steps} steps with approval").cyan());
            }
            ExecutionEvent::StepSkipped { .. } => self.emit("> step skipped".yellow()),
            ExecutionEvent::StepBlocked { report, .. } => {
                self.emit(format!("x step blocked for safety: {}", report.describe()).red());
            }
            ExecutionEvent::NothingStaged => self.emit("> nothing staged to commit".yellow()),
            ExecutionEvent::CommitMessageGenerated(message) => {
                self.emit(format!("> generated commit message: {}", message.message));
                if !message.explanation.trim().is_empty() {
                    self.emit(format!("  {}", message.explanation.trim()).dimmed());
                }
            }
            ExecutionEvent::Executing { command } => {
                self.emit(format!("> executing: {command}"));
            }
            ExecutionEvent::CommandSucceeded { stdout } => {
                self.emit("+ command completed".green());
                if !stdout.trim().is_empty() {
                    self.emit(format!(
                        "  {}",
                        preview(stdout, self.settings.output_preview_chars)
                    ));
                }
            }
            ExecutionEvent::CommandFailed { error } => {
                self.emit(format!("x command failed: {error}").red());
            }
            ExecutionEvent::Replanning => {
                self.emit("analyzing failure and replanning...".dimmed());
            }
            ExecutionEvent::RecoveryAccepted => self.emit("switching to recovery plan...".cyan()),
            ExecutionEvent::Stopped => self.emit("execution stopped".yellow()),
        }
    }

    fn show_recovery_comparison(&self, original: &Plan, recovery: &Plan, error: &str) {
        self.section("recovery");
        self.emit(format!("failure analysis: {}", error.trim()).red());
        self.emit("");
        self.emit(format!("original: {}", original.summary).yellow());
        self.emit(format!("recovery: {}", recovery.summary).green());
        if !recovery.educational_summary.trim().is_empty() {
            self.emit(format!("why changed: {}", recovery.educational_summary.trim()).cyan());
        }
        self.render_plan(recovery);
    }

    fn show_results(&self, state: &RunState) {
        self.section("results");
        let headline = format!(
            "{} {}",
            if state.operation_success {
                "+"
            } else if state.recovery_needed {
                "!"
            } else {
                "x"
            },
            state.final_message
        );
        self.emit(if state.operation_success {
            headline.green()
        } else if state.recovery_needed {
            headline.yellow()
        } else {
            headline.red()
        });
        self.emit("");

        for result in &state.step_results {
            let icon = if result.success { "+".green() } else { "x".red() };
            self.emit(format!("{icon} {}", result.command.bold()));
            if result.success && !result.output.trim().is_empty() {
                self.emit(indented(&result.output));
            } else if !result.success && !result.error.trim().is_empty() {
                self.emit(indented(&result.error).red());
            }
        }

        let lessons = state.unique_lessons(self.settings.lessons_limit);
        if !lessons.is_empty() {
            self.emit("");
            self.emit("learned:".cyan());
            for lesson in lessons {
                self.emit(format!("> {lesson}"));
            }
        }
        self.emit("");
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::core::types::{StepResult, Warning};
    use crate::test_support::{plan_of, step};

    fn ui(input: &str) -> TerminalUi<Cursor<Vec<u8>>, Vec<u8>> {
        colored::control::set_override(false);
        TerminalUi::new(
            Cursor::new(input.as_bytes().to_vec()),
            Vec::new(),
            DisplayConfig::default(),
        )
    }

    fn output(ui: TerminalUi<Cursor<Vec<u8>>, Vec<u8>>) -> String {
        String::from_utf8(ui.into_output()).expect("utf8")
    }

    #[test]
    fn step_prompt_accepts_yes_no_and_reasks() {
        let t = ui("maybe\ny\nno\n");
        let s = step("git status");
        assert_eq!(t.confirm_step(&s, 1, 2).expect("answer"), StepDecision::Proceed);
        assert_eq!(t.confirm_step(&s, 2, 2).expect("answer"), StepDecision::Skip);
        let out = output(t);
        assert!(out.contains("step 1/2"));
        assert!(out.contains("please answer y, n, or modify"));
    }

    #[test]
    fn modify_uses_current_command_as_default() {
        let t = ui("modify\ngit log --oneline\nm\n\n");
        let s = step("git log");
        assert_eq!(
            t.confirm_step(&s, 1, 1).expect("answer"),
            StepDecision::Modify("git log --oneline".to_string())
        );
        assert_eq!(t.confirm_step(&s, 1, 1).expect("answer"), StepDecision::Proceed);
        let out = output(t);
        assert!(out.contains("enter new command [git log]:"));
        assert!(out.contains("+ updated to: git log --oneline"));
    }

    #[test]
    fn closed_input_declines() {
        let t = ui("");
        assert_eq!(
            t.confirm_step(&step("git push"), 1, 1).expect("answer"),
            StepDecision::Skip
        );
        assert!(!t.confirm_recovery_plan().expect("answer"));
        assert!(!t.confirm_continue_after_block().expect("answer"));
    }

    #[test]
    fn risky_step_is_flagged() {
        let t = ui("n\n");
        let mut s = step("git reset --hard HEAD~1");
        s.safety_level = SafetyLevel::Dangerous;
        t.confirm_step(&s, 1, 1).expect("answer");
        assert!(output(t).contains("! dangerous operation"));
    }

    #[test]
    fn plan_prompt_matches_safety_and_offers_alternatives_tip() {
        let t = ui("y\n");
        let mut plan = plan_of(&["git push --force"]);
        plan.overall_safety = SafetyLevel::Dangerous;
        plan.warnings.push(Warning {
            message: "rewrites remote history".to_string(),
            safer_alternatives: vec!["git push --force-with-lease".to_string()],
        });
        assert!(t.confirm_plan(&plan).expect("answer"));
        let out = output(t);
        assert!(out.contains("type 'n' to see safer alternatives"));
        assert!(out.contains("this operation is dangerous! proceed anyway? [y/n]"));
    }

    #[test]
    fn plan_rendering_shows_icons_issues_and_first_warning() {
        let t = ui("");
        let mut plan = plan_of(&["git fetch", "git reset --hard origin/main"]);
        plan.steps[1].safety_level = SafetyLevel::Dangerous;
        plan.steps[1].potential_issues = vec!["local edits are lost".to_string(), "second".to_string()];
        plan.warnings = vec![
            Warning {
                message: "first warning".to_string(),
                safer_alternatives: vec!["git stash".to_string(), "other".to_string()],
            },
            Warning {
                message: "second warning".to_string(),
                safer_alternatives: vec![],
            },
        ];
        t.show_plan(&plan);
        let out = output(t);
        assert!(out.contains("+ 1. git fetch"));
        assert!(out.contains("x 2. git reset --hard origin/main"));
        assert!(out.contains("  ! local edits are lost"));
        assert!(!out.contains("second\n"));
        assert!(out.contains("! first warning"));
        assert!(out.contains("  > git stash"));
        assert!(!out.contains("second warning"));
    }

    #[test]
    fn results_show_outcome_and_deduplicated_lessons() {
        let t = ui("");
        let mut state = RunState::new("t", plan_of(&[]), GitStatusSnapshot::default());
        state.step_results = vec![
            StepResult::skipped("git status"),
            StepResult {
                command: "git push".to_string(),
                success: false,
                output: String::new(),
                error: "rejected".to_string(),
                educational_note: String::new(),
                safety_note: String::new(),
            },
        ];
        state.lessons_learned = ["a", "b", "a", "c", "d"].map(String::from).to_vec();
        state.recovery_needed = true;
        state.finish(false);

        t.show_results(&state);
        let out = output(t);
        assert!(out.contains("! execution completed with some failures"));
        assert!(out.contains("+ git status\n    step skipped by user"));
        assert!(out.contains("x git push\n    rejected"));
        assert!(out.contains("> a\n> b\n> c\n"));
        assert!(!out.contains("> d"));
    }

    #[test]
    fn status_panel_summarizes_snapshot() {
        let t = ui("");
        let status = GitStatusSnapshot {
            current_branch: Some("main".to_string()),
            untracked: ["x".to_string()].into(),
            has_remote: true,
            remote_name: Some("origin".to_string()),
            ahead: 1,
            ..GitStatusSnapshot::default()
        }
        .with_counted_changes();
        t.show_status(&status);
        let out = output(t);
        assert!(out.contains("branch  main"));
        assert!(out.contains("remote  origin (↑1)"));
        assert!(out.contains("note  1 uncommitted changes"));
        assert!(!out.contains("conflicts"));
    }

    #[test]
    fn success_preview_is_truncated() {
        let t = ui("");
        let long = "a".repeat(150);
        t.show_event(ExecutionEvent::CommandSucceeded { stdout: &long });
        let out = output(t);
        assert!(out.contains(&format!("  {}...", "a".repeat(100))));
    }

    #[test]
    fn recovery_comparison_lists_both_summaries() {
        let t = ui("");
        let original = plan_of(&["git push"]);
        let mut recovery = plan_of(&["git pull --rebase", "git push"]);
        recovery.summary = "pull first".to_string();
        recovery.educational_summary = "the remote moved ahead".to_string();
        t.show_recovery_comparison(&original, &recovery, "rejected\n");
        let out = output(t);
        assert!(out.contains("failure analysis: rejected"));
        assert!(out.contains("original: 1 step plan"));
        assert!(out.contains("recovery: pull first"));
        assert!(out.contains("why changed: the remote moved ahead"));
        assert!(out.contains("+ 2. git push"));
    }
}
