//! One task from request to results.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, instrument};

use crate::core::state::RunState;
use crate::core::types::Plan;
use crate::engine::{EnginePorts, ExecutionEngine};

/// Whole-plan approval, asked once before any step runs.
pub trait PlanApproval {
    fn confirm_plan(&self, plan: &Plan) -> Result<bool>;

    /// Shown after the plan was declined.
    fn show_alternatives(&self, plan: &Plan);
}

#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Skip the whole-plan prompt. Steps still need approval.
    pub auto_approve_plan: bool,
    /// Write the final run state here as pretty JSON.
    pub report_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed { success: bool },
    PlanDeclined,
}

pub struct Session<'a> {
    ports: EnginePorts<'a>,
    approval: &'a dyn PlanApproval,
}

impl<'a> Session<'a> {
    pub fn new(ports: EnginePorts<'a>, approval: &'a dyn PlanApproval) -> Self {
        Self { ports, approval }
    }

    #[instrument(skip_all, fields(task = %task))]
    pub fn run_task(&self, task: &str, options: &SessionOptions) -> Result<TaskOutcome> {
        let status = self.ports.git.status().context("capture git status")?;
        self.ports.display.show_status(&status);

        let plan = self
            .ports
            .planner
            .generate_plan(task, &status)
            .context("generate plan")?;
        let mut state = RunState::new(task, plan, status);
        self.ports.display.show_plan(&state.plan);

        if !options.auto_approve_plan && !self.approval.confirm_plan(&state.plan)? {
            info!("plan declined");
            self.approval.show_alternatives(&state.plan);
            return Ok(TaskOutcome::PlanDeclined);
        }

        ExecutionEngine::new(self.ports).execute_plan(&mut state)?;
        self.ports.display.show_results(&state);

        if let Some(path) = &options.report_path {
            write_report(path, &state)?;
            info!(path = %path.display(), "report written");
        }
        Ok(TaskOutcome::Completed {
            success: state.operation_success,
        })
    }
}

/// Serialize `state` as pretty JSON.
pub fn write_report(path: &Path, state: &RunState) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create report dir {}", parent.display()))?;
    }
    let mut buf = serde_json::to_string_pretty(state).context("serialize report")?;
    buf.push('\n');
    fs::write(path, buf).with_context(|| format!("write report {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        RecordingDisplay, ScriptedCommitWriter, ScriptedGit, ScriptedInteraction,
        ScriptedPlanner, plan_of,
    };

    struct Fixture {
        interaction: ScriptedInteraction,
        display: RecordingDisplay,
        git: ScriptedGit,
        planner: ScriptedPlanner,
        committer: ScriptedCommitWriter,
    }

    impl Fixture {
        fn new(plan: Plan) -> Self {
            Self {
                interaction: ScriptedInteraction::new(),
                display: RecordingDisplay::default(),
                git: ScriptedGit::new(),
                planner: ScriptedPlanner::new(vec![plan], vec![]),
                committer: ScriptedCommitWriter::new(vec![]),
            }
        }

        fn run(&self, options: &SessionOptions) -> Result<TaskOutcome> {
            let ports = EnginePorts {
                interaction: &self.interaction,
                display: &self.display,
                git: &self.git,
                diffs: &self.git,
                planner: &self.planner,
                committer: &self.committer,
            };
            Session::new(ports, &self.interaction).run_task("tidy up", options)
        }
    }

    #[test]
    fn declined_plan_runs_nothing_and_shows_alternatives() {
        let fixture = Fixture::new(plan_of(&["git status"]));
        fixture.interaction.push_plan_answers(vec![false]);

        let outcome = fixture.run(&SessionOptions::default()).expect("run");

        assert_eq!(outcome, TaskOutcome::PlanDeclined);
        assert!(fixture.git.ran().is_empty());
        assert_eq!(fixture.interaction.alternatives_shown(), 1);
        assert_eq!(fixture.display.plans_shown(), 1);
        assert_eq!(fixture.display.results_shown(), 0);
    }

    #[test]
    fn accepted_plan_executes_and_writes_report() {
        let temp = tempfile::tempdir().expect("tempdir");
        let report = temp.path().join("reports/run.json");
        let fixture = Fixture::new(plan_of(&["git status"]));

        let outcome = fixture
            .run(&SessionOptions {
                auto_approve_plan: false,
                report_path: Some(report.clone()),
            })
            .expect("run");

        assert_eq!(outcome, TaskOutcome::Completed { success: true });
        assert_eq!(fixture.planner.tasks(), vec!["tidy up"]);
        assert_eq!(fixture.display.results_shown(), 1);
        let written: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&report).expect("read report"))
                .expect("parse report");
        assert_eq!(written["task"], "tidy up");
        assert_eq!(written["operation_success"], true);
        assert_eq!(written["step_results"][0]["command"], "git status");
    }

    #[test]
    fn auto_approve_skips_plan_prompt() {
        let fixture = Fixture::new(plan_of(&["git status"]));
        fixture.interaction.push_plan_answers(vec![false]);

        let outcome = fixture
            .run(&SessionOptions {
                auto_approve_plan: true,
                report_path: None,
            })
            .expect("run");

        assert_eq!(outcome, TaskOutcome::Completed { success: true });
        assert_eq!(fixture.git.ran(), vec!["git status"]);
    }

    #[test]
    fn planner_failure_propagates() {
        let mut fixture = Fixture::new(plan_of(&[]));
        fixture.planner = ScriptedPlanner::new(vec![], vec![]);

        let err = fixture.run(&SessionOptions::default()).expect_err("no plan");
        assert!(format!("{err:#}").contains("generate plan"));
    }
}
