//! Test-only builders, scripted collaborators, and a throwaway git repo.
//!
//! Every scripted fake records what it was asked so tests can assert on the
//! conversation, not just the outcome.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::rc::Rc;

use anyhow::{Context, Result, anyhow};
use tempfile::TempDir;

use crate::agents::AgentClient;
use crate::agents::committer::{CommitMessage, CommitMessageWriter};
use crate::agents::planner::PlanProvider;
use crate::core::state::RunState;
use crate::core::types::{
    CommandResult, GitStatusSnapshot, Plan, RecoveryContext, SafetyLevel, Step, StepResult,
};
use crate::engine::{DisplayPort, ExecutionEvent, InteractionPort, StepDecision};
use crate::io::agent::{Agent, AgentRequest, AgentWorkspace};
use crate::io::config::{GitConfig, ProviderConfig};
use crate::io::git::{DiffSource, Git, GitRunner};
use crate::session::PlanApproval;

/// Deterministic safe step for `command`.
pub fn step(command: &str) -> Step {
    Step {
        command: command.to_string(),
        description: format!("run {command}"),
        safety_level: SafetyLevel::Safe,
        potential_issues: Vec::new(),
        educational_note: format!("{command} explained"),
    }
}

/// Safe plan with one [`step`] per command.
pub fn plan_of(commands: &[&str]) -> Plan {
    Plan {
        steps: commands.iter().map(|command| step(command)).collect(),
        overall_safety: SafetyLevel::Safe,
        summary: format!("{} step plan", commands.len()),
        educational_summary: String::new(),
        warnings: Vec::new(),
    }
}

/// [`plan_of`] serialized the way an agent would answer.
pub fn plan_json(commands: &[&str]) -> String {
    serde_json::to_string(&plan_of(commands)).expect("serialize plan")
}

pub fn failed_result(command: &str, error: &str) -> StepResult {
    StepResult {
        command: command.to_string(),
        success: false,
        output: String::new(),
        error: error.to_string(),
        educational_note: String::new(),
        safety_note: String::new(),
    }
}

/// Clean snapshot on `branch` with no remote.
pub fn status_on(branch: &str) -> GitStatusSnapshot {
    GitStatusSnapshot {
        current_branch: Some(branch.to_string()),
        ..GitStatusSnapshot::default()
    }
}

/// In-memory [`GitRunner`] and [`DiffSource`].
///
/// Commands succeed with empty output unless a failure was queued for that
/// exact command line with [`ScriptedGit::fail`].
#[derive(Default)]
pub struct ScriptedGit {
    failures: RefCell<HashMap<String, VecDeque<String>>>,
    statuses: RefCell<VecDeque<GitStatusSnapshot>>,
    staged_diff: RefCell<Option<String>>,
    diff_error: RefCell<Option<String>>,
    ran: RefCell<Vec<String>>,
}

impl ScriptedGit {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next run of `command` fails with `stderr`.
    pub fn fail(&self, command: &str, stderr: &str) {
        self.failures
            .borrow_mut()
            .entry(command.to_string())
            .or_default()
            .push_back(stderr.to_string());
    }

    /// Returned by the next `status()` call. Once drained, `status()` yields a
    /// default snapshot.
    pub fn queue_status(&self, status: GitStatusSnapshot) {
        self.statuses.borrow_mut().push_back(status);
    }

    pub fn set_staged_diff(&self, diff: &str) {
        *self.staged_diff.borrow_mut() = Some(diff.to_string());
    }

    /// Every later `staged_diff()` call fails with `message`.
    pub fn fail_staged_diff(&self, message: &str) {
        *self.diff_error.borrow_mut() = Some(message.to_string());
    }

    pub fn ran(&self) -> Vec<String> {
        self.ran.borrow().clone()
    }
}

impl GitRunner for ScriptedGit {
    fn run(&self, command: &str) -> CommandResult {
        self.ran.borrow_mut().push(command.to_string());
        let failure = self
            .failures
            .borrow_mut()
            .get_mut(command)
            .and_then(VecDeque::pop_front);
        match failure {
            Some(stderr) => CommandResult::failed(stderr),
            None => CommandResult::ok(""),
        }
    }

    fn status(&self) -> Result<GitStatusSnapshot> {
        Ok(self.statuses.borrow_mut().pop_front().unwrap_or_default())
    }
}

impl DiffSource for ScriptedGit {
    fn staged_diff(&self) -> Result<Option<String>> {
        if let Some(message) = self.diff_error.borrow().as_deref() {
            return Err(anyhow!("{message}"));
        }
        Ok(self.staged_diff.borrow().clone())
    }
}

/// [`InteractionPort`] answering from queues; proceeds/accepts once drained.
#[derive(Default)]
pub struct ScriptedInteraction {
    decisions: RefCell<VecDeque<StepDecision>>,
    block_answers: RefCell<VecDeque<bool>>,
    recovery_answers: RefCell<VecDeque<bool>>,
    plan_answers: RefCell<VecDeque<bool>>,
    confirmed: RefCell<Vec<(usize, usize)>>,
    alternatives_shown: RefCell<usize>,
}

impl ScriptedInteraction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_decisions(&self, decisions: Vec<StepDecision>) {
        self.decisions.borrow_mut().extend(decisions);
    }

    pub fn push_block_answers(&self, answers: Vec<bool>) {
        self.block_answers.borrow_mut().extend(answers);
    }

    pub fn push_recovery_answers(&self, answers: Vec<bool>) {
        self.recovery_answers.borrow_mut().extend(answers);
    }

    pub fn push_plan_answers(&self, answers: Vec<bool>) {
        self.plan_answers.borrow_mut().extend(answers);
    }

    pub fn alternatives_shown(&self) -> usize {
        *self.alternatives_shown.borrow()
    }

    /// `(position, total)` of every step approval asked.
    pub fn confirmed_steps(&self) -> Vec<(usize, usize)> {
        self.confirmed.borrow().clone()
    }
}

impl InteractionPort for ScriptedInteraction {
    fn confirm_step(&self, _step: &Step, position: usize, total: usize) -> Result<StepDecision> {
        self.confirmed.borrow_mut().push((position, total));
        Ok(self
            .decisions
            .borrow_mut()
            .pop_front()
            .unwrap_or(StepDecision::Proceed))
    }

    fn confirm_continue_after_block(&self) -> Result<bool> {
        Ok(self.block_answers.borrow_mut().pop_front().unwrap_or(true))
    }

    fn confirm_recovery_plan(&self) -> Result<bool> {
        Ok(self.recovery_answers.borrow_mut().pop_front().unwrap_or(true))
    }
}

impl PlanApproval for ScriptedInteraction {
    fn confirm_plan(&self, _plan: &Plan) -> Result<bool> {
        Ok(self.plan_answers.borrow_mut().pop_front().unwrap_or(true))
    }

    fn show_alternatives(&self, _plan: &Plan) {
        *self.alternatives_shown.borrow_mut() += 1;
    }
}

/// [`DisplayPort`] that records events as short strings.
#[derive(Default)]
pub struct RecordingDisplay {
    events: RefCell<Vec<String>>,
    comparisons: RefCell<usize>,
    plans_shown: RefCell<usize>,
    results_shown: RefCell<usize>,
}

impl RecordingDisplay {
    pub fn events(&self) -> Vec<String> {
        self.events.borrow().clone()
    }

    pub fn comparisons(&self) -> usize {
        *self.comparisons.borrow()
    }

    pub fn plans_shown(&self) -> usize {
        *self.plans_shown.borrow()
    }

    pub fn results_shown(&self) -> usize {
        *self.results_shown.borrow()
    }
}

impl DisplayPort for RecordingDisplay {
    fn show_status(&self, _status: &GitStatusSnapshot) {}

    fn show_plan(&self, _plan: &Plan) {
        *self.plans_shown.borrow_mut() += 1;
    }

    fn show_event(&self, event: ExecutionEvent<'_>) {
        let line = match event {
            ExecutionEvent::PassStarted { steps, recovery } => {
                let kind = if recovery { "recovery pass" } else { "pass" };
                format!("{kind} {steps} steps")
            }
            ExecutionEvent::StepSkipped { command } => format!("skipped {command}"),
            ExecutionEvent::StepBlocked { command, .. } => format!("blocked {command}"),
            ExecutionEvent::NothingStaged => "nothing staged".to_string(),
            ExecutionEvent::CommitMessageGenerated(message) => {
                format!("message {}", message.message)
            }
            ExecutionEvent::Executing { command } => format!("executing {command}"),
            ExecutionEvent::CommandSucceeded { .. } => "succeeded".to_string(),
            ExecutionEvent::CommandFailed { error } => format!("failed {error}"),
            ExecutionEvent::Replanning => "replanning".to_string(),
            ExecutionEvent::RecoveryAccepted => "recovery accepted".to_string(),
            ExecutionEvent::Stopped => "stopped".to_string(),
        };
        self.events.borrow_mut().push(line);
    }

    fn show_recovery_comparison(&self, _original: &Plan, _recovery: &Plan, _error: &str) {
        *self.comparisons.borrow_mut() += 1;
    }

    fn show_results(&self, _state: &RunState) {
        *self.results_shown.borrow_mut() += 1;
    }
}

/// [`PlanProvider`] handing out queued plans; errors once a queue is empty.
pub struct ScriptedPlanner {
    plans: RefCell<VecDeque<Plan>>,
    recovery_plans: RefCell<VecDeque<Plan>>,
    tasks: RefCell<Vec<String>>,
    recovery_contexts: RefCell<Vec<RecoveryContext>>,
}

impl ScriptedPlanner {
    pub fn new(plans: Vec<Plan>, recovery_plans: Vec<Plan>) -> Self {
        Self {
            plans: RefCell::new(plans.into()),
            recovery_plans: RefCell::new(recovery_plans.into()),
            tasks: RefCell::new(Vec::new()),
            recovery_contexts: RefCell::new(Vec::new()),
        }
    }

    pub fn tasks(&self) -> Vec<String> {
        self.tasks.borrow().clone()
    }

    pub fn recovery_contexts(&self) -> Vec<RecoveryContext> {
        self.recovery_contexts.borrow().clone()
    }
}

impl PlanProvider for ScriptedPlanner {
    fn generate_plan(&self, task: &str, _status: &GitStatusSnapshot) -> Result<Plan> {
        self.tasks.borrow_mut().push(task.to_string());
        self.plans
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("no scripted plan"))
    }

    fn generate_recovery_plan(&self, context: &RecoveryContext) -> Result<Plan> {
        self.recovery_contexts.borrow_mut().push(context.clone());
        self.recovery_plans
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("no scripted recovery plan"))
    }
}

/// [`CommitMessageWriter`] handing out queued messages.
pub struct ScriptedCommitWriter {
    messages: RefCell<VecDeque<String>>,
    diffs: RefCell<Vec<String>>,
}

impl ScriptedCommitWriter {
    pub fn new(messages: Vec<&str>) -> Self {
        Self {
            messages: RefCell::new(messages.into_iter().map(str::to_string).collect()),
            diffs: RefCell::new(Vec::new()),
        }
    }

    pub fn diffs(&self) -> Vec<String> {
        self.diffs.borrow().clone()
    }
}

impl CommitMessageWriter for ScriptedCommitWriter {
    fn generate(&self, diff: &str) -> Result<CommitMessage> {
        self.diffs.borrow_mut().push(diff.to_string());
        let message = self
            .messages
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("no scripted commit message"))?;
        Ok(CommitMessage {
            message,
            explanation: "scripted".to_string(),
        })
    }
}

/// [`Agent`] that writes queued answers to the output path.
///
/// Clones share the queue and the recorded prompts.
#[derive(Clone, Default)]
pub struct ScriptedAgent {
    answers: Rc<RefCell<VecDeque<String>>>,
    prompts: Rc<RefCell<Vec<String>>>,
}

impl ScriptedAgent {
    pub fn answering(answers: Vec<String>) -> Self {
        Self {
            answers: Rc::new(RefCell::new(answers.into())),
            prompts: Rc::default(),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.borrow().clone()
    }
}

impl Agent for ScriptedAgent {
    fn exec(&self, request: &AgentRequest) -> Result<()> {
        self.prompts.borrow_mut().push(request.prompt.clone());
        let answer = self
            .answers
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("no scripted agent answer"))?;
        fs::write(&request.output_path, answer)
            .with_context(|| format!("write {}", request.output_path.display()))
    }
}

/// Client over `agent` with a single attempt and no backoff.
pub fn agent_client(agent: ScriptedAgent) -> AgentClient {
    let config = ProviderConfig {
        max_attempts: 1,
        retry_backoff_ms: 0,
        ..ProviderConfig::default()
    };
    let workspace = AgentWorkspace::new(std::env::temp_dir()).expect("agent workspace");
    AgentClient::new(Box::new(agent), workspace, config).expect("agent client")
}

/// Real git repository in a temp dir with one initial commit on `main`.
pub struct TestRepo {
    dir: TempDir,
    remote: Option<TempDir>,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("tempdir")?;
        let repo = Self { dir, remote: None };
        repo.git(&["init", "--quiet"])?;
        repo.git(&["symbolic-ref", "HEAD", "refs/heads/main"])?;
        repo.git(&["config", "user.name", "Test User"])?;
        repo.git(&["config", "user.email", "test@example.com"])?;
        repo.git(&["config", "commit.gpgsign", "false"])?;
        repo.write("README.md", "# test\n")?;
        repo.git(&["add", "README.md"])?;
        repo.git(&["commit", "--quiet", "-m", "initial"])?;
        Ok(repo)
    }

    /// Add a bare `origin` and push `main` to it with upstream tracking.
    pub fn with_remote(mut self) -> Result<Self> {
        let remote = tempfile::tempdir().context("remote tempdir")?;
        run_git(remote.path(), &["init", "--quiet", "--bare"])?;
        let url = remote.path().to_string_lossy().into_owned();
        self.git(&["remote", "add", "origin", &url])?;
        self.git(&["push", "--quiet", "-u", "origin", "main"])?;
        self.remote = Some(remote);
        Ok(self)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn remote_path(&self) -> Option<PathBuf> {
        self.remote.as_ref().map(|dir| dir.path().to_path_buf())
    }

    /// Adapter over this repo with default limits.
    pub fn adapter(&self) -> Git {
        Git::new(self.path(), &GitConfig::default())
    }

    pub fn write(&self, relative: &str, contents: &str) -> Result<()> {
        let path = self.path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))
    }

    /// Run git in the repo, returning stdout; non-zero exit is an error.
    pub fn git(&self, args: &[&str]) -> Result<String> {
        run_git(self.path(), args)
    }
}

fn run_git(dir: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_TERMINAL_PROMPT", "0")
        .output()
        .with_context(|| format!("spawn git {}", args.join(" ")))?;
    if !output.status.success() {
        return Err(anyhow!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
