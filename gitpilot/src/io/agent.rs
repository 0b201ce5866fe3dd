//! Agent backend abstraction.
//!
//! The [`Agent`] trait decouples plan and commit-message generation from the
//! concrete backend (by default `codex exec`). An agent receives a prompt on
//! stdin and must write JSON matching a schema to a given path.
//! [`call_json`] layers the timeout/retry policy and schema validation on top
//! and reports failures as [`ProviderError`].

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use jsonschema::Draft;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tempfile::TempDir;
use tracing::{debug, info, instrument, warn};

use crate::error::{AgentTimeout, ProviderError};
use crate::io::config::{OUTPUT_PLACEHOLDER, ProviderConfig, SCHEMA_PLACEHOLDER};
use crate::io::process::{ProcessOutput, run_with_timeout};

/// Parameters for one agent invocation.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    /// Working directory for the agent process.
    pub workdir: PathBuf,
    /// Prompt text fed on stdin.
    pub prompt: String,
    /// JSON Schema that constrains the answer.
    pub output_schema_path: PathBuf,
    /// Where the agent must write its answer.
    pub output_path: PathBuf,
    /// Where agent stdout/stderr is logged.
    pub log_path: PathBuf,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

/// Abstraction over agent execution backends.
pub trait Agent {
    /// Run the agent. Must write its answer to `request.output_path`.
    ///
    /// A timed-out attempt returns an error carrying [`AgentTimeout`].
    fn exec(&self, request: &AgentRequest) -> Result<()>;
}

/// Agent that spawns the configured command line.
#[derive(Debug, Clone)]
pub struct CommandAgent {
    argv: Vec<String>,
}

impl CommandAgent {
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv }
    }

    pub fn from_config(config: &ProviderConfig) -> Self {
        Self::new(config.command.clone())
    }

    fn resolved_argv(&self, request: &AgentRequest) -> Vec<String> {
        let schema = request.output_schema_path.to_string_lossy();
        let output = request.output_path.to_string_lossy();
        self.argv
            .iter()
            .map(|arg| {
                arg.replace(SCHEMA_PLACEHOLDER, &schema)
                    .replace(OUTPUT_PLACEHOLDER, &output)
            })
            .collect()
    }
}

impl Agent for CommandAgent {
    #[instrument(skip_all, fields(timeout_secs = request.timeout.as_secs()))]
    fn exec(&self, request: &AgentRequest) -> Result<()> {
        let argv = self.resolved_argv(request);
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| anyhow!("agent command is empty"))?;
        info!(program = %program, workdir = %request.workdir.display(), "starting agent");

        if let Some(parent) = request.output_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create output dir {}", parent.display()))?;
        }
        let mut cmd = Command::new(program);
        cmd.args(args).current_dir(&request.workdir);

        let output = run_with_timeout(
            cmd,
            Some(request.prompt.as_bytes()),
            request.timeout,
            request.output_limit_bytes,
        )
        .with_context(|| format!("run {program}"))?;

        write_agent_log(&request.log_path, &output)?;

        if output.timed_out {
            warn!(timeout_secs = request.timeout.as_secs(), "agent timed out");
            return Err(AgentTimeout(request.timeout).into());
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "agent failed");
            return Err(anyhow!(
                "{program} failed with status {:?}: {}",
                output.status.code(),
                output.stderr_text().trim()
            ));
        }

        debug!("agent completed successfully");
        Ok(())
    }
}

/// Scratch directory holding schemas, answers, and logs of agent calls.
#[derive(Debug)]
pub struct AgentWorkspace {
    dir: TempDir,
    workdir: PathBuf,
}

impl AgentWorkspace {
    /// `workdir` is where the agent process runs (the repository).
    pub fn new(workdir: impl Into<PathBuf>) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("gitpilot-")
            .tempdir()
            .context("create agent scratch dir")?;
        Ok(Self {
            dir,
            workdir: workdir.into(),
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Build a request for call `name`, writing `schema` next to it.
    pub fn request(
        &self,
        name: &str,
        prompt: String,
        schema: &str,
        config: &ProviderConfig,
    ) -> Result<AgentRequest> {
        let schema_path = self.dir.path().join(format!("{name}.schema.json"));
        if !schema_path.exists() {
            fs::write(&schema_path, schema)
                .with_context(|| format!("write schema {}", schema_path.display()))?;
        }
        Ok(AgentRequest {
            workdir: self.workdir.clone(),
            prompt,
            output_schema_path: schema_path,
            output_path: self.dir.path().join(format!("{name}.output.json")),
            log_path: self.dir.path().join(format!("{name}.log")),
            timeout: config.timeout(),
            output_limit_bytes: config.output_limit_bytes,
        })
    }
}

/// Retry knobs for one provider call.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &ProviderConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff: config.retry_backoff(),
        }
    }
}

/// Run the agent and load its answer as `T`.
///
/// Backend failures and timeouts are retried up to `policy.max_attempts`.
/// An answer that is not JSON, violates `schema`, or does not deserialize is
/// [`ProviderError::Malformed`] and is not retried.
#[instrument(skip_all, fields(call = %call))]
pub fn call_json<T: DeserializeOwned>(
    agent: &dyn Agent,
    call: &'static str,
    request: &AgentRequest,
    schema: &str,
    policy: RetryPolicy,
) -> Result<T, ProviderError> {
    let mut last_error = String::new();
    let mut last_timed_out = false;

    for attempt in 1..=policy.max_attempts {
        if attempt > 1 {
            thread::sleep(policy.backoff);
        }
        remove_stale_output(&request.output_path);

        if let Err(err) = agent.exec(request) {
            last_timed_out = err.downcast_ref::<AgentTimeout>().is_some();
            last_error = format!("{err:#}");
            warn!(call, attempt, timed_out = last_timed_out, error = %last_error, "agent attempt failed");
            continue;
        }

        let contents = match fs::read_to_string(&request.output_path) {
            Ok(contents) => contents,
            Err(err) => {
                last_timed_out = false;
                last_error = format!("missing agent output {}: {err}", request.output_path.display());
                warn!(call, attempt, error = %last_error, "agent attempt failed");
                continue;
            }
        };
        debug!(call, attempt, bytes = contents.len(), "agent answered");
        return parse_validated(&contents, schema)
            .map_err(|err| ProviderError::Malformed {
                call,
                message: format!("{err:#}"),
            });
    }

    if last_timed_out {
        Err(ProviderError::TimedOut {
            call,
            attempts: policy.max_attempts,
            timeout: request.timeout,
        })
    } else {
        Err(ProviderError::Failed {
            call,
            attempts: policy.max_attempts,
            message: last_error,
        })
    }
}

/// Parse `contents` as JSON, validate it against `schema`, and deserialize.
pub fn parse_validated<T: DeserializeOwned>(contents: &str, schema: &str) -> Result<T> {
    let instance: Value = serde_json::from_str(contents).context("parse agent output json")?;
    let schema: Value = serde_json::from_str(schema).context("parse schema json")?;
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .context("compile json schema")?;
    let messages: Vec<String> = compiled
        .iter_errors(&instance)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        return Err(anyhow!("schema validation failed: {}", messages.join("; ")));
    }
    serde_json::from_value(instance).context("deserialize agent output")
}

fn remove_stale_output(path: &Path) {
    if !path.exists() {
        return;
    }
    if let Err(err) = fs::remove_file(path) {
        warn!(path = %path.display(), error = %err, "could not remove stale agent output");
    }
}

fn write_agent_log(path: &Path, output: &ProcessOutput) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create agent log dir {}", parent.display()))?;
    }
    let mut buf = String::new();
    buf.push_str("=== stdout ===\n");
    buf.push_str(&output.stdout_text());
    buf.push_str("\n=== stderr ===\n");
    buf.push_str(&output.stderr_text());
    if output.timed_out {
        buf.push_str("\n[agent timed out]\n");
    }
    fs::write(path, buf).with_context(|| format!("write agent log {}", path.display()))
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use serde::Deserialize;

    use super::*;

    const SCHEMA: &str = r#"{
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "type": "object",
        "required": ["message"],
        "properties": {"message": {"type": "string"}},
        "additionalProperties": false
    }"#;

    #[derive(Debug, Deserialize)]
    struct Answer {
        message: String,
    }

    enum Attempt {
        Write(&'static str),
        Fail,
        TimeOut,
        Silent,
    }

    struct FakeAgent {
        attempts: RefCell<Vec<Attempt>>,
        calls: RefCell<u32>,
    }

    impl FakeAgent {
        fn new(attempts: Vec<Attempt>) -> Self {
            Self {
                attempts: RefCell::new(attempts),
                calls: RefCell::new(0),
            }
        }
    }

    impl Agent for FakeAgent {
        fn exec(&self, request: &AgentRequest) -> Result<()> {
            *self.calls.borrow_mut() += 1;
            match self.attempts.borrow_mut().remove(0) {
                Attempt::Write(body) => {
                    fs::write(&request.output_path, body)?;
                    Ok(())
                }
                Attempt::Fail => Err(anyhow!("backend exploded")),
                Attempt::TimeOut => Err(AgentTimeout(request.timeout).into()),
                Attempt::Silent => Ok(()),
            }
        }
    }

    fn request(temp: &TempDir) -> AgentRequest {
        AgentRequest {
            workdir: temp.path().to_path_buf(),
            prompt: "prompt".to_string(),
            output_schema_path: temp.path().join("schema.json"),
            output_path: temp.path().join("output.json"),
            log_path: temp.path().join("agent.log"),
            timeout: Duration::from_secs(1),
            output_limit_bytes: 1000,
        }
    }

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            backoff: Duration::ZERO,
        }
    }

    #[test]
    fn retries_then_succeeds() {
        let temp = tempfile::tempdir().expect("tempdir");
        let agent = FakeAgent::new(vec![Attempt::Fail, Attempt::Write(r#"{"message":"ok"}"#)]);
        let answer: Answer =
            call_json(&agent, "test", &request(&temp), SCHEMA, policy(2)).expect("answer");
        assert_eq!(answer.message, "ok");
        assert_eq!(*agent.calls.borrow(), 2);
    }

    #[test]
    fn exhausted_timeouts_are_reported_as_timeouts() {
        let temp = tempfile::tempdir().expect("tempdir");
        let agent = FakeAgent::new(vec![Attempt::TimeOut, Attempt::TimeOut]);
        let err = call_json::<Answer>(&agent, "test", &request(&temp), SCHEMA, policy(2))
            .expect_err("should time out");
        assert!(matches!(err, ProviderError::TimedOut { attempts: 2, .. }));
    }

    #[test]
    fn missing_output_counts_as_failure() {
        let temp = tempfile::tempdir().expect("tempdir");
        let agent = FakeAgent::new(vec![Attempt::Silent]);
        let err = call_json::<Answer>(&agent, "test", &request(&temp), SCHEMA, policy(1))
            .expect_err("should fail");
        match err {
            ProviderError::Failed { message, .. } => assert!(message.contains("missing agent output")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn schema_violation_is_malformed_and_not_retried() {
        let temp = tempfile::tempdir().expect("tempdir");
        let agent = FakeAgent::new(vec![
            Attempt::Write(r#"{"message": 3}"#),
            Attempt::Write(r#"{"message":"ok"}"#),
        ]);
        let err = call_json::<Answer>(&agent, "test", &request(&temp), SCHEMA, policy(3))
            .expect_err("should be malformed");
        assert!(matches!(err, ProviderError::Malformed { .. }));
        assert_eq!(*agent.calls.borrow(), 1);
    }

    #[test]
    fn stale_output_from_previous_call_is_not_reused() {
        let temp = tempfile::tempdir().expect("tempdir");
        let req = request(&temp);
        fs::write(&req.output_path, r#"{"message":"stale"}"#).expect("write stale");
        let agent = FakeAgent::new(vec![Attempt::Silent]);
        let err = call_json::<Answer>(&agent, "test", &req, SCHEMA, policy(1)).expect_err("stale");
        assert!(matches!(err, ProviderError::Failed { .. }));
    }

    #[test]
    fn command_agent_substitutes_placeholders_and_feeds_stdin() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut req = request(&temp);
        let agent = CommandAgent::new(
            ["sh", "-c", "cat > \"$1\"", "agent", OUTPUT_PLACEHOLDER]
                .map(str::to_string)
                .to_vec(),
        );
        req.prompt = r#"{"message":"from stdin"}"#.to_string();
        agent.exec(&req).expect("exec");
        let written = fs::read_to_string(&req.output_path).expect("read output");
        assert_eq!(written, r#"{"message":"from stdin"}"#);
        assert!(req.log_path.exists());
    }

    #[test]
    fn command_agent_timeout_is_typed() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut req = request(&temp);
        req.timeout = Duration::from_millis(100);
        let agent = CommandAgent::new(["sh", "-c", "exec sleep 5"].map(str::to_string).to_vec());
        let err = agent.exec(&req).expect_err("timeout");
        assert!(err.downcast_ref::<AgentTimeout>().is_some());
    }
}
