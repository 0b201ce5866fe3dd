//! Git adapter for plan execution.
//!
//! Commands proposed by a plan are split with shell rules and executed as a
//! plain `git` argv, never through a shell. Status snapshots are parsed from
//! `git status --porcelain=v2 --branch`.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use regex::Regex;
use tracing::{debug, instrument, warn};

use crate::core::classifier::{is_git_program, tokenize};
use crate::core::types::{CommandResult, GitStatusSnapshot};
use crate::io::config::GitConfig;
use crate::io::process::{ProcessOutput, run_with_timeout};

/// Executes literal git commands and captures repository status.
pub trait GitRunner {
    /// Run one command line. Spawn failures and timeouts come back as a
    /// failed result rather than an error.
    fn run(&self, command: &str) -> CommandResult;

    fn status(&self) -> Result<GitStatusSnapshot>;
}

/// Source of the staged diff used to synthesize commit messages.
pub trait DiffSource {
    /// `None` when nothing is staged.
    fn staged_diff(&self) -> Result<Option<String>>;
}

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>, settings: &GitConfig) -> Self {
        Self {
            workdir: workdir.into(),
            timeout: settings.command_timeout(),
            output_limit_bytes: settings.output_limit_bytes,
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn spawn(&self, args: &[String]) -> Result<ProcessOutput> {
        let mut cmd = Command::new("git");
        cmd.args(args)
            .current_dir(&self.workdir)
            .env("GIT_TERMINAL_PROMPT", "0");
        run_with_timeout(cmd, None, self.timeout, self.output_limit_bytes)
            .with_context(|| format!("git {}", args.join(" ")))
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let argv: Vec<String> = args.iter().map(|arg| (*arg).to_string()).collect();
        let output = self.spawn(&argv)?;
        if output.timed_out {
            return Err(anyhow!("git {} timed out after {:?}", args.join(" "), self.timeout));
        }
        if !output.status.success() {
            return Err(anyhow!(
                "git {} failed: {}",
                args.join(" "),
                output.stderr_text().trim()
            ));
        }
        Ok(output.stdout_text())
    }
}

impl GitRunner for Git {
    #[instrument(skip_all, fields(command = %command))]
    fn run(&self, command: &str) -> CommandResult {
        let tokens = tokenize(command);
        let Some((program, args)) = tokens.split_first() else {
            return CommandResult::failed("empty command");
        };
        if !is_git_program(program) {
            warn!(program = %program, "refusing to run non-git program");
            return CommandResult::failed(format!("refusing to run non-git program: {program}"));
        }

        let output = match self.spawn(args) {
            Ok(output) => output,
            Err(err) => {
                warn!(error = %err, "git spawn failed");
                return CommandResult::failed(format!("{err:#}"));
            }
        };
        if output.timed_out {
            return CommandResult {
                success: false,
                stdout: output.stdout_text(),
                stderr: format!("command timed out after {:?}", self.timeout),
            };
        }
        debug!(exit_code = ?output.status.code(), "git command finished");
        CommandResult {
            success: output.status.success(),
            stdout: output.stdout_text(),
            stderr: output.stderr_text(),
        }
    }

    #[instrument(skip_all)]
    fn status(&self) -> Result<GitStatusSnapshot> {
        let porcelain = self.run_capture(&["status", "--porcelain=v2", "--branch", "-uall"])?;
        let remotes = self.run_capture(&["remote"])?;
        let snapshot = parse_status(&porcelain, &remotes)?;
        debug!(
            branch = ?snapshot.current_branch,
            changes = snapshot.uncommitted_changes,
            "captured git status"
        );
        Ok(snapshot)
    }
}

impl DiffSource for Git {
    #[instrument(skip_all)]
    fn staged_diff(&self) -> Result<Option<String>> {
        let argv = ["diff", "--cached"].map(str::to_string);
        let output = self.spawn(&argv)?;
        if !output.succeeded() {
            return Err(anyhow!(
                "git diff --cached failed: {}",
                output.stderr_text().trim()
            ));
        }
        if output.stdout.iter().all(u8::is_ascii_whitespace) {
            debug!("nothing staged");
            return Ok(None);
        }
        Ok(Some(output.stdout_text()))
    }
}

static BRANCH_AB_RE: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^\+(\d+) -(\d+)$"));

/// Parse `git status --porcelain=v2 --branch` output plus `git remote` output.
pub fn parse_status(porcelain: &str, remotes: &str) -> Result<GitStatusSnapshot> {
    let mut snapshot = GitStatusSnapshot::default();

    for line in porcelain.lines().filter(|line| !line.is_empty()) {
        if let Some(header) = line.strip_prefix("# ") {
            parse_header(header, &mut snapshot)?;
            continue;
        }
        match line.as_bytes()[0] {
            b'1' => {
                let fields: Vec<&str> = line.splitn(9, ' ').collect();
                let [_, xy, .., path] = fields.as_slice() else {
                    return Err(anyhow!("unexpected porcelain line: '{line}'"));
                };
                record_change(&mut snapshot, xy, path)?;
            }
            b'2' => {
                let fields: Vec<&str> = line.splitn(10, ' ').collect();
                let [_, xy, .., paths] = fields.as_slice() else {
                    return Err(anyhow!("unexpected porcelain line: '{line}'"));
                };
                let path = paths.split_once('\t').map_or(*paths, |(new, _)| new);
                record_change(&mut snapshot, xy, path)?;
            }
            b'u' => {
                let fields: Vec<&str> = line.splitn(11, ' ').collect();
                let Some(path) = fields.get(10) else {
                    return Err(anyhow!("unexpected porcelain line: '{line}'"));
                };
                snapshot.conflicts.insert((*path).to_string());
            }
            b'?' => {
                let path = line
                    .strip_prefix("? ")
                    .ok_or_else(|| anyhow!("unexpected porcelain line: '{line}'"))?;
                snapshot.untracked.insert(path.to_string());
            }
            b'!' => {}
            _ => return Err(anyhow!("unexpected porcelain line: '{line}'")),
        }
    }

    let remote_names: BTreeSet<&str> = remotes
        .lines()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .collect();
    snapshot.has_remote = !remote_names.is_empty();
    if snapshot.remote_name.is_none() {
        snapshot.remote_name = if remote_names.contains("origin") {
            Some("origin".to_string())
        } else {
            remote_names.first().map(|name| (*name).to_string())
        };
    }

    Ok(snapshot.with_counted_changes())
}

fn parse_header(header: &str, snapshot: &mut GitStatusSnapshot) -> Result<()> {
    let (key, value) = header.split_once(' ').unwrap_or((header, ""));
    match key {
        "branch.head" => {
            snapshot.current_branch = (value != "(detached)").then(|| value.to_string());
        }
        "branch.upstream" => {
            snapshot.remote_name = value.split_once('/').map(|(remote, _)| remote.to_string());
        }
        "branch.ab" => {
            let re = BRANCH_AB_RE
                .as_ref()
                .map_err(|err| anyhow!("compile branch.ab pattern: {err}"))?;
            let caps = re
                .captures(value)
                .ok_or_else(|| anyhow!("unexpected branch.ab header: '{value}'"))?;
            snapshot.ahead = caps[1].parse().context("parse ahead count")?;
            snapshot.behind = caps[2].parse().context("parse behind count")?;
        }
        _ => {}
    }
    Ok(())
}

/// `XY` codes: X is the index side, Y the worktree side; `.` means unchanged.
fn record_change(snapshot: &mut GitStatusSnapshot, xy: &str, path: &str) -> Result<()> {
    let mut codes = xy.chars();
    let (Some(index), Some(worktree)) = (codes.next(), codes.next()) else {
        return Err(anyhow!("unexpected status code '{xy}' for {path}"));
    };
    if index != '.' {
        snapshot.staged.insert(path.to_string());
    }
    if worktree != '.' {
        snapshot.modified.insert(path.to_string());
    }
    Ok(())
}
