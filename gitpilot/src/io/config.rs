//! User configuration stored as TOML.
//!
//! Looked up at `--config`, then `$GITPILOT_CONFIG`, then
//! `$XDG_CONFIG_HOME/gitpilot/config.toml` (or `~/.config/...`). A missing
//! file means defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const CONFIG_ENV: &str = "GITPILOT_CONFIG";
pub const SCHEMA_PLACEHOLDER: &str = "{schema}";
pub const OUTPUT_PLACEHOLDER: &str = "{output}";

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct AssistantConfig {
    pub provider: ProviderConfig,
    pub git: GitConfig,
    pub display: DisplayConfig,
}

/// Agent backend used for plans and commit messages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProviderConfig {
    /// Argv of the backend. `{schema}` and `{output}` are replaced with the
    /// JSON Schema path and the path the answer must be written to; the
    /// prompt arrives on stdin.
    pub command: Vec<String>,
    /// Per-attempt wall-clock limit.
    pub timeout_secs: u64,
    /// Total attempts per call, including the first.
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
    /// Truncate backend stdout/stderr logs beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            command: [
                "codex",
                "exec",
                "--sandbox",
                "read-only",
                "--skip-git-repo-check",
                "--output-schema",
                SCHEMA_PLACEHOLDER,
                "--output-last-message",
                OUTPUT_PLACEHOLDER,
                "-",
            ]
            .map(str::to_string)
            .to_vec(),
            timeout_secs: 120,
            max_attempts: 2,
            retry_backoff_ms: 500,
            output_limit_bytes: 100_000,
        }
    }
}

impl ProviderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Limits for git subprocesses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GitConfig {
    pub command_timeout_secs: u64,
    pub output_limit_bytes: usize,
    /// Staged diffs are cut to this size before commit-message synthesis.
    pub diff_limit_bytes: usize,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            command_timeout_secs: 300,
            output_limit_bytes: 200_000,
            diff_limit_bytes: 20_000,
        }
    }
}

impl GitConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

/// Terminal rendering knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DisplayConfig {
    /// Lessons shown at the end of a run.
    pub lessons_limit: usize,
    /// Characters of command output previewed right after a step runs.
    pub output_preview_chars: usize,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            lessons_limit: 3,
            output_preview_chars: 100,
        }
    }
}

impl AssistantConfig {
    pub fn validate(&self) -> Result<()> {
        let provider = &self.provider;
        if provider.command.is_empty() || provider.command[0].trim().is_empty() {
            return Err(anyhow!("provider.command must be a non-empty array"));
        }
        for placeholder in [SCHEMA_PLACEHOLDER, OUTPUT_PLACEHOLDER] {
            if !provider.command.iter().any(|arg| arg.contains(placeholder)) {
                return Err(anyhow!("provider.command must contain {placeholder}"));
            }
        }
        if provider.timeout_secs == 0 {
            return Err(anyhow!("provider.timeout_secs must be > 0"));
        }
        if provider.max_attempts == 0 {
            return Err(anyhow!("provider.max_attempts must be > 0"));
        }
        if provider.output_limit_bytes == 0 {
            return Err(anyhow!("provider.output_limit_bytes must be > 0"));
        }
        if self.git.command_timeout_secs == 0 {
            return Err(anyhow!("git.command_timeout_secs must be > 0"));
        }
        if self.git.output_limit_bytes == 0 || self.git.diff_limit_bytes == 0 {
            return Err(anyhow!("git output and diff limits must be > 0"));
        }
        Ok(())
    }
}

/// Resolve the config path from an explicit flag, the environment, or XDG.
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Some(path) = env::var_os(CONFIG_ENV).filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(path));
    }
    let base = env::var_os("XDG_CONFIG_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))?;
    Some(base.join("gitpilot").join("config.toml"))
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `AssistantConfig::default()`.
pub fn load_config(path: &Path) -> Result<AssistantConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "config missing, using defaults");
        let cfg = AssistantConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: AssistantConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    debug!(path = %path.display(), "config loaded");
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &AssistantConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, buf)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
