//! CLI tests for the commands that never reach the agent backend.
//!
//! Spawns the gitpilot binary inside throwaway repositories and checks exit
//! codes and plain (uncolored) output.

use std::path::Path;
use std::process::{Command, Output};

use gitpilot::exit_codes;
use gitpilot::test_support::TestRepo;

fn gitpilot(dir: &Path, config: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_gitpilot"))
        .current_dir(dir)
        .arg("--config")
        .arg(config)
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("spawn gitpilot")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn check_blocks_push_without_remote() {
    let repo = TestRepo::new().expect("repo");
    let config = repo.path().join("missing-config.toml");

    let output = gitpilot(repo.path(), &config, &["check", "git", "push"]);

    assert_eq!(output.status.code(), Some(exit_codes::FAILED));
    let text = stdout(&output);
    assert!(text.contains("blocked: git push"), "stdout: {text}");
    assert!(text.contains("no remote repository configured"));
}

#[test]
fn check_passes_harmless_command() {
    let repo = TestRepo::new().expect("repo");
    let config = repo.path().join("missing-config.toml");

    let output = gitpilot(repo.path(), &config, &["check", "git", "log", "--oneline"]);

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert!(stdout(&output).contains("ok: git log --oneline"));
}

#[test]
fn status_prints_branch() {
    let repo = TestRepo::new().expect("repo");
    let config = repo.path().join("missing-config.toml");

    let output = gitpilot(repo.path(), &config, &["status"]);

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let text = stdout(&output);
    assert!(text.contains("branch"));
    assert!(text.contains("main"));
}

#[test]
fn status_outside_repository_is_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = temp.path().join("missing-config.toml");

    let output = gitpilot(temp.path(), &config, &["status"]);

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
}

#[test]
fn config_init_then_show_then_refuse_overwrite() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = temp.path().join("conf/gitpilot.toml");

    let init = gitpilot(temp.path(), &config, &["config", "init"]);
    assert_eq!(init.status.code(), Some(exit_codes::OK));
    assert!(config.exists());

    let show = gitpilot(temp.path(), &config, &["config", "show"]);
    assert_eq!(show.status.code(), Some(exit_codes::OK));
    let text = stdout(&show);
    assert!(text.contains("[provider]"), "stdout: {text}");
    assert!(text.contains("max_attempts = 2"));

    let again = gitpilot(temp.path(), &config, &["config", "init"]);
    assert_eq!(again.status.code(), Some(exit_codes::INVALID));

    let forced = gitpilot(temp.path(), &config, &["config", "init", "--force"]);
    assert_eq!(forced.status.code(), Some(exit_codes::OK));
}

#[test]
fn invalid_config_file_is_rejected() {
    let repo = TestRepo::new().expect("repo");
    let config = repo.path().join("bad.toml");
    std::fs::write(&config, "[provider]\nmax_attempts = 0\n").expect("write config");

    let output = gitpilot(repo.path(), &config, &["status"]);

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("max_attempts"));
}
