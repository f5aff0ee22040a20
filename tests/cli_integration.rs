//! CLI Integration Tests
//!
//! Tests the command-line interface end-to-end.

use assert_cmd::Command;
use assert_fs::prelude::*;
use predicates::prelude::*;

/// Get the binary under test, isolated from the developer's real
/// environment (home directory and token).
fn teamflow_in(dir: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("teamflow").unwrap();
    cmd.current_dir(dir)
        .env("HOME", dir)
        .env_remove("GITHUB_TOKEN")
        .env_remove("SLACK_TOKEN")
        .env_remove("DISCORD_WEBHOOK_URL");
    cmd
}

// ============================================================================
// Help & Version Tests
// ============================================================================

#[test]
fn test_help_flag() {
    let dir = assert_fs::TempDir::new().unwrap();
    teamflow_in(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Interactive team development workflow"));
}

#[test]
fn test_version_flag() {
    let dir = assert_fs::TempDir::new().unwrap();
    teamflow_in(dir.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_subcommands_listed_in_help() {
    let dir = assert_fs::TempDir::new().unwrap();
    let assert = teamflow_in(dir.path()).arg("--help").assert().success();
    let output = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    for subcommand in ["start", "continue", "finish", "team", "help-flow"] {
        assert!(output.contains(subcommand), "missing {subcommand} in help");
    }
}

#[test]
fn test_no_subcommand_prints_help() {
    let dir = assert_fs::TempDir::new().unwrap();
    teamflow_in(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"));
}

#[test]
fn test_unknown_subcommand_fails() {
    let dir = assert_fs::TempDir::new().unwrap();
    teamflow_in(dir.path()).arg("panic").assert().failure();
}

// ============================================================================
// Configuration Flags
// ============================================================================

#[test]
fn test_check_config_without_token_fails() {
    let dir = assert_fs::TempDir::new().unwrap();
    teamflow_in(dir.path())
        .arg("--check-config")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("GITHUB_TOKEN"));
}

#[test]
fn test_check_config_with_valid_token_passes() {
    let dir = assert_fs::TempDir::new().unwrap();
    teamflow_in(dir.path())
        .arg("--check-config")
        .env("GITHUB_TOKEN", format!("ghp_{}", "a".repeat(36)))
        .assert()
        .success()
        .stdout(predicate::str::contains("問題はありません"));
}

#[test]
fn test_check_config_rejects_malformed_token() {
    let dir = assert_fs::TempDir::new().unwrap();
    teamflow_in(dir.path())
        .arg("--check-config")
        .env("GITHUB_TOKEN", "not-a-token")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("形式"));
}

#[test]
fn test_fix_config_creates_env_and_state_dirs() {
    let dir = assert_fs::TempDir::new().unwrap();
    teamflow_in(dir.path()).arg("--fix-config").assert().success();

    dir.child(".env").assert(predicate::path::exists());
    dir.child(".teamflow/backups").assert(predicate::path::exists());
    dir.child(".teamflow/state").assert(predicate::path::exists());
    dir.child(".teamflow/logs").assert(predicate::path::exists());

    let env_content = std::fs::read_to_string(dir.path().join(".env")).unwrap();
    assert!(env_content.contains("GITHUB_TOKEN"));
}

#[test]
fn test_fix_config_copies_env_example() {
    let dir = assert_fs::TempDir::new().unwrap();
    dir.child(".env.example")
        .write_str("GITHUB_TOKEN=\nDEFAULT_BRANCH=develop\n")
        .unwrap();

    teamflow_in(dir.path()).arg("--fix-config").assert().success();

    let env_content = std::fs::read_to_string(dir.path().join(".env")).unwrap();
    assert!(env_content.contains("DEFAULT_BRANCH=develop"));
}

#[test]
fn test_fix_config_is_idempotent() {
    let dir = assert_fs::TempDir::new().unwrap();
    teamflow_in(dir.path()).arg("--fix-config").assert().success();
    teamflow_in(dir.path())
        .arg("--fix-config")
        .assert()
        .success()
        .stdout(predicate::str::contains("修復すべき設定はありません"));
}

// ============================================================================
// Phase Entry Guards
// ============================================================================

#[test]
fn test_start_outside_repository_fails() {
    let dir = assert_fs::TempDir::new().unwrap();
    teamflow_in(dir.path())
        .arg("start")
        .write_stdin("")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Gitリポジトリ"));
}

#[test]
fn test_finish_outside_repository_fails() {
    let dir = assert_fs::TempDir::new().unwrap();
    teamflow_in(dir.path())
        .arg("finish")
        .write_stdin("")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Gitリポジトリ"));
}
