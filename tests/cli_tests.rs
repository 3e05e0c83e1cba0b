//! Integration tests for the Noteflow CLI
//!
//! These run the actual binary and verify argument handling and the
//! error/fix output path. Anything needing a live backend is covered by
//! the mock-driven tests instead.

use assert_cmd::Command;
use predicates::prelude::*;

fn noteflow_cmd() -> Command {
    let mut cmd = Command::cargo_bin("noteflow").unwrap();
    // Isolate from the developer's environment and any .env file
    cmd.env_remove("NOTEFLOW_API_URL")
        .env_remove("NOTEFLOW_API_KEY")
        .env_remove("NOTEFLOW_WORKSPACE");
    cmd
}

#[test]
fn test_help_flag() {
    noteflow_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "streaming client for agent-backed notebooks",
        ))
        .stdout(predicate::str::contains("ask"))
        .stdout(predicate::str::contains("research"));
}

#[test]
fn test_version_flag() {
    noteflow_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("noteflow"));
}

#[test]
fn test_no_args_shows_usage() {
    noteflow_cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_ask_without_config_reports_fix() {
    noteflow_cmd()
        .args(["ask", "hello"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error:"))
        .stderr(predicate::str::contains("NOTEFLOW_API_URL"))
        .stderr(predicate::str::contains("Fix:"));
}

#[test]
fn test_sessions_without_workspace_reports_fix() {
    noteflow_cmd()
        .arg("sessions")
        .env("NOTEFLOW_API_URL", "http://127.0.0.1:1")
        .assert()
        .failure()
        .stderr(predicate::str::contains("NOTEFLOW_WORKSPACE"));
}

#[test]
fn test_ask_requires_message_argument() {
    noteflow_cmd()
        .arg("ask")
        .assert()
        .failure()
        .stderr(predicate::str::contains("MESSAGE"));
}
