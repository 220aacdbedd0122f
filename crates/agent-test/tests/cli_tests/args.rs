//! CLI argument tests.

use super::{agent_test, fixtures_dir};
use predicates::prelude::*;

#[test]
fn test_arg_help() {
    agent_test()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Test runner for AI agents with mocked LLM responses",
        ));
}

#[test]
fn test_arg_version() {
    agent_test()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("agent-test"));
}

#[test]
fn test_arg_invalid_format() {
    agent_test()
        .args([".", "--format", "table"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Invalid format"));
}

#[test]
fn test_arg_missing_scope() {
    agent_test()
        .args(["/nonexistent/agent-tests", "--format", "json"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("scope not found"));
}

#[test]
fn test_arg_threshold_out_of_range() {
    agent_test()
        .arg(fixtures_dir().join("passing"))
        .args(["--similarity-threshold", "1.5"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("similarity-threshold"));
}

#[test]
fn test_arg_threshold_not_a_number() {
    agent_test()
        .args([".", "--grounding-threshold", "high"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}
