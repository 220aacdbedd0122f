//! End-to-end runs against fixture suites.

use super::{agent_test, fixtures_dir};
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

type TestResult = Result<(), Box<dyn std::error::Error>>;

#[test]
fn test_passing_suite() {
    agent_test()
        .arg(fixtures_dir().join("passing"))
        .assert()
        .success()
        .stdout(predicate::str::contains("test MathAgent::exact_answer ... ok"))
        .stdout(predicate::str::contains("test MathAgent::parametrized[1] ... ok"))
        .stdout(predicate::str::contains("test MathAgent::later ... ignored"))
        .stdout(predicate::str::contains(
            "test result: ok. 4 passed; 0 failed; 0 errors; 1 ignored",
        ));
}

#[test]
fn test_failing_suite() {
    agent_test()
        .arg(fixtures_dir().join("failing"))
        .assert()
        .code(1)
        .stdout(predicate::str::contains("test FailingAgent::wrong_answer ... FAILED"))
        .stdout(predicate::str::contains("test FailingAgent::passes ... ok"))
        .stdout(predicate::str::contains("failures:"))
        .stdout(predicate::str::contains(
            "---- FailingAgent::wrong_answer (FAILED) ----",
        ))
        .stdout(predicate::str::contains("expected output to contain '4'"))
        .stdout(predicate::str::contains("test result: FAILED. 1 passed; 1 failed"));
}

#[test]
fn test_json_report() -> TestResult {
    let output = agent_test()
        .arg(fixtures_dir().join("passing"))
        .args(["--format", "json"])
        .output()?;
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert!(report["timestamp"].is_string());
    assert_eq!(report["summary"]["suite_name"], "passing");
    assert_eq!(report["summary"]["counts"]["passed"], 4);
    assert_eq!(report["summary"]["counts"]["skipped"], 1);

    let results = report["summary"]["results"]
        .as_array()
        .ok_or("results should be an array")?;
    assert_eq!(results.len(), 5);
    assert_eq!(results[0]["class_name"], "MathAgent");
    assert_eq!(results[0]["test_name"], "exact_answer");
    assert_eq!(results[0]["status"], "passed");
    assert_eq!(results[0]["metrics"]["tokens"], 20);
    assert_eq!(results[2]["params"]["question"], "What is 2+2?");
    Ok(())
}

#[test]
fn test_file_scope() {
    agent_test()
        .arg(fixtures_dir().join("failing/answers.agent-test.yaml"))
        .assert()
        .code(1)
        .stdout(predicate::str::contains("running 2 tests in FailingAgent"));
}

#[test]
fn test_filter() {
    agent_test()
        .arg(fixtures_dir().join("passing"))
        .args(["--filter", "geography"])
        .assert()
        .success()
        .stdout(predicate::str::contains("test MathAgent::geography ... ok"))
        .stdout(predicate::str::contains("exact_answer").not());
}

#[test]
fn test_filter_no_match() {
    agent_test()
        .arg(fixtures_dir().join("passing"))
        .args(["--filter", "nothing-matches-this"])
        .assert()
        .success()
        .stderr(predicate::str::contains("No tests match filter"));
}

#[test]
fn test_tags() {
    agent_test()
        .arg(fixtures_dir().join("passing"))
        .args(["--tag", "math"])
        .assert()
        .success()
        .stdout(predicate::str::contains("running 2 tests in MathAgent"))
        .stdout(predicate::str::contains("test result: ok. 3 passed"));
}

#[test]
fn test_verbose_table() {
    agent_test()
        .arg(fixtures_dir().join("passing"))
        .arg("--verbose")
        .assert()
        .success()
        .stdout(predicate::str::contains("Status"))
        .stdout(predicate::str::contains("Skipped"));
}

#[test]
fn test_invalid_suite_aborts() {
    agent_test()
        .arg(fixtures_dir().join("invalid"))
        .assert()
        .code(3)
        .stdout(predicate::str::contains("test ").not())
        .stderr(predicate::str::contains("duplicate test name 'same'"));
}

#[test]
fn test_invalid_config() {
    agent_test()
        .arg(fixtures_dir().join("bad-config"))
        .assert()
        .code(2)
        .stderr(predicate::str::contains("similarity-threshold"));
}

#[test]
fn test_case_sensitive_override() -> TestResult {
    let dir = TempDir::new()?;
    fs::write(
        dir.path().join("greet.agent-test.yaml"),
        r#"
name: Greeter
default_response: "Hello there"
tests:
  - name: greets
    prompt: "hi"
    assertions:
      - type: contains
        value: "hello"
"#,
    )?;

    agent_test().arg(dir.path()).assert().success();
    agent_test()
        .arg(dir.path())
        .arg("--case-sensitive")
        .assert()
        .code(1);
    Ok(())
}

#[test]
fn test_empty_scope() -> TestResult {
    let dir = TempDir::new()?;
    agent_test()
        .arg(dir.path())
        .assert()
        .success()
        .stderr(predicate::str::contains("No tests found"));
    Ok(())
}
