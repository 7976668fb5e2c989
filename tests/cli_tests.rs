//! CLI smoke tests for the scrutiny binary.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

/// Helper to create a scrutiny Command
fn scrutiny() -> Command {
    cargo_bin_cmd!("scrutiny")
}

#[test]
fn test_scrutiny_help() {
    scrutiny().arg("--help").assert().success();
}

#[test]
fn test_scrutiny_version() {
    scrutiny().arg("--version").assert().success();
}

#[test]
fn test_steps_lists_the_pipeline() {
    scrutiny()
        .arg("steps")
        .assert()
        .success()
        .stdout(predicate::str::contains("Judge challenge"))
        .stdout(predicate::str::contains("Generate report"))
        .stdout(predicate::str::contains("Bind metrics"));
}

#[test]
fn test_run_completes_and_writes_report() {
    let dir = TempDir::new().unwrap();
    let report_path = dir.path().join("report.json");

    scrutiny()
        .current_dir(dir.path())
        .args(["run", "--interval-ms", "5", "--out"])
        .arg(&report_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Pipeline completed"));

    let content = std::fs::read_to_string(&report_path).unwrap();
    let report: serde_json::Value = serde_json::from_str(&content).unwrap();
    assert_eq!(report["confidence_score"], serde_json::json!(82.0));
    assert_eq!(report["is_logical"], serde_json::json!(true));
}

#[test]
fn test_run_unsuitable_entity_halts() {
    let dir = TempDir::new().unwrap();

    scrutiny()
        .current_dir(dir.path())
        .args(["run", "--unsuitable", "--interval-ms", "5"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Halted"));
}

#[test]
fn test_run_with_missing_entity_file_fails() {
    let dir = TempDir::new().unwrap();

    scrutiny()
        .current_dir(dir.path())
        .args(["run", "--entity", "no-such-entity.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read entity file"));
}
