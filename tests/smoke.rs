//! Smoke tests -- verify the binary runs and key subcommands parse.

use assert_cmd::Command;
use predicates::prelude::*;

fn turnaround() -> Command {
    let mut cmd = Command::cargo_bin("turnaround").unwrap();
    cmd.env_remove("TURNAROUND_CONFIG").env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_cli_help() {
    turnaround()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Process turnaround prediction"));
}

#[test]
fn test_cli_version() {
    turnaround()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("turnaround"));
}

#[test]
fn test_subcommands_exist() {
    for sub in ["serve", "processes", "predict", "watch", "kill"] {
        turnaround().args([sub, "--help"]).assert().success();
    }
}

#[test]
fn test_processes_json() {
    let output = turnaround()
        .args(["processes", "--limit", "3", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let procs: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let procs = procs.as_array().unwrap();
    assert!(!procs.is_empty() && procs.len() <= 3);
}

#[test]
fn test_predict_rejects_bad_quantum() {
    turnaround()
        .args(["predict", "--quantum", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("quantum"));
}

#[test]
fn test_explicit_config_must_exist() {
    turnaround()
        .args(["--config", "/nonexistent/turnaround.toml", "processes"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read config file"));
}

#[test]
fn test_invalid_config_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, "[stream]\ninterval_ms = 0\n").unwrap();

    turnaround()
        .arg("--config")
        .arg(&path)
        .args(["predict", "--json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid config file"));
}

#[test]
fn test_kill_missing_process_fails() {
    turnaround()
        .args(["kill", "999999999"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Process not found."));
}

#[test]
fn test_bad_env_config_warns_and_falls_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.toml");
    std::fs::write(&path, "[tracker\n").unwrap();

    let output = turnaround()
        .env("TURNAROUND_CONFIG", &path)
        .args(["processes", "--limit", "1", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("could not be loaded"), "stderr: {}", stderr);
    let procs: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(procs.is_array());
}
