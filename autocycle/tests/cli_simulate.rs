//! CLI tests for `autocycle init`, `validate` and `simulate`.
//!
//! Spawns the binary in a temp dir and checks exit codes and output.

use std::fs;
use std::process::Command;

use autocycle::exit_codes;
use autocycle::io::config::DEFAULT_CONFIG_FILE;

fn autocycle(dir: &std::path::Path) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_autocycle"));
    command.current_dir(dir).env_remove("RUST_LOG");
    command
}

#[test]
fn init_then_validate_succeeds() {
    let temp = tempfile::tempdir().expect("tempdir");

    let status = autocycle(temp.path())
        .arg("init")
        .status()
        .expect("autocycle init");
    assert_eq!(status.code(), Some(exit_codes::OK));
    assert!(temp.path().join(DEFAULT_CONFIG_FILE).exists());

    let output = autocycle(temp.path())
        .arg("validate")
        .output()
        .expect("autocycle validate");
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert!(String::from_utf8_lossy(&output.stdout).contains("ok: 1 task"));
}

#[test]
fn validate_rejects_missing_and_invalid_config() {
    let temp = tempfile::tempdir().expect("tempdir");

    let status = autocycle(temp.path())
        .arg("validate")
        .status()
        .expect("autocycle validate");
    assert_eq!(status.code(), Some(exit_codes::INVALID));

    fs::write(
        temp.path().join(DEFAULT_CONFIG_FILE),
        "[session]\nmax_consecutive_failures = 0\n",
    )
    .expect("write config");
    let output = autocycle(temp.path())
        .arg("validate")
        .output()
        .expect("autocycle validate");
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("max_consecutive_failures"));
}

#[test]
fn simulate_completes_the_default_queue() {
    let temp = tempfile::tempdir().expect("tempdir");
    let telemetry = temp.path().join("logs").join("telemetry.jsonl");

    let output = autocycle(temp.path())
        .args(["simulate", "--seed", "7", "--json", "--telemetry"])
        .arg(&telemetry)
        .output()
        .expect("autocycle simulate");
    assert_eq!(
        output.status.code(),
        Some(exit_codes::OK),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let summary: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("summary json");
    assert_eq!(summary["stop_reason"], "queue_complete");
    assert_eq!(summary["units_processed"], 28);

    let lines = fs::read_to_string(&telemetry).expect("telemetry");
    let last = lines.lines().last().expect("at least one event");
    let event: serde_json::Value = serde_json::from_str(last).expect("event json");
    assert_eq!(event["type"], "session_ended");
}

#[test]
fn simulate_reports_supply_exhaustion() {
    let temp = tempfile::tempdir().expect("tempdir");

    let output = autocycle(temp.path())
        .args(["simulate", "--seed", "7", "--supply", "0"])
        .output()
        .expect("autocycle simulate");
    assert_eq!(output.status.code(), Some(exit_codes::STOPPED));
    assert!(String::from_utf8_lossy(&output.stdout).contains("supply exhausted"));
}
