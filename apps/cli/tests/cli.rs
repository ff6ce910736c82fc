//! End-to-end tests for the `rally` binary

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;

fn rally() -> Command {
    let mut cmd = Command::cargo_bin("rally").unwrap();
    cmd.env_remove("RALLY_LOG")
        .env_remove("RALLY_LOG_FORMAT")
        .env_remove("RALLY_CONFIG")
        .env_remove("RALLY_QUEUE_FILE");
    cmd
}

fn stdout_lines(cmd: &mut Command) -> Vec<String> {
    let output = cmd.output().unwrap();
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    String::from_utf8(output.stdout).unwrap().lines().map(str::to_string).collect()
}

#[test]
fn config_check_summarizes_presets() {
    rally()
        .args(["config", "check"])
        .assert()
        .success()
        .stdout(predicate::str::contains("configuration ok"))
        .stdout(predicate::str::contains("stripe > paypal > oxxo > spei"))
        .stdout(predicate::str::contains("bracket_generation"));
}

#[test]
fn config_show_applies_environment_overrides() {
    let lines = stdout_lines(
        rally()
            .args(["config", "show"])
            .env("RALLY_RATE_LIMITS__USER_TRANSACTIONS_PER_MINUTE", "3"),
    );
    let config: Value = serde_json::from_str(&lines.join("\n")).unwrap();

    assert_eq!(config["rate_limits"]["user_transactions_per_minute"], 3);
    assert_eq!(config["rate_limits"]["user_transactions_per_hour"], 100);
}

#[test]
fn invalid_config_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rally.toml");
    std::fs::write(&path, "[breakers.stripe]\nfailure_threshold = 0\n").unwrap();

    rally()
        .args(["config", "check", "--config"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("failure_threshold"));
}

#[test]
fn drill_fails_over_from_failing_primary() {
    let lines = stdout_lines(rally().args(["drill", "--method", "card", "--fail-gateway", "stripe"]));
    let response: Value = serde_json::from_str(&lines[0]).unwrap();

    assert_eq!(response["status"], "success");
    assert_eq!(response["resource"], "paypal");
}

#[test]
fn drill_rate_limits_a_single_member() {
    let lines = stdout_lines(rally().args(["drill", "--count", "11", "--actor", "member-1"]));
    let last: Value = serde_json::from_str(&lines[10]).unwrap();

    assert_eq!(last["status"], "rejected");
    assert_eq!(last["retry_after_secs"], 60);
}

#[test]
fn drill_rejects_unknown_gateway() {
    rally()
        .args(["drill", "--fail-gateway", "mercadopago"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown gateway 'mercadopago'"));
}

#[test]
fn exhausted_drill_is_queued_and_can_be_acked() {
    let dir = tempfile::tempdir().unwrap();
    let queue = dir.path().join("manual_queue.jsonl");

    let lines = stdout_lines(
        rally()
            .args(["drill", "--fail-gateway", "stripe", "--fail-gateway", "paypal", "--queue-file"])
            .arg(&queue),
    );
    let response: Value = serde_json::from_str(&lines[0]).unwrap();
    assert_eq!(response["status"], "queued_for_manual_processing");
    let id = response["queue_id"].as_str().unwrap().to_string();

    let status = stdout_lines(rally().args(["queue", "status", "--file"]).arg(&queue));
    let status: Value = serde_json::from_str(&status.join("\n")).unwrap();
    assert_eq!(status["queue_length"], 1);
    assert_eq!(status["total_pending_amount"], 10_000);

    let pending = stdout_lines(rally().args(["queue", "list", "--file"]).arg(&queue));
    assert_eq!(pending.len(), 1);
    assert!(pending[0].contains(&id));

    rally()
        .args(["queue", "ack", "--file"])
        .arg(&queue)
        .arg(&id)
        .assert()
        .success();
    rally()
        .args(["queue", "ack", "--file"])
        .arg(&queue)
        .arg(&id)
        .assert()
        .failure();
}
