//! Smoke tests -- verify the binary runs and key subcommands load.

use std::io::Write;

use assert_cmd::Command;
use predicates::str::contains;

fn burstwatch() -> Command {
    let mut cmd = Command::cargo_bin("burstwatch").unwrap();
    cmd.env_remove("BURSTWATCH_CONFIG").env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_cli_help() {
    burstwatch()
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("Burst alerting over classified security logs"));
}

#[test]
fn test_cli_version() {
    burstwatch()
        .arg("--version")
        .assert()
        .success()
        .stdout(contains("burstwatch"));
}

#[test]
fn test_subcommands_exist() {
    for sub in ["serve", "once", "rules", "check-config"] {
        burstwatch().args([sub, "--help"]).assert().success();
    }
}

#[test]
fn test_rules_prints_default_table() {
    let file = tempfile::NamedTempFile::new().unwrap();
    burstwatch()
        .args(["rules", "--config"])
        .arg(file.path())
        .assert()
        .success()
        .stdout(contains("login_failed_burst"))
        .stdout(contains("privilege_escalation_detected"))
        .stdout(contains("system_error_burst"));
}

#[test]
fn test_check_config_accepts_custom_rules() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[scheduler]
interval_secs = 120

[[rules]]
rule_type = "suspicious_activity"
watched_classification = "port_scan"
threshold = 20
window_seconds = 60
severity = "medium"
title_template = "Port scan from {{ip}}"
message_template = "{{count}} probes in {{timeWindow}} seconds"
"#
    )
    .unwrap();

    burstwatch()
        .args(["check-config", "--config"])
        .arg(file.path())
        .assert()
        .success()
        .stdout(contains("Configuration OK: 1 rules, refresh every 120s"));
}

#[test]
fn test_check_config_rejects_invalid_rules() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[[rules]]
rule_type = "login_failed_burst"
watched_classification = "login_failed"
threshold = 0
window_seconds = 60
severity = "high"
title_template = "t"
message_template = "m"
"#
    )
    .unwrap();

    burstwatch()
        .args(["check-config", "--config"])
        .arg(file.path())
        .assert()
        .failure()
        .stderr(contains("invalid configuration"));
}

#[test]
fn test_check_config_missing_file_fails() {
    burstwatch()
        .args(["check-config", "--config", "/nonexistent/burstwatch.toml"])
        .assert()
        .failure()
        .stderr(contains("failed to read config file"));
}

#[test]
fn test_once_logs_config_source() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[feed]
search_url = "http://127.0.0.1:1/graylog/_search"
timeout_secs = 2
"#
    )
    .unwrap();

    burstwatch()
        .env("RUST_LOG", "info")
        .args(["once", "--config"])
        .arg(file.path())
        .assert()
        .failure()
        .stdout(contains("configuration loaded"))
        .stdout(contains(file.path().display().to_string()))
        .stderr(contains("log feed unavailable"));
}
