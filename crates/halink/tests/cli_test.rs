//! Integration tests for the `halink` CLI binary.
//!
//! Argument parsing, help output, completions and error handling run
//! without an instance; session-bound commands run against the in-process
//! mock server.
#![allow(clippy::unwrap_used)]

use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::{Value, json};

use halink_api::mock::{AuthBehavior, MockServer};

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `halink` binary with env isolation.
///
/// Clears all `HALINK_*` env vars and points the config file at
/// `config_dir`, so tests never touch the user's real configuration.
fn halink_cmd(config_dir: &Path) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("halink");
    cmd.env("HOME", "/tmp/halink-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/halink-cli-test-nonexistent")
        .env("HALINK_CONFIG", config_dir.join("config.toml"))
        .env("NO_COLOR", "1")
        .env_remove("HALINK_PROFILE")
        .env_remove("HALINK_URL")
        .env_remove("HALINK_TOKEN")
        .env_remove("HALINK_OUTPUT")
        .env_remove("HALINK_INSECURE")
        .env_remove("HALINK_TIMEOUT")
        .env_remove("RUST_LOG");
    cmd
}

/// Concatenate stdout + stderr from a command output for flexible matching.
fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

fn seed(server: &MockServer) {
    server.respond_with(
        "config/floor_registry/list",
        json!([{ "floor_id": "ground", "name": "Ground", "level": 0 }]),
    );
    server.respond_with(
        "config/area_registry/list",
        json!([{ "area_id": "living", "name": "Living Room", "floor_id": "ground" }]),
    );
    server.respond_with(
        "config/entity_registry/list",
        json!([
            { "entity_id": "light.living", "area_id": "living" },
            { "entity_id": "input_number.target", "area_id": "living", "name": "Target" }
        ]),
    );
    server.respond_with(
        "get_states",
        json!([
            { "entity_id": "light.living", "state": "on", "attributes": { "friendly_name": "Living light" } },
            { "entity_id": "input_number.target", "state": "21.5", "attributes": {} }
        ]),
    );
    server.respond_with("config/device_registry/list", json!([]));
    server.respond_with("config/label_registry/list", json!([]));
    server.respond_with(
        "scheduler/schedules",
        json!([{ "schedule_id": "morning", "name": "Morning", "enabled": true }]),
    );
}

/// Run the binary against `server` off the async runtime so the mock keeps
/// serving while the process runs.
async fn run_against(server: &MockServer, args: &[&str]) -> std::process::Output {
    let dir = tempfile::tempdir().unwrap();
    let url = server.url().to_string();
    let args: Vec<String> = args.iter().map(|a| (*a).to_owned()).collect();
    tokio::task::spawn_blocking(move || {
        halink_cmd(dir.path())
            .env("HALINK_URL", url)
            .env("HALINK_TOKEN", "cli-token")
            .args(&args)
            .output()
            .unwrap()
    })
    .await
    .unwrap()
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let dir = tempfile::tempdir().unwrap();
    let output = halink_cmd(dir.path()).output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_flag() {
    let dir = tempfile::tempdir().unwrap();
    halink_cmd(dir.path()).arg("--help").assert().success().stdout(
        predicate::str::contains("Home Assistant")
            .and(predicate::str::contains("states"))
            .and(predicate::str::contains("watch"))
            .and(predicate::str::contains("schedules")),
    );
}

#[test]
fn test_version_flag() {
    let dir = tempfile::tempdir().unwrap();
    halink_cmd(dir.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("halink"));
}

// ── Shell completions ───────────────────────────────────────────────

#[test]
fn test_completions_bash() {
    let dir = tempfile::tempdir().unwrap();
    halink_cmd(dir.path())
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

#[test]
fn test_completions_zsh() {
    let dir = tempfile::tempdir().unwrap();
    halink_cmd(dir.path())
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef"));
}

// ── Error cases ─────────────────────────────────────────────────────

#[test]
fn test_invalid_subcommand() {
    let dir = tempfile::tempdir().unwrap();
    let output = halink_cmd(dir.path()).arg("foobar").output().unwrap();
    assert!(!output.status.success());
    let text = combined_output(&output);
    assert!(
        text.contains("unrecognized") || text.contains("foobar"),
        "Expected error mentioning invalid subcommand:\n{text}"
    );
}

#[test]
fn test_invalid_output_format() {
    let dir = tempfile::tempdir().unwrap();
    let output = halink_cmd(dir.path())
        .args(["--output", "invalid", "states", "list"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    let text = combined_output(&output);
    assert!(
        text.contains("invalid") || text.contains("possible values"),
        "Expected output format error:\n{text}"
    );
}

#[test]
fn test_states_without_config_explains_setup() {
    let dir = tempfile::tempdir().unwrap();
    halink_cmd(dir.path())
        .args(["states", "list"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("No instance configured"));
}

#[test]
fn test_url_without_token_is_an_auth_error() {
    let dir = tempfile::tempdir().unwrap();
    halink_cmd(dir.path())
        .args(["--url", "http://127.0.0.1:9", "ping"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("No access token"));
}

// ── Config commands ─────────────────────────────────────────────────

#[test]
fn test_config_path_honors_override() {
    let dir = tempfile::tempdir().unwrap();
    halink_cmd(dir.path())
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn test_config_show_no_config() {
    let dir = tempfile::tempdir().unwrap();
    halink_cmd(dir.path())
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[defaults]"));
}

#[test]
fn test_config_show_redacts_tokens() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("config.toml"),
        r#"
default_profile = "home"

[profiles.home]
url = "http://ha.local:8123"
token = "very-secret-token"
"#,
    )
    .unwrap();

    halink_cmd(dir.path())
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("[profiles.home]")
                .and(predicate::str::contains("very-secret-token").not()),
        );
}

#[test]
fn test_config_use_unknown_profile() {
    let dir = tempfile::tempdir().unwrap();
    halink_cmd(dir.path())
        .args(["config", "use", "cabin"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("cabin"));
}

#[test]
fn test_config_use_switches_default() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
default_profile = "home"

[profiles.home]
url = "http://ha.local:8123"

[profiles.cabin]
url = "http://cabin.local:8123"
"#,
    )
    .unwrap();

    halink_cmd(dir.path())
        .args(["config", "use", "cabin"])
        .assert()
        .success();
    let saved = std::fs::read_to_string(&path).unwrap();
    assert!(saved.contains("default_profile = \"cabin\""), "{saved}");
}

// ── Against the mock server ─────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn test_states_list_json() {
    let server = MockServer::start().await.unwrap();
    seed(&server);

    let output = run_against(&server, &["states", "list", "-o", "json"]).await;
    assert!(output.status.success(), "{}", combined_output(&output));

    let entities: Vec<Value> = serde_json::from_slice(&output.stdout).unwrap();
    let ids: Vec<&str> = entities
        .iter()
        .filter_map(|e| e["entity_id"].as_str())
        .collect();
    assert_eq!(ids, vec!["input_number.target", "light.living"]);
    assert_eq!(entities[1]["name"], "Living light");
    assert_eq!(entities[1]["area_id"], "living");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_states_get_plain_prints_state() {
    let server = MockServer::start().await.unwrap();
    seed(&server);

    let output = run_against(&server, &["states", "get", "input_number.target", "-o", "plain"]).await;
    assert!(output.status.success(), "{}", combined_output(&output));
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "21.5");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unknown_entity_is_not_found() {
    let server = MockServer::start().await.unwrap();
    seed(&server);

    let output = run_against(&server, &["states", "get", "light.nowhere"]).await;
    assert_eq!(output.status.code(), Some(4), "{}", combined_output(&output));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_rejected_token_exits_with_auth_code() {
    let server = MockServer::start().await.unwrap();
    server.set_auth(AuthBehavior::Reject("Invalid access token".into()));

    let output = run_against(&server, &["ping"]).await;
    assert_eq!(output.status.code(), Some(3), "{}", combined_output(&output));
    assert!(combined_output(&output).contains("Authentication failed"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_set_number_rejects_non_numeric_value() {
    let server = MockServer::start().await.unwrap();
    seed(&server);

    let output = run_against(&server, &["set-number", "input_number.target", "warm"]).await;
    assert_eq!(output.status.code(), Some(2), "{}", combined_output(&output));
    assert!(server.received_of_type("call_service").is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_toggle_sends_service_call() {
    let server = MockServer::start().await.unwrap();
    seed(&server);

    let output = run_against(&server, &["toggle", "light.living", "off"]).await;
    assert!(output.status.success(), "{}", combined_output(&output));

    let calls = server.received_of_type("call_service");
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0]["domain"], "light");
    assert_eq!(calls[0]["service"], "turn_off");
    assert_eq!(calls[0]["target"]["entity_id"], "light.living");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_failed_service_call_reports_code() {
    let server = MockServer::start().await.unwrap();
    seed(&server);
    server.fail_with("call_service", "service_not_found", "Service light.explode not found");

    let output = run_against(&server, &["call", "light.explode", "-e", "light.living"]).await;
    assert_eq!(output.status.code(), Some(1));
    assert!(combined_output(&output).contains("service_not_found"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_schedules_list_plain() {
    let server = MockServer::start().await.unwrap();
    seed(&server);

    let output = run_against(&server, &["schedules", "list", "-o", "plain"]).await;
    assert!(output.status.success(), "{}", combined_output(&output));
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "morning");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_ping_reports_latency() {
    let server = MockServer::start().await.unwrap();
    seed(&server);

    let output = run_against(&server, &["ping", "-o", "json"]).await;
    assert!(output.status.success(), "{}", combined_output(&output));
    let report: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["alive"], true);
    assert_eq!(report["entities"], 2);
}
