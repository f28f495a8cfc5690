//! CLI end-to-end tests
//!
//! Tests for the iptvcheck command-line interface.

mod common;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::process::Command;
use tempfile::tempdir;
use wiremock::MockServer;

/// Get a command for the iptvcheck binary
#[allow(deprecated)]
fn iptvcheck_cmd() -> Command {
    let mut cmd = Command::cargo_bin("iptvcheck").unwrap();
    cmd.env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_cli_no_args_shows_help() {
    let mut cmd = iptvcheck_cmd();
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_help_flag() {
    let mut cmd = iptvcheck_cmd();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("iptvcheck"))
        .stdout(predicate::str::contains("scan"))
        .stdout(predicate::str::contains("probe"));
}

#[test]
fn test_cli_version_command() {
    let mut cmd = iptvcheck_cmd();
    cmd.arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_cli_check_tools_command() {
    let mut cmd = iptvcheck_cmd();
    cmd.arg("check-tools").assert().success().stdout(
        predicate::str::contains("ffmpeg").and(predicate::str::contains("ffprobe")),
    );
}

#[test]
fn test_cli_scan_help() {
    let mut cmd = iptvcheck_cmd();
    cmd.args(["scan", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--category"))
        .stdout(predicate::str::contains("--quality"));
}

#[test]
fn test_cli_validate_config() {
    let temp = tempdir().unwrap();
    let config_file = temp.path().join("iptvcheck.toml");
    fs::write(
        &config_file,
        r#"
[catalog]
server = "line.example.com:8080"
username = "u"
password = "p"

[check]
jobs = 2

[probe]
duration_secs = 15
timeout_secs = 25
"#,
    )
    .unwrap();

    let mut cmd = iptvcheck_cmd();
    cmd.arg("validate")
        .arg(&config_file)
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"))
        .stdout(predicate::str::contains("line.example.com:8080"))
        .stdout(predicate::str::contains("Jobs: 2"));
}

#[test]
fn test_cli_validate_rejects_bad_thresholds() {
    let temp = tempdir().unwrap();
    let config_file = temp.path().join("bad.toml");
    fs::write(
        &config_file,
        r#"
[connection]
excellent_below_secs = 5
good_below_secs = 2
"#,
    )
    .unwrap();

    let mut cmd = iptvcheck_cmd();
    cmd.arg("validate").arg(&config_file).assert().failure();
}

#[test]
fn test_cli_validate_missing_file() {
    let mut cmd = iptvcheck_cmd();
    cmd.args(["validate", "/nonexistent/iptvcheck.toml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read config file"));
}

#[test]
fn test_cli_scan_requires_server() {
    let temp = tempdir().unwrap();
    let mut cmd = iptvcheck_cmd();
    cmd.current_dir(temp.path())
        .args(["scan", "--user", "u", "--pw", "p"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--server"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cli_scan_lists_filters_and_saves() {
    let server = MockServer::start().await;
    common::mount_catalog(&server).await;

    let temp = tempdir().unwrap();
    let csv = temp.path().join("out.csv");
    let uri = server.uri();
    let dir = temp.path().to_path_buf();
    let csv_arg = csv.clone();

    tokio::task::spawn_blocking(move || {
        let mut cmd = iptvcheck_cmd();
        cmd.current_dir(&dir)
            .args(["scan", "--server", &uri, "--user", common::USER, "--pw", common::PASS])
            .args(["--search", "bbc", "--nocache", "--save"])
            .arg(&csv_arg)
            .assert()
            .success()
            .stdout(predicate::str::contains("BBC One HD"))
            .stdout(predicate::str::contains("BBC News"))
            .stdout(predicate::str::contains("Sky Sports").not())
            .stdout(predicate::str::contains("2 channels"));
    })
    .await
    .unwrap();

    let written = fs::read_to_string(&csv).unwrap();
    let mut lines = written.lines();
    assert_eq!(
        lines.next().unwrap(),
        "id,name,category,archive,epg_count,codec,resolution,frame_rate"
    );
    assert_eq!(lines.next().unwrap(), "101,BBC One HD,UK,yes,,,,");
    assert_eq!(lines.next().unwrap(), "103,BBC News,UK,yes,,,,");
    assert!(!temp.path().join("channel_cache.json").exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cli_scan_json_by_category() {
    let server = MockServer::start().await;
    common::mount_catalog(&server).await;

    let temp = tempdir().unwrap();
    let uri = server.uri();
    let dir = temp.path().to_path_buf();

    let output = tokio::task::spawn_blocking(move || {
        let mut cmd = iptvcheck_cmd();
        cmd.current_dir(&dir)
            .args(["scan", "--server", &uri, "--user", common::USER, "--pw", common::PASS])
            .args(["--category", "Sport", "--json"])
            .output()
            .unwrap()
    })
    .await
    .unwrap();

    assert!(output.status.success());
    let rows: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["id"], 102);
    assert_eq!(rows[0]["category"], "Sport");
    assert_eq!(rows[0]["archive"], false);
    // The default cache file was written in the working directory.
    assert!(temp.path().join("channel_cache.json").exists());
}
