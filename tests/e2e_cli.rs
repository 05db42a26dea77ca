//! CLI end-to-end tests for the mixvault binary.

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::process::Command;
use tempfile::tempdir;

#[allow(deprecated)]
fn mixvault_cmd() -> Command {
    Command::cargo_bin("mixvault").unwrap()
}

/// Write a config pointing the database and exports into `dir`.
fn write_config(dir: &std::path::Path) -> std::path::PathBuf {
    let path = dir.join("config.json");
    let config = serde_json::json!({
        "server": { "db_path": dir.join("mixvault.db") },
        "storage": { "local_root": dir.join("media") },
        "export": { "temp_dir": dir.join("exports"), "artifact_ttl_secs": 60 }
    });
    fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();
    path
}

#[test]
fn no_args_shows_help() {
    mixvault_cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn version_command() {
    mixvault_cmd()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("mixvault"));
}

#[test]
fn validate_reports_invalid_json() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.json");
    fs::write(&path, "{ not json").unwrap();
    mixvault_cmd()
        .args(["validate", path.to_str().unwrap()])
        .assert()
        .failure();
}

#[test]
fn validate_accepts_written_config() {
    let dir = tempdir().unwrap();
    let path = write_config(dir.path());
    mixvault_cmd()
        .args(["validate", path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"));
}

#[test]
fn seeding_flow() {
    let dir = tempdir().unwrap();
    let config = write_config(dir.path());
    let config = config.to_str().unwrap();

    mixvault_cmd()
        .args(["--config", config, "create-user", "dj"])
        .assert()
        .success();

    mixvault_cmd()
        .args(["--config", config, "grant", "dj", "--limit", "10", "--membership", "pro"])
        .assert()
        .success()
        .stdout(predicate::str::contains("limit 10"));

    mixvault_cmd()
        .args(["--config", config, "issue-token", "dj"])
        .assert()
        .success()
        .stdout(predicate::str::is_match("^[0-9a-f]{64}\n$").unwrap());

    let videos = dir.path().join("videos.json");
    fs::write(
        &videos,
        r#"[{"id": 1, "title": "Opener", "description": null, "duration_secs": 30.0,
             "content_key": "opener.mp4", "thumbnail_key": null, "is_premium": false}]"#,
    )
    .unwrap();
    mixvault_cmd()
        .args(["--config", config, "import-videos", videos.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Imported 1 videos"));
}

#[test]
fn grant_unknown_user_fails() {
    let dir = tempdir().unwrap();
    let config = write_config(dir.path());
    mixvault_cmd()
        .args(["--config", config.to_str().unwrap(), "grant", "ghost", "--limit", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no such user"));
}

#[test]
fn sweep_on_empty_dir() {
    let dir = tempdir().unwrap();
    let config = write_config(dir.path());
    mixvault_cmd()
        .args(["--config", config.to_str().unwrap(), "sweep"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed 0 artifacts"));
}
