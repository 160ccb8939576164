use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Binary pointed at a private config file and data directory
fn cli(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("anidb-queue").unwrap();
    cmd.arg("--config")
        .arg(dir.path().join("config.toml"))
        .arg("--data-dir")
        .arg(dir.path().join("data"))
        .env_remove("ANIDB_QUEUE_ANIDB__USERNAME")
        .env_remove("ANIDB_QUEUE_ANIDB__PASSWORD")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_version() {
    Command::cargo_bin("anidb-queue")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_completions() {
    Command::cargo_bin("anidb-queue")
        .unwrap()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("anidb-queue"));
}

#[test]
fn test_config_path_honours_flag() {
    let dir = TempDir::new().unwrap();
    cli(&dir)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn test_config_set_then_get() {
    let dir = TempDir::new().unwrap();
    cli(&dir)
        .args(["config", "set", "anidb.client_name", "myqueue"])
        .assert()
        .success();
    cli(&dir)
        .args(["config", "get", "anidb.client_name"])
        .assert()
        .success()
        .stdout("myqueue\n");

    let saved = fs::read_to_string(dir.path().join("config.toml")).unwrap();
    assert!(saved.contains("client_name = \"myqueue\""));
}

#[test]
fn test_config_set_rejects_unknown_key() {
    let dir = TempDir::new().unwrap();
    cli(&dir)
        .args(["config", "set", "anidb.nickname", "x"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("anidb.nickname"));
}

#[test]
fn test_enqueue_and_status() {
    let dir = TempDir::new().unwrap();
    cli(&dir)
        .args(["enqueue", r#"{"type":"GetEpisode","eid":74795}"#])
        .assert()
        .success()
        .stdout(predicate::str::contains("Queued #").and(predicate::str::contains("GetEpisode_74795")));
    cli(&dir)
        .args(["enqueue", r#"{"type":"GetEpisode","eid":74795}"#, "--priority", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Already queued"));

    let output = cli(&dir).args(["status", "--json"]).output().unwrap();
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let general = &report["partitions"][0];
    assert_eq!(general["partition"], "general");
    assert_eq!(general["pending"], 1);
    assert_eq!(general["next"], "GetEpisode_74795");
}

#[test]
fn test_enqueue_rejects_bad_input() {
    let dir = TempDir::new().unwrap();
    cli(&dir)
        .args(["enqueue", "{not json"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Invalid command JSON"));
    cli(&dir)
        .args(["enqueue", r#"{"type":"GetEpisode","eid":1}"#, "--priority", "12"])
        .assert()
        .code(2);
}

#[test]
fn test_requeue_with_nothing_parked() {
    let dir = TempDir::new().unwrap();
    cli(&dir)
        .args(["requeue", "general"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Requeued 0"));
}

#[test]
fn test_run_requires_credentials() {
    let dir = TempDir::new().unwrap();
    cli(&dir)
        .arg("run")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("username"));
    // Nothing was opened
    assert!(!dir.path().join("data").join("queue.db").exists());
}

#[test]
fn test_add_registers_a_file_once() {
    let dir = TempDir::new().unwrap();
    let video = dir.path().join("episode01.mkv");
    fs::write(&video, b"not really a video").unwrap();

    cli(&dir)
        .arg("add")
        .arg(&video)
        .assert()
        .success()
        .stdout(predicate::str::contains("HashFile_1"));
    cli(&dir)
        .arg("add")
        .arg(&video)
        .assert()
        .success()
        .stdout(predicate::str::contains("Already queued").and(predicate::str::contains("HashFile_1")));
}

#[test]
fn test_add_missing_file_fails() {
    let dir = TempDir::new().unwrap();
    cli(&dir)
        .args(["add", "/nonexistent/episode.mkv"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("episode.mkv"));
}
