//! End-to-end tests for the `tm` binary

use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// `tm` isolated from the user's config and log directories
fn tm(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("tm").expect("Failed to find tm binary");
    cmd.current_dir(home.path())
        .env("HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path().join(".config"))
        .env("XDG_DATA_HOME", home.path().join(".local/share"));
    cmd
}

#[test]
fn test_config_prints_defaults() {
    let home = TempDir::new().unwrap();
    tm(&home)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("claim-delay-ms: 70"))
        .stdout(predicate::str::contains("backoff-slots: 40"))
        .stdout(predicate::str::contains("notify-unchanged: true"));
}

#[test]
fn test_config_reads_local_file() {
    let home = TempDir::new().unwrap();
    fs::write(home.path().join(".tabmaster.yml"), "election:\n  backoff-slots: 12\n").unwrap();

    tm(&home)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("backoff-slots: 12"));
}

#[test]
fn test_missing_explicit_config_fails() {
    let home = TempDir::new().unwrap();
    tm(&home)
        .args(["--config", "missing.yml", "config"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load config"));
}

#[test]
fn test_zero_backoff_slots_rejected() {
    let home = TempDir::new().unwrap();
    let path = home.path().join("bad.yml");
    fs::write(&path, "election:\n  backoff-slots: 0\n").unwrap();

    tm(&home)
        .arg("--config")
        .arg(&path)
        .arg("config")
        .assert()
        .failure()
        .stderr(predicate::str::contains("backoff-slots"));
}

#[test]
fn test_simulate_elects_one_master() {
    let home = TempDir::new().unwrap();
    tm(&home)
        .args(["simulate", "--tabs", "3", "--seed", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Opened 3 tab(s)"))
        .stdout(predicate::str::contains("Masters: 1"));
}

#[test]
fn test_simulate_close_master_json() {
    let home = TempDir::new().unwrap();
    let path = home.path().join("fast.yml");
    fs::write(&path, "election:\n  backoff-step-ms: 5\n  backoff-slots: 4\n").unwrap();

    let output = tm(&home)
        .arg("--config")
        .arg(&path)
        .args(["simulate", "--tabs", "1", "--close-master", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["disruption"], "close-master");
    assert_eq!(report["opened"].as_array().unwrap().len(), 1);
    assert_eq!(report["settled"].as_array().unwrap().len(), 0);
    assert_eq!(report["masters"], 0);
}

#[test]
fn test_simulate_rejects_two_disruptions() {
    let home = TempDir::new().unwrap();
    tm(&home)
        .args(["simulate", "--close-master", "--crash-master"])
        .assert()
        .failure();
}

#[cfg(target_os = "linux")]
#[test]
fn test_writes_log_file() {
    let home = TempDir::new().unwrap();
    tm(&home).arg("config").assert().success();

    let log = home.path().join(".local/share/tabmaster/logs/tabmaster.log");
    let content = fs::read_to_string(log).unwrap();
    assert!(content.contains("Logging initialized"));
}
