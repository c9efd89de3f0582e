//! Smoke tests -- verify the binary runs and its commands exist.

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn test_cli_help() {
    Command::cargo_bin("topoverify")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("emulated mobile network"));
}

#[test]
fn test_cli_version() {
    Command::cargo_bin("topoverify")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("topoverify"));
}

#[test]
fn test_no_command_prints_usage_and_succeeds() {
    Command::cargo_bin("topoverify")
        .unwrap()
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage"))
        .stdout(predicate::str::contains("routing"));
}

#[test]
fn test_unknown_command_fails_with_usage() {
    Command::cargo_bin("topoverify")
        .unwrap()
        .arg("throughput")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_check_subcommands_exist() {
    for check in ["details", "latency", "bandwidth", "routing"] {
        Command::cargo_bin("topoverify")
            .unwrap()
            .args([check, "--help"])
            .assert()
            .success();
    }
}

#[test]
fn test_topology_failure_exits_one() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("topoverify.toml");
    std::fs::write(
        &path,
        "[transport]\nkind = \"docker\"\ndocker_binary = \"/nonexistent/docker-cli\"\n",
    )
    .unwrap();

    Command::cargo_bin("topoverify")
        .unwrap()
        .args(["--config", path.to_str().unwrap(), "details"])
        .env_remove("RUST_LOG")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("loaded configuration"))
        .stderr(predicate::str::contains("topology discovery failed"));
}

#[test]
fn test_broken_config_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.toml");
    std::fs::write(&path, "[capture\nsettle_delay_ms = ").unwrap();

    Command::cargo_bin("topoverify")
        .unwrap()
        .args(["--config", path.to_str().unwrap(), "details"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to parse config file"));
}
