//! Argument parsing, local-only commands, and early failures of the binary.

#![allow(clippy::expect_used)]

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn skyforge(home: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("skyforge"));
    cmd.env("NO_COLOR", "1")
        .env("SKYFORGE_HOME", home)
        .env_remove("SKYFORGE_CONFIG")
        .env_remove("AWS_ACCESS_KEY_ID")
        .env_remove("AWS_SECRET_ACCESS_KEY");
    cmd
}

fn home() -> TempDir {
    TempDir::new().expect("temp dir")
}

// --- Help and version ---

#[test]
fn test_cli_no_args_shows_help_and_exits_two() {
    let dir = home();
    skyforge(dir.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains(
            "Provision cloud nodes from layouts",
        ));
}

#[test]
fn test_cli_help_lists_commands() {
    let dir = home();
    skyforge(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("launch"))
        .stdout(predicate::str::contains("deploy"))
        .stdout(predicate::str::contains("destroy"))
        .stdout(predicate::str::contains("key-pairs"));
}

#[test]
fn test_cli_version_flag_and_subcommand_agree() {
    let dir = home();
    skyforge(dir.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
    skyforge(dir.path())
        .arg("version")
        .assert()
        .success()
        .stdout(format!("skyforge {}\n", env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_cli_unknown_subcommand_fails() {
    let dir = home();
    skyforge(dir.path()).arg("frobnicate").assert().code(2);
}

#[test]
fn test_deploy_requires_a_name() {
    let dir = home();
    skyforge(dir.path()).arg("deploy").assert().code(2);
}

#[test]
fn test_destroy_names_conflict_with_all() {
    let dir = home();
    skyforge(dir.path())
        .args(["destroy", "web1", "--all"])
        .assert()
        .code(2);
}

// --- Local-only commands ---

#[test]
fn test_sessions_with_empty_home_reports_none() {
    let dir = home();
    skyforge(dir.path())
        .arg("sessions")
        .assert()
        .success()
        .stdout(predicate::str::contains("No sessions recorded"));
}

#[test]
fn test_sessions_quiet_prints_nothing() {
    let dir = home();
    skyforge(dir.path())
        .args(["--quiet", "sessions"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn test_config_path_is_under_home() {
    let dir = home();
    let expected = dir.path().join("config.yaml");
    skyforge(dir.path())
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(format!("{}\n", expected.display()));
}

#[test]
fn test_config_path_honours_override() {
    let dir = home();
    let custom = dir.path().join("elsewhere.yaml");
    skyforge(dir.path())
        .env("SKYFORGE_CONFIG", &custom)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(format!("{}\n", custom.display()));
}

#[test]
fn test_config_show_prints_defaults_without_file() {
    let dir = home();
    skyforge(dir.path())
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("wait_timeout_secs: 300"));
}

#[test]
fn test_config_show_rejects_malformed_file() {
    let dir = home();
    std::fs::write(dir.path().join("config.yaml"), "ssh: [unclosed").expect("write");
    skyforge(dir.path())
        .args(["config", "show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("config.yaml"));
}

// --- Early failures ---

#[test]
fn test_deploy_unknown_session_fails() {
    let dir = home();
    skyforge(dir.path())
        .args(["deploy", "ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No session recorded for 'ghost'"));
}

#[test]
fn test_launch_missing_layouts_file_names_the_path() {
    let dir = home();
    let missing = dir.path().join("nope.yaml");
    skyforge(dir.path())
        .args(["launch", "-f"])
        .arg(&missing)
        .assert()
        .failure()
        .stderr(predicate::str::contains("nope.yaml"));
}

#[test]
fn test_launch_rejects_layout_without_credential() {
    let dir = home();
    let file = dir.path().join("layouts.yaml");
    std::fs::write(
        &file,
        "layouts:\n  - {name: web1, provider: aws, runs_on: ubuntu-20.04, constraints: small, username: ubuntu}\n",
    )
    .expect("write");
    skyforge(dir.path())
        .args(["launch", "-f"])
        .arg(&file)
        .assert()
        .failure()
        .stderr(predicate::str::contains("no SSH credential"));
}

#[test]
fn test_launch_rejects_unknown_layout_name() {
    let dir = home();
    let file = dir.path().join("layouts.yaml");
    std::fs::write(
        &file,
        "ssh: {public: /k/id.pub, private: /k/id}\nlayouts:\n  - {name: web1, provider: aws, runs_on: ubuntu-20.04, constraints: small, username: ubuntu}\n",
    )
    .expect("write");
    skyforge(dir.path())
        .args(["launch", "-f"])
        .arg(&file)
        .arg("db")
        .assert()
        .failure()
        .stderr(predicate::str::contains("layout 'db' is not declared"));
}
