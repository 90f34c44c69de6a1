use std::fs;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::tempdir;

#[test]
fn test_config_path_command() {
    let dir = tempdir().unwrap();

    cargo_bin_cmd!("sluice")
        .env("SLUICE_HOME", dir.path())
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn test_config_init_creates_file() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("config.toml");

    cargo_bin_cmd!("sluice")
        .env("SLUICE_HOME", dir.path())
        .args(["config", "init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created config at"));

    let contents = fs::read_to_string(&config_path).unwrap();
    assert!(contents.contains("trailing_backticks = \"flush\""));
    assert!(contents.contains("# file ="));
}

#[test]
fn test_config_init_fails_if_exists() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("config.toml"), "# existing config").unwrap();

    cargo_bin_cmd!("sluice")
        .env("SLUICE_HOME", dir.path())
        .args(["config", "init"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn test_config_show_reflects_file_values() {
    let dir = tempdir().unwrap();
    fs::write(
        dir.path().join("config.toml"),
        "[stream]\nunterminated_blocks = \"discard\"\n",
    )
    .unwrap();

    cargo_bin_cmd!("sluice")
        .env("SLUICE_HOME", dir.path())
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("unterminated_blocks = \"discard\""))
        .stdout(predicate::str::contains("trailing_backticks = \"flush\""));
}

#[test]
fn test_invalid_config_is_reported() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("config.toml"), "[stream\n").unwrap();

    cargo_bin_cmd!("sluice")
        .env("SLUICE_HOME", dir.path())
        .args(["config", "show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("load config"));
}
