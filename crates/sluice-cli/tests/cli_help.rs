use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

#[test]
fn test_help_shows_all_commands() {
    cargo_bin_cmd!("sluice")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("split"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_split_help_shows_options() {
    cargo_bin_cmd!("sluice")
        .args(["split", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--chunk-size"))
        .stdout(predicate::str::contains("--format"))
        .stdout(predicate::str::contains("jsonl"));
}

#[test]
fn test_version_flag() {
    cargo_bin_cmd!("sluice")
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("0.1"));
}

#[test]
fn test_zero_chunk_size_is_rejected() {
    cargo_bin_cmd!("sluice")
        .args(["split", "--chunk-size", "0"])
        .assert()
        .failure();
}
