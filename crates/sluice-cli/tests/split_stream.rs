use std::fs;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::tempdir;

const REPLY: &str = "Run this:\n```sh\necho hi\n```\nThen check `out`.\n";

#[test]
fn test_split_stdin_text_mode() {
    let dir = tempdir().unwrap();

    cargo_bin_cmd!("sluice")
        .env("SLUICE_HOME", dir.path())
        .args(["split", "--chunk-size", "3"])
        .write_stdin(REPLY)
        .assert()
        .success()
        .stdout(predicate::str::contains("Run this:\n"))
        .stdout(predicate::str::contains(
            "--- block 1 [sh] ---\necho hi\n--- end block 1 ---\n",
        ))
        .stdout(predicate::str::contains("Then check `out`."));
}

#[test]
fn test_split_file_jsonl_mode() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("reply.md");
    fs::write(&input, REPLY).unwrap();

    let output = cargo_bin_cmd!("sluice")
        .env("SLUICE_HOME", dir.path())
        .args(["split", "--format", "jsonl", "--chunk-size", "1", "--file"])
        .arg(&input)
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    let updates: Vec<Value> = stdout
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(updates[0]["type"], "stream_started");

    let finished = updates.last().unwrap();
    assert_eq!(finished["type"], "stream_finished");
    assert_eq!(finished["text"], "Run this:\n\nThen check `out`.\n");
    assert_eq!(finished["termination"]["reason"], "completed");
    assert_eq!(finished["blocks"][0]["language"], "sh");
    assert_eq!(finished["blocks"][0]["content"], "```shecho hi\n");
}

#[test]
fn test_split_unterminated_block_is_sealed() {
    let dir = tempdir().unwrap();

    cargo_bin_cmd!("sluice")
        .env("SLUICE_HOME", dir.path())
        .arg("split")
        .write_stdin("partial ```py\nx = 1")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "--- block 1 [py] (unterminated) ---\nx = 1\n",
        ));
}

#[test]
fn test_split_discard_policy_from_config() {
    let dir = tempdir().unwrap();
    fs::write(
        dir.path().join("config.toml"),
        "[stream]\nunterminated_blocks = \"discard\"\n",
    )
    .unwrap();

    cargo_bin_cmd!("sluice")
        .env("SLUICE_HOME", dir.path())
        .arg("split")
        .write_stdin("partial ```py\nx = 1")
        .assert()
        .success()
        .stdout(predicate::str::contains("block").not())
        .stderr(predicate::str::contains("discarded"));
}

#[test]
fn test_split_missing_file_fails() {
    let dir = tempdir().unwrap();

    cargo_bin_cmd!("sluice")
        .env("SLUICE_HOME", dir.path())
        .args(["split", "--file"])
        .arg(dir.path().join("missing.md"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing.md"));
}
