use assert_cmd::Command;
use predicates::prelude::*;
use std::fs::write;
use tempfile::NamedTempFile;

#[test]
fn help_lists_every_subcommand() {
    let mut cmd = Command::cargo_bin("shot-lifter").expect("Binary exists");
    cmd.arg("--help");
    cmd.assert().success().stdout(
        predicate::str::contains("upload")
            .and(predicate::str::contains("list"))
            .and(predicate::str::contains("create-bucket"))
            .and(predicate::str::contains("delete-bucket")),
    );
}

#[test]
fn upload_fails_cleanly_when_config_is_missing() {
    let mut cmd = Command::cargo_bin("shot-lifter").expect("Binary exists");
    cmd.args(["upload", "--config", "/nonexistent/lifter.yaml"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read config file"));
}

#[test]
fn list_fails_cleanly_without_a_bucket() {
    let config = NamedTempFile::new().expect("Creating temp config file failed");
    write(config.path(), b"upload:\n  source_dir: ./screenshots\n").expect("Writing temp config failed");

    let mut cmd = Command::cargo_bin("shot-lifter").expect("Binary exists");
    cmd.arg("list")
        .arg("--config")
        .arg(config.path())
        .env_remove("LIFTER_BUCKET");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("LIFTER_BUCKET"));
}

#[test]
fn upload_bucket_flag_supplies_a_bucket_missing_from_config() {
    let config = NamedTempFile::new().expect("Creating temp config file failed");
    write(
        config.path(),
        b"upload:\n  source_dir: /nonexistent/screenshots\nstore:\n  region: eu-west-1\n",
    )
    .expect("Writing temp config failed");

    // The missing source dir stops the run before any request is sent.
    let mut cmd = Command::cargo_bin("shot-lifter").expect("Binary exists");
    cmd.arg("upload")
        .arg("--config")
        .arg(config.path())
        .args(["--bucket", "mybucket"])
        .env_remove("LIFTER_BUCKET")
        .env("AWS_EC2_METADATA_DISABLED", "true")
        .env("AWS_ACCESS_KEY_ID", "test")
        .env("AWS_SECRET_ACCESS_KEY", "test");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Upload aborted"))
        .stderr(predicate::str::contains("must be set").not());
}

#[test]
fn get_requires_a_key() {
    let mut cmd = Command::cargo_bin("shot-lifter").expect("Binary exists");
    cmd.args(["get", "--config", "lifter.yaml"]);
    cmd.assert().failure();
}
