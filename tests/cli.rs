//! CLI test cases.
//!
//! Everything here runs without the network. The submit/poll protocol is
//! exercised against a scripted fake transport in the unit tests; these
//! tests cover argument handling and the surfaces that fail before any
//! request goes out.

use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;

/// Create a new `Command` with our binary, with service configuration
/// scrubbed from the environment.
fn cmd() -> Command {
    let mut cmd = Command::cargo_bin("docintel").unwrap();
    cmd.env_remove("DOCINTEL_ENDPOINT");
    cmd.env_remove("DOCINTEL_KEY");
    cmd
}

#[test]
fn test_help() {
    cmd().arg("--help").assert().success();
}

#[test]
fn test_version() {
    cmd().arg("--version").assert().success();
}

#[test]
fn test_schema_analyze_result() {
    cmd()
        .arg("schema")
        .arg("AnalyzeResult")
        .assert()
        .success()
        .stdout(predicate::str::contains("AnalyzeResult"))
        .stdout(predicate::str::contains("selectionMarks"));
}

#[test]
fn test_schema_status_record() {
    cmd()
        .arg("schema")
        .arg("StatusRecord")
        .assert()
        .success()
        .stdout(predicate::str::contains("StatusRecord"));
}

#[test]
fn test_analyze_requires_a_source() {
    cmd().arg("analyze").assert().failure();
}

#[test]
fn test_analyze_requires_configuration() {
    cmd()
        .arg("analyze")
        .arg("https://example.test/form.pdf")
        .assert()
        .failure()
        .stderr(predicate::str::contains("DOCINTEL_ENDPOINT"));
}

#[test]
fn test_bad_rate_limits_are_rejected() {
    cmd()
        .env("DOCINTEL_ENDPOINT", "https://example.test")
        .env("DOCINTEL_KEY", "not-a-real-key")
        .arg("analyze")
        .arg("form.pdf")
        .args(["--rate-limit", "banana"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("rate limit"));
}

#[test]
fn test_bad_poll_options_are_rejected() {
    cmd()
        .env("DOCINTEL_ENDPOINT", "https://example.test")
        .env("DOCINTEL_KEY", "not-a-real-key")
        .arg("analyze")
        .arg("form.pdf")
        .arg("--timeout=-5")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--timeout"));
}

#[test]
fn test_missing_local_files_fail_cleanly() {
    cmd()
        .env("DOCINTEL_ENDPOINT", "https://example.test")
        .env("DOCINTEL_KEY", "not-a-real-key")
        .arg("analyze")
        .arg("no-such-document.pdf")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no-such-document.pdf"));
}
