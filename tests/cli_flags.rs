use assert_cmd::Command;
use predicates::prelude::*;

fn podqa() -> Command {
    Command::cargo_bin("podqa").expect("podqa binary")
}

#[test]
fn prints_version() {
    podqa()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn prints_help() {
    podqa()
        .arg("-h")
        .assert()
        .success()
        .stdout(predicate::str::contains("podqa"))
        .stdout(predicate::str::contains("--base-url"))
        .stdout(predicate::str::contains("--mode"));
}

#[test]
fn rejects_unknown_flags() {
    podqa()
        .arg("--frobnicate")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unknown argument '--frobnicate'"));
}

#[test]
fn flag_without_value_is_rejected() {
    podqa()
        .arg("--podcast")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--podcast needs a value"));
}

#[test]
fn missing_config_file_fails_before_the_ui_starts() {
    let dir = tempfile::tempdir().unwrap();
    podqa()
        .arg("--config")
        .arg(dir.path().join("absent.yaml"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("load config"));
}
