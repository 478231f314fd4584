use assert_cmd::Command;
use predicates::prelude::*;

fn ssm() -> Command {
    assert_cmd::cargo::cargo_bin_cmd!("ssm")
}

#[test]
fn test_help_lists_commands() {
    ssm()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("ls"))
        .stdout(predicate::str::contains("get"))
        .stdout(predicate::str::contains("set"))
        .stdout(predicate::str::contains("rm"))
        .stdout(predicate::str::contains("--profile"));
}

#[test]
fn test_version_flag() {
    ssm()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_show_history_requires_secrets() {
    ssm()
        .args(["ls", "--show-history"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--secrets"));
}

#[test]
fn test_set_requires_value() {
    ssm()
        .args(["set", "/app/prod/version"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("VALUE"));
}

#[test]
fn test_get_requires_key() {
    ssm().arg("get").assert().failure();
}
