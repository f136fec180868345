// CLI surface smoke tests: the binary advertises every workflow command.

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn help_lists_the_workflow_commands() {
    let mut cmd = Command::cargo_bin("custodian").unwrap();

    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("submit-request"))
        .stdout(predicate::str::contains("decide-request"))
        .stdout(predicate::str::contains("create-transfer"))
        .stdout(predicate::str::contains("decide-transfer"))
        .stdout(predicate::str::contains("add-item"))
        .stdout(predicate::str::contains("status"));
}

#[test]
fn decide_request_help_documents_the_decision_shape() {
    let mut cmd = Command::cargo_bin("custodian").unwrap();

    cmd.args(["decide-request", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("approve or reject"))
        .stdout(predicate::str::contains("--comment"))
        .stdout(predicate::str::contains("--allocate-item"));
}
