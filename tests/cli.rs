use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn test_cli_help() {
    let mut cmd = Command::cargo_bin("labs-portal").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage: labs-portal <COMMAND>"))
        .stdout(predicate::str::contains("Commands:"))
        .stdout(predicate::str::contains("start"))
        .stdout(predicate::str::contains("chat"))
        .stdout(predicate::str::contains("--version"));
}

#[test]
fn test_cli_start_help() {
    let mut cmd = Command::cargo_bin("labs-portal").unwrap();
    cmd.arg("start")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage: labs-portal start"))
        .stdout(predicate::str::contains("--port <PORT>"))
        .stdout(predicate::str::contains("--bind <BIND>"))
        .stdout(predicate::str::contains("--api-base <API_BASE>"))
        .stdout(predicate::str::contains("--templates-dir <TEMPLATES_DIR>"))
        .stdout(predicate::str::contains("--static-dir <STATIC_DIR>"));
}

#[test]
fn test_cli_chat_help() {
    let mut cmd = Command::cargo_bin("labs-portal").unwrap();
    cmd.arg("chat")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage: labs-portal chat"))
        .stdout(predicate::str::contains("--model <MODEL>"))
        .stdout(predicate::str::contains("--temperature <TEMPERATURE>"))
        .stdout(predicate::str::contains("--system-prompt <SYSTEM_PROMPT>"));
}

#[test]
fn test_cli_no_command() {
    let mut cmd = Command::cargo_bin("labs-portal").unwrap();
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Usage: labs-portal <COMMAND>"));
}

#[test]
fn test_chat_without_api_key_asks_for_one() {
    let mut cmd = Command::cargo_bin("labs-portal").unwrap();
    cmd.arg("chat")
        .arg("--api-base")
        .arg("http://127.0.0.1:9")
        .write_stdin("\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Please add your OpenAI API key to continue."));
}

#[test]
fn test_chat_rejects_out_of_range_temperature() {
    let mut cmd = Command::cargo_bin("labs-portal").unwrap();
    cmd.arg("chat")
        .arg("--temperature")
        .arg("3.5")
        .assert()
        .failure()
        .stderr(predicate::str::contains("temperature must be between 0.0 and 2.0"));
}

#[test]
fn test_chat_reports_unreachable_service_and_keeps_going() {
    let mut cmd = Command::cargo_bin("labs-portal").unwrap();
    cmd.arg("chat")
        .arg("--api-base")
        .arg("http://127.0.0.1:9")
        .write_stdin("sk-test\n  Hello there\n/quit\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Error: "))
        .stdout(predicate::str::contains("Please check your API key and try again."))
        .stdout(predicate::str::contains("Please add your OpenAI API key to continue.").not());
}
