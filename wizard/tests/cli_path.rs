//! CLI tests for path-driven `wizard` commands.
//!
//! Spawns the wizard binary against a scaffolded project and checks printed
//! paths and exit codes.

use std::process::{Command, Output};

use wizard::exit_codes;
use wizard::io::init::{InitOptions, init_wizard};

fn wizard(root: &std::path::Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_wizard"))
        .current_dir(root)
        .args(args)
        .output()
        .expect("run wizard")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

fn project() -> tempfile::TempDir {
    let temp = tempfile::tempdir().expect("tempdir");
    init_wizard(temp.path(), &InitOptions { force: false }).expect("init");
    temp
}

#[test]
fn init_twice_without_force_fails() {
    let temp = tempfile::tempdir().expect("tempdir");
    let first = wizard(temp.path(), &["init"]);
    assert_eq!(first.status.code(), Some(exit_codes::OK));
    let second = wizard(temp.path(), &["init"]);
    assert_eq!(second.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&second.stderr).contains("already exists"));
}

#[test]
fn validate_reports_sample_flow() {
    let temp = project();
    let output = wizard(temp.path(), &["validate"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert!(stdout(&output).starts_with("ok: 3 actions"));
}

/// `exec` prints the path of the state after the command and its advance.
#[test]
fn exec_prints_resulting_path() {
    let temp = project();
    let output = wizard(temp.path(), &["exec", "default", "individual:1"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert_eq!(stdout(&output), "/pick[individual:1]/edit");
}

#[test]
fn next_lists_reachable_actions() {
    let temp = project();
    let output = wizard(temp.path(), &["next", "--path", "/pick[individual:1]/edit"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert_eq!(stdout(&output), "pick");

    let output = wizard(
        temp.path(),
        &["next", "--path", "/pick[individual:1!approved]/edit"],
    );
    assert_eq!(stdout(&output), "review\npick");
}

#[test]
fn next_at_end_of_flow_exits_complete() {
    let temp = project();
    let output = wizard(
        temp.path(),
        &["next", "--path", "/pick[individual:1!approved]/edit/review"],
    );
    assert_eq!(output.status.code(), Some(exit_codes::COMPLETE));
    assert!(stdout(&output).is_empty());
}

#[test]
fn close_and_return_to_trim_the_path() {
    let temp = project();
    let path = "/pick[individual:1]/edit";
    let closed = wizard(temp.path(), &["close", "--path", path]);
    assert_eq!(stdout(&closed), "/pick[individual:1]");

    let returned = wizard(temp.path(), &["return-to", "--path", path, "pick"]);
    assert_eq!(stdout(&returned), "/pick[individual:1]");

    let root = wizard(temp.path(), &["close", "--path", path, "pick"]);
    assert_eq!(stdout(&root), "/");
}

#[test]
fn update_entity_rewrites_arguments() {
    let temp = project();
    let output = wizard(
        temp.path(),
        &[
            "update-entity",
            "--path",
            "/pick[individual:1]/edit",
            "individual:1",
            "individual:1!approved",
        ],
    );
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert_eq!(stdout(&output), "/pick[individual:1!approved]/edit");
}

#[test]
fn advance_follows_replace_jump() {
    let temp = project();
    let output = wizard(temp.path(), &["advance", "--path", "/pick[individual:1]/edit"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert_eq!(
        stdout(&output),
        "/pick.context[individual=~individual:1]"
    );
}

#[test]
fn show_prints_json_summary() {
    let temp = project();
    let output = wizard(temp.path(), &["show", "--path", "/pick[individual:1]/edit"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let summary: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("parse summary");
    assert_eq!(summary["path"], "/pick[individual:1]/edit");
    assert_eq!(summary["current"], "edit");
    assert_eq!(summary["positions"][0]["commands"][0], "default");
    assert_eq!(
        summary["positions"][1]["context"]["individual"]["id"],
        "1"
    );
}

#[test]
fn disallowed_path_fails_with_invalid_code() {
    let temp = project();
    let output = wizard(temp.path(), &["show", "--path", "/pick/edit"]);
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("replay path '/pick/edit'"));
    assert!(stderr.contains("edit"));
}
