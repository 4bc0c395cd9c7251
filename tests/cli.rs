use std::fs;
use std::process::{Command, Output};

fn cli(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_cli"))
        .args(args)
        .env("RUST_LOG", "error")
        .output()
        .expect("run cli")
}

fn stdout(output: &Output) -> String {
    assert!(
        output.status.success(),
        "cli failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn dump_access_policies_writes_statements() {
    let dir = tempfile::tempdir().expect("tempdir");
    let out = dir.path().join("policies.sql");
    let output = cli(&["dump-access-policies", "--out", out.to_str().unwrap()]);
    let summary = stdout(&output);
    assert!(summary.starts_with("Wrote "));

    let sql = fs::read_to_string(&out).expect("written file");
    assert!(sql.starts_with("-- generated by"));
    assert!(sql.contains("CREATE POLICY"));
    assert!(sql.contains("ON \"projects\""));
}

#[test]
fn explain_shows_rendered_filters() {
    let output = cli(&[
        "explain",
        "--resource",
        "Project",
        "--action",
        "read",
        "--role",
        "viewer",
    ]);
    let text = stdout(&output);
    assert!(text.contains("permission: member(viewer)"), "{text}");
    assert!(text.contains("cypher:"));
    assert!(text.contains("project_members"));

    let admin = stdout(&cli(&[
        "explain",
        "--resource",
        "Project",
        "--action",
        "delete",
        "--role",
        "admin",
    ]));
    assert_eq!(admin.trim(), "permission: true");
}

#[test]
fn explain_rejects_unknown_actions() {
    let output = cli(&["explain", "--resource", "Project", "--action", "archive"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown action"));
}

#[test]
fn powers_lists_create_rights() {
    let manager = stdout(&cli(&["powers", "--role", "project_manager"]));
    assert!(manager.lines().any(|line| line == "create:Project"));

    let nobody = stdout(&cli(&["powers"]));
    assert_eq!(nobody.trim(), "(no powers)");
}
