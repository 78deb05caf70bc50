//! End-to-end tests for the blocktypec binary.
//!
//! Each test writes a workspace (and optionally an edit script and config)
//! to a temp directory, runs `blocktypec`, and asserts on its output.

use std::path::PathBuf;
use std::process::{Command, Output};

// ── Helpers ────────────────────────────────────────────────────────────

struct Project {
    dir: tempfile::TempDir,
}

impl Project {
    fn new() -> Self {
        Project {
            dir: tempfile::tempdir().expect("failed to create temp dir"),
        }
    }

    fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, content).expect("failed to write file");
        path
    }
}

fn blocktypec(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_blocktypec"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to invoke blocktypec")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

fn assert_success(output: &Output) {
    assert!(
        output.status.success(),
        "blocktypec failed:\nstdout: {}\nstderr: {}",
        stdout(output),
        stderr(output)
    );
}

const WORKSPACE: &str = r#"{
    "definitions": [
        { "block": 1, "name": "foo" },
        { "block": 4, "name": "draw", "returning": false }
    ],
    "callSites": [
        { "block": 2, "procedureName": "foo", "typeName": "Number" },
        { "block": 3, "procedureName": "foo" },
        { "block": 5, "procedureName": "draw", "returnsValue": false }
    ]
}"#;

// ── check ──────────────────────────────────────────────────────────────

#[test]
fn check_prints_inferred_types() {
    let project = Project::new();
    let workspace = project.write("workspace.json", WORKSPACE);

    let output = blocktypec(&["check", workspace.to_str().unwrap()]);
    assert_success(&output);
    insta::assert_snapshot!(stdout(&output).trim_end(), @r"
    def foo : Number
    def draw
    call #2 foo : Number
    call #3 foo : Number
    call #5 draw
    ");
}

#[test]
fn check_json_report() {
    let project = Project::new();
    let workspace = project.write("workspace.json", WORKSPACE);

    let output = blocktypec(&["check", workspace.to_str().unwrap(), "--json"]);
    assert_success(&output);
    let report: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(report["definitions"][0]["name"], "foo");
    assert_eq!(report["definitions"][0]["type"], "Number");
    assert_eq!(report["definitions"][1]["type"], serde_json::Value::Null);
    assert_eq!(report["calls"][1]["block"], 3);
    assert_eq!(report["calls"][1]["type"], "Number");
    assert_eq!(report["rejected"], serde_json::json!([]));
}

#[test]
fn check_fails_on_conflicting_workspace() {
    let project = Project::new();
    let workspace = project.write(
        "workspace.json",
        r#"{
            "definitions": [{ "block": 1, "name": "foo" }],
            "callSites": [
                { "block": 2, "procedureName": "foo", "typeName": "Number" },
                { "block": 3, "procedureName": "foo", "typeName": "Boolean" }
            ]
        }"#,
    );

    let output = blocktypec(&["check", workspace.to_str().unwrap()]);
    assert!(!output.status.success());
    assert_eq!(output.status.code(), Some(1));
    assert!(
        stderr(&output).contains("type conflict: expected `Number`, found `Boolean`"),
        "stderr: {}",
        stderr(&output)
    );
}

#[test]
fn check_reports_missing_workspace() {
    let output = blocktypec(&["check", "/nonexistent/workspace.json", "--json"]);
    assert_eq!(output.status.code(), Some(1));
    let error: serde_json::Value = serde_json::from_str(stderr(&output).trim()).unwrap();
    assert!(error["error"]
        .as_str()
        .unwrap()
        .starts_with("failed to read workspace"));
}

#[test]
fn check_rejects_bad_config() {
    let project = Project::new();
    let workspace = project.write("workspace.json", WORKSPACE);
    let config = project.write("blocktype.toml", "procedure_hue = \"purple\"");

    let output = blocktypec(&[
        "check",
        workspace.to_str().unwrap(),
        "--config",
        config.to_str().unwrap(),
    ]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("Failed to parse config"));
}

// ── replay ─────────────────────────────────────────────────────────────

#[test]
fn replay_applies_edits_in_order() {
    let project = Project::new();
    let workspace = project.write("workspace.json", r#"{ "definitions": [], "callSites": [] }"#);
    let script = project.write(
        "script.json",
        r#"[
            { "op": "create_definition", "block": 1, "name": "foo" },
            { "op": "create_call", "block": 2, "name": "foo" },
            { "op": "connect", "block": 2, "target": 10, "slot": "VALUE" },
            { "op": "plug_return", "definition": 1, "block": 3, "ty": "String" },
            { "op": "rename", "block": 1, "name": "greeting" },
            { "op": "spawn_reference", "source": 2, "block": 4 }
        ]"#,
    );

    let output = blocktypec(&[
        "replay",
        workspace.to_str().unwrap(),
        script.to_str().unwrap(),
    ]);
    assert_success(&output);
    insta::assert_snapshot!(stdout(&output).trim_end(), @r"
    def greeting : String
    call #2 greeting : String -> #10.VALUE
    call #4 greeting : String
    ");
}

#[test]
fn replay_records_rejected_edits_and_continues() {
    let project = Project::new();
    let workspace = project.write("workspace.json", WORKSPACE);
    let script = project.write(
        "script.json",
        r#"[
            { "op": "connect", "block": 3, "target": 10, "slot": "VALUE", "accepts": "String" },
            { "op": "create_definition", "block": 6, "name": "bar" },
            { "op": "rename", "block": 6, "name": "foo" }
        ]"#,
    );

    let output = blocktypec(&[
        "replay",
        workspace.to_str().unwrap(),
        script.to_str().unwrap(),
    ]);
    assert_success(&output);
    insta::assert_snapshot!(stdout(&output).trim_end(), @r"
    def foo : Number
    def draw
    def bar : ?1
    call #2 foo : Number
    call #3 foo : Number
    call #5 draw
    rejected step 1 (connect): type conflict: expected `Number`, found `String`
    rejected step 3 (rename): procedure `foo` is already defined in graph 0
    ");
}

#[test]
fn replay_plug_forces_reconnect() {
    let project = Project::new();
    let workspace = project.write("workspace.json", r#"{ "definitions": [], "callSites": [] }"#);
    let config = project.write("blocktype.toml", "detach_offset = { dx = -40.0, dy = 0.0 }");
    let script = project.write(
        "script.json",
        r#"[
            { "op": "create_definition", "block": 1, "name": "foo" },
            { "op": "create_call", "block": 2, "name": "foo" },
            { "op": "connect", "block": 2, "target": 10, "slot": "VALUE", "accepts": "Boolean" },
            { "op": "plug_return", "definition": 1, "block": 3, "ty": "Number" }
        ]"#,
    );

    let output = blocktypec(&[
        "replay",
        workspace.to_str().unwrap(),
        script.to_str().unwrap(),
        "--config",
        config.to_str().unwrap(),
        "--json",
    ]);
    assert_success(&output);
    let report: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(report["definitions"][0]["type"], "Number");
    assert_eq!(report["calls"][0]["type"], "Number");
    assert_eq!(report["calls"][0]["connected_to"], serde_json::Value::Null);
}

#[test]
fn replay_rejects_malformed_script() {
    let project = Project::new();
    let workspace = project.write("workspace.json", WORKSPACE);
    let script = project.write("script.json", r#"{ "op": "connect" }"#);

    let output = blocktypec(&[
        "replay",
        workspace.to_str().unwrap(),
        script.to_str().unwrap(),
    ]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("Failed to parse script"));
}
