use std::fs;
use std::path::PathBuf;

use coda_core::{CodaError, CodaValue, ErrorKind};
use coda_runtime::ScriptOutcome;

use super::*;

fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "coda-cli-{}-{}",
        name,
        std::process::id()
    ));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

#[test]
fn reads_only_script_files_with_relative_keys() {
    let dir = temp_dir("loader");
    fs::create_dir_all(dir.join("lib")).expect("nested dir");
    fs::write(dir.join("main.script.xml"), "<script name=\"main\"/>").expect("write");
    fs::write(dir.join("lib/sum.script.xml"), "<script name=\"sum\"/>").expect("write");
    fs::write(dir.join("notes.json"), "{}").expect("write");

    let scripts = read_scripts_xml_from_dir(&dir).expect("read");
    assert_eq!(
        scripts.keys().cloned().collect::<Vec<_>>(),
        vec!["lib/sum.script.xml".to_string(), "main.script.xml".to_string()]
    );
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn loader_reports_missing_empty_and_file_paths() {
    let missing = resolve_scripts_dir("/definitely/not/here/coda").expect_err("missing");
    assert_eq!(missing.code, "CLI_SOURCE_NOT_FOUND");

    let dir = temp_dir("empty");
    let empty = read_scripts_xml_from_dir(&dir).expect_err("empty");
    assert_eq!(empty.code, "CLI_SOURCE_EMPTY");

    let file = dir.join("plain.txt");
    fs::write(&file, "x").expect("write");
    let not_dir = resolve_scripts_dir(&file.to_string_lossy()).expect_err("file");
    assert_eq!(not_dir.code, "CLI_SOURCE_NOT_DIR");
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn outcome_lines_report_value_steps_and_degradations() {
    let lines = run_mode::outcome_lines(&ScriptOutcome {
        value: CodaValue::Numeric(5.0),
        steps: 12,
        degraded_calls: vec![CodaError::new(ErrorKind::CallFailure, "missing \"x\"")],
    });
    assert_eq!(
        lines,
        vec![
            "RESULT:OK".to_string(),
            "VALUE:{\"type\":\"numeric\",\"value\":5.0}".to_string(),
            "STEPS:12".to_string(),
            "DEGRADED:CALL_FAILURE|\"missing \\\"x\\\"\"".to_string(),
        ]
    );
}

#[test]
fn docs_render_as_json_and_html() {
    let table = CommandTable::with_general_commands().expect("table");
    let json = docs::render_docs(&table, DocsFormat::Json).expect("json");
    let parsed: serde_json::Value = serde_json::from_str(&json).expect("valid json");
    assert_eq!(parsed.as_array().map(Vec::len), Some(7));
    assert_eq!(parsed[0]["name"], "Return");

    let html = docs::render_docs(&table, DocsFormat::Html).expect("html");
    assert!(html.contains("<h2 id=\"cmd-FormatNumber\">FormatNumber"));
}

#[test]
fn run_reports_script_errors_with_exit_code() {
    let dir = temp_dir("run-error");
    fs::write(
        dir.join("main.script.xml"),
        "<script name=\"main\">\n  <command name=\"Teleport\"/>\n</script>",
    )
    .expect("write");
    let dir_arg = dir.to_string_lossy().to_string();
    let code = run_cli_from_args(["coda-cli", "run", "--scripts-dir", dir_arg.as_str()]);
    assert_eq!(code, 1);
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn run_succeeds_for_repeated_background_runs() {
    let dir = temp_dir("run-repeat");
    fs::write(
        dir.join("main.script.xml"),
        "<script name=\"main\">\n  <command name=\"GetSecondsPassed\" into=\"t\"/>\n  <command name=\"Return\"><arg>t</arg></command>\n</script>",
    )
    .expect("write");
    let dir_arg = dir.to_string_lossy().to_string();
    let code = run_cli_from_args([
        "coda-cli",
        "run",
        "--scripts-dir",
        dir_arg.as_str(),
        "--repeat",
        "2",
    ]);
    assert_eq!(code, 0);
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn bad_arguments_return_clap_exit_code() {
    assert_eq!(run_cli_from_args(["coda-cli", "run"]), 2);
    assert_eq!(
        run_cli_from_args(["coda-cli", "docs", "--format", "pdf"]),
        2
    );
    assert_eq!(
        run_cli_from_args(["coda-cli", "run", "--scripts-dir", ".", "--repeat", "0"]),
        2
    );
}
