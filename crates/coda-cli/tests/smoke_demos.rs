use std::fs;
use std::process::Command;

#[test]
fn run_executes_all_demo_scripts() {
    let bin = env!("CARGO_BIN_EXE_coda-cli");
    let manifest_dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR"));
    let demos_root = manifest_dir
        .join("..")
        .join("..")
        .join("demos")
        .join("scripts");

    let mut directories = fs::read_dir(&demos_root)
        .expect("demos root must exist")
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect::<Vec<_>>();
    directories.sort();

    assert!(!directories.is_empty(), "expected demo scripts");

    for directory in directories {
        let raw = fs::read_to_string(directory.join("testcase.json")).expect("testcase");
        let case: serde_json::Value = serde_json::from_str(&raw).expect("testcase json");
        let runs = case["runs"].as_array().map(Vec::len).unwrap_or(1);
        let expected_error = case["runs"][0]["errorCode"].as_str().map(str::to_string);

        let mut command = Command::new(bin);
        command.arg("run").arg("--scripts-dir").arg(&directory);
        if case["background"].as_bool() == Some(true) {
            command.arg("--repeat").arg(runs.to_string());
        }
        let output = command.output().expect("cli should execute");
        let stdout = String::from_utf8_lossy(&output.stdout);

        match expected_error {
            Some(code) => {
                assert_eq!(output.status.code(), Some(1), "{}", directory.display());
                assert!(stdout.contains("RESULT:ERROR"), "{}", stdout);
                assert!(stdout.contains(&format!("ERROR_CODE:{}", code)), "{}", stdout);
            }
            None => {
                if !output.status.success() {
                    panic!(
                        "demo {} failed\nstdout:\n{}\nstderr:\n{}",
                        directory.display(),
                        stdout,
                        String::from_utf8_lossy(&output.stderr)
                    );
                }
                let expected_runs = if case["background"].as_bool() == Some(true) {
                    runs
                } else {
                    1
                };
                assert_eq!(
                    stdout.matches("RESULT:OK").count(),
                    expected_runs,
                    "{}",
                    stdout
                );
                assert!(stdout.contains("VALUE:"), "{}", stdout);
            }
        }
    }
}

#[test]
fn docs_prints_json_reference() {
    let output = Command::new(env!("CARGO_BIN_EXE_coda-cli"))
        .arg("docs")
        .output()
        .expect("cli should execute");
    assert!(output.status.success());
    let docs: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("docs should be json");
    let names = docs
        .as_array()
        .expect("array")
        .iter()
        .filter_map(|doc| doc["name"].as_str())
        .collect::<Vec<_>>();
    assert!(names.contains(&"FormatNumber"));
    assert!(names.contains(&"PrintToConsole"));
}
