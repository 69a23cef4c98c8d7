use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use coda_api::SCRIPT_FILE_SUFFIX;
use walkdir::WalkDir;

use crate::{CodaToolError, TestCase, TESTCASE_SCHEMA_V1};

pub fn read_scripts_xml_from_dir(
    demo_dir: &Path,
) -> Result<BTreeMap<String, String>, CodaToolError> {
    let mut scripts = BTreeMap::new();

    for entry in WalkDir::new(demo_dir)
        .follow_links(false)
        .into_iter()
        .filter_map(Result::ok)
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        if !path.to_string_lossy().ends_with(SCRIPT_FILE_SUFFIX) {
            continue;
        }

        let Ok(relative) = path.strip_prefix(demo_dir) else {
            continue;
        };
        let relative = relative.to_string_lossy().replace('\\', "/");

        let content = fs::read_to_string(path).map_err(|source| CodaToolError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        scripts.insert(relative, content);
    }

    if scripts.is_empty() {
        return Err(CodaToolError::SourceEmpty {
            path: demo_dir.to_path_buf(),
        });
    }

    Ok(scripts)
}

pub fn read_test_case(case_path: &Path) -> Result<TestCase, CodaToolError> {
    let raw = fs::read_to_string(case_path).map_err(|source| CodaToolError::ReadFile {
        path: case_path.to_path_buf(),
        source,
    })?;
    let parsed: TestCase =
        serde_json::from_str(&raw).map_err(|source| CodaToolError::ParseCase {
            path: case_path.to_path_buf(),
            source,
        })?;

    if parsed.schema_version != TESTCASE_SCHEMA_V1 {
        return Err(CodaToolError::InvalidSchemaVersion {
            expected: TESTCASE_SCHEMA_V1.to_string(),
            found: parsed.schema_version,
        });
    }

    Ok(parsed)
}

#[cfg(test)]
mod source_tests {
    use super::*;

    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(name: &str) -> std::path::PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time should move forward")
            .as_nanos();
        std::env::temp_dir().join(format!("coda-tool-{}-{}", name, nanos))
    }

    fn write_file(path: &Path, content: &str) {
        let parent = path.parent().expect("path should have parent");
        fs::create_dir_all(parent).expect("parent dir should be created");
        fs::write(path, content).expect("file should be written");
    }

    #[test]
    fn read_scripts_xml_from_dir_collects_script_files_only() {
        let root = temp_dir("scripts");
        write_file(&root.join("main.script.xml"), "<script name=\"main\"/>");
        write_file(&root.join("lib/util.script.xml"), "<script name=\"util\"/>");
        write_file(&root.join("testcase.json"), "{}");

        let files = read_scripts_xml_from_dir(&root).expect("scan should pass");
        assert_eq!(files.len(), 2);
        assert!(files.contains_key("main.script.xml"));
        assert!(files.contains_key("lib/util.script.xml"));
    }

    #[test]
    fn read_scripts_xml_from_dir_fails_when_no_scripts() {
        let root = temp_dir("empty");
        write_file(&root.join("readme.txt"), "nothing");
        let error = read_scripts_xml_from_dir(&root).expect_err("empty dir should fail");
        assert!(matches!(error, CodaToolError::SourceEmpty { .. }));
    }

    #[test]
    fn read_test_case_checks_schema_and_json() {
        let root = temp_dir("cases");
        let bad_schema = root.join("bad-schema.json");
        write_file(&bad_schema, r#"{"schemaVersion":"v0","runs":[]}"#);
        let error = read_test_case(&bad_schema).expect_err("schema should fail");
        assert!(matches!(error, CodaToolError::InvalidSchemaVersion { .. }));

        let broken = root.join("broken.json");
        write_file(&broken, "{");
        let error = read_test_case(&broken).expect_err("json should fail");
        assert!(matches!(error, CodaToolError::ParseCase { .. }));

        let missing = read_test_case(&root.join("missing.json")).expect_err("missing");
        assert!(matches!(missing, CodaToolError::ReadFile { .. }));
    }
}
