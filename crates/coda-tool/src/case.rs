use coda_core::CodaValue;
use serde::{Deserialize, Serialize};

pub const TESTCASE_SCHEMA_V1: &str = "coda-tool-case.v1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub schema_version: String,
    #[serde(default = "default_entry_script")]
    pub entry_script: String,
    #[serde(default)]
    pub entry_args: Vec<CodaValue>,
    /// Runs share one background timer when set.
    #[serde(default)]
    pub background: bool,
    pub runs: Vec<ExpectedRun>,
}

fn default_entry_script() -> String {
    "main".to_string()
}

/// Expectations for one invocation of the entry script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpectedRun {
    /// Seconds the test clock moves forward before the run starts.
    #[serde(default)]
    pub advance_seconds: f64,
    #[serde(default)]
    pub console: Vec<String>,
    #[serde(default)]
    pub result: Option<CodaValue>,
    /// Error codes of calls that degraded to a zero value.
    #[serde(default)]
    pub degraded: Vec<String>,
    #[serde(default)]
    pub error_code: Option<String>,
}

#[cfg(test)]
mod case_tests {
    use super::*;

    #[test]
    fn default_entry_script_returns_main() {
        assert_eq!(default_entry_script(), "main");
    }

    #[test]
    fn testcase_deserialize_applies_defaults() {
        let parsed: TestCase = serde_json::from_str(
            r#"{
  "schemaVersion": "coda-tool-case.v1",
  "runs": [{}]
}"#,
        )
        .expect("testcase should deserialize");

        assert_eq!(parsed.schema_version, TESTCASE_SCHEMA_V1);
        assert_eq!(parsed.entry_script, "main");
        assert!(parsed.entry_args.is_empty());
        assert!(!parsed.background);
        assert_eq!(parsed.runs.len(), 1);
        assert_eq!(parsed.runs[0].advance_seconds, 0.0);
        assert!(parsed.runs[0].result.is_none());
        assert!(parsed.runs[0].error_code.is_none());
    }

    #[test]
    fn expected_values_use_tagged_json() {
        let parsed: ExpectedRun = serde_json::from_str(
            r#"{
  "advanceSeconds": 1.5,
  "console": ["a"],
  "result": {"type": "numeric", "value": 5},
  "degraded": ["CALL_FAILURE"]
}"#,
        )
        .expect("run should deserialize");

        assert_eq!(parsed.advance_seconds, 1.5);
        assert_eq!(parsed.result, Some(CodaValue::Numeric(5.0)));
        assert_eq!(parsed.degraded, vec!["CALL_FAILURE".to_string()]);
    }
}
