mod case;
mod demos;
mod runner;
mod source;

pub use case::{ExpectedRun, TestCase, TESTCASE_SCHEMA_V1};
pub use demos::{demo_dir, demo_dirs, demos_root, testcase_path, workspace_root};
pub use runner::{assert_case, run_case, ObservedRun, RunReport};
pub use source::{read_scripts_xml_from_dir, read_test_case};

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodaToolError {
    #[error("Failed to read file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse testcase {path}: {source}")]
    ParseCase {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Invalid testcase schema version \"{found}\", expected \"{expected}\".")]
    InvalidSchemaVersion { expected: String, found: String },
    #[error("No .script.xml files under {path}.")]
    SourceEmpty { path: PathBuf },
    #[error("Testcase declares no runs.")]
    NoRuns,
    #[error("Run {run} advances the clock by {seconds} seconds.")]
    InvalidAdvance { run: usize, seconds: f64 },
    #[error("Engine error: {0}")]
    Engine(#[from] coda_core::CodaError),
    #[error("Run {run} expected error {expected}, but it succeeded.")]
    UnexpectedSuccess { run: usize, expected: String },
    #[error("Run {run} mismatch in {field}. expected={expected} actual={actual}")]
    RunMismatch {
        run: usize,
        field: &'static str,
        expected: String,
        actual: String,
    },
    #[error("Failed to serialize value for diff: {0}")]
    ValueSerialize(serde_json::Error),
}
