use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use coda_api::{create_engine_from_xml, CreateEngineFromXmlOptions};
use coda_core::CodaValue;
use coda_runtime::{BufferedSink, ManualClock};
use serde::Serialize;

use crate::source::{read_scripts_xml_from_dir, read_test_case};
use crate::{CodaToolError, ExpectedRun, TestCase};

const MAX_STEPS: usize = 50_000;

#[derive(Debug, Clone, PartialEq)]
pub struct ObservedRun {
    pub console: Vec<String>,
    pub result: Option<CodaValue>,
    pub degraded: Vec<String>,
    pub error_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub runs: Vec<ObservedRun>,
}

/// Runs the entry script once per expected run against a manual clock.
/// Engine failures inside a run are recorded, not returned.
pub fn run_case(demo_dir: &Path, case: &TestCase) -> Result<RunReport, CodaToolError> {
    if case.runs.is_empty() {
        return Err(CodaToolError::NoRuns);
    }

    let mut advances = Vec::with_capacity(case.runs.len());
    for (index, expected) in case.runs.iter().enumerate() {
        advances.push(advance_duration(index, expected.advance_seconds)?);
    }

    let scripts_xml = read_scripts_xml_from_dir(demo_dir)?;
    let sink = Arc::new(BufferedSink::new());
    let clock = Arc::new(ManualClock::default());
    let mut engine = create_engine_from_xml(CreateEngineFromXmlOptions {
        scripts_xml,
        sink: Some(sink.clone()),
        clock: Some(clock.clone()),
        max_steps: Some(MAX_STEPS),
        ..CreateEngineFromXmlOptions::default()
    })?;

    let mut runs = Vec::with_capacity(case.runs.len());
    for advance in advances {
        if !advance.is_zero() {
            clock.advance(advance);
        }
        let outcome = if case.background {
            engine.run_background(&case.entry_script, case.entry_args.clone())
        } else {
            engine.run(&case.entry_script, case.entry_args.clone())
        };
        let console = sink.take();
        runs.push(match outcome {
            Ok(outcome) => ObservedRun {
                console,
                result: Some(outcome.value),
                degraded: outcome
                    .degraded_calls
                    .iter()
                    .map(|cause| cause.code().to_string())
                    .collect(),
                error_code: None,
            },
            Err(error) => ObservedRun {
                console,
                result: None,
                degraded: Vec::new(),
                error_code: Some(error.code().to_string()),
            },
        });
    }

    Ok(RunReport { runs })
}

pub fn assert_case(demo_dir: &Path, case_path: &Path) -> Result<(), CodaToolError> {
    let case = read_test_case(case_path)?;
    let report = run_case(demo_dir, &case)?;

    for (index, (expected, actual)) in case.runs.iter().zip(report.runs.iter()).enumerate() {
        assert_run(index, expected, actual)?;
    }

    Ok(())
}

fn assert_run(run: usize, expected: &ExpectedRun, actual: &ObservedRun) -> Result<(), CodaToolError> {
    if let Some(code) = &expected.error_code {
        if actual.error_code.is_none() {
            return Err(CodaToolError::UnexpectedSuccess {
                run,
                expected: code.clone(),
            });
        }
    }
    compare(run, "errorCode", &expected.error_code, &actual.error_code)?;
    compare(run, "console", &expected.console, &actual.console)?;
    if expected.error_code.is_none() {
        if let Some(result) = &expected.result {
            compare(run, "result", &Some(result), &actual.result.as_ref())?;
        }
        compare(run, "degraded", &expected.degraded, &actual.degraded)?;
    }
    Ok(())
}

fn compare<T: PartialEq + Serialize>(
    run: usize,
    field: &'static str,
    expected: &T,
    actual: &T,
) -> Result<(), CodaToolError> {
    if expected == actual {
        return Ok(());
    }
    Err(CodaToolError::RunMismatch {
        run,
        field,
        expected: serde_json::to_string(expected).map_err(CodaToolError::ValueSerialize)?,
        actual: serde_json::to_string(actual).map_err(CodaToolError::ValueSerialize)?,
    })
}

fn advance_duration(run: usize, seconds: f64) -> Result<Duration, CodaToolError> {
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(CodaToolError::InvalidAdvance { run, seconds });
    }
    Duration::try_from_secs_f64(seconds).map_err(|_| CodaToolError::InvalidAdvance { run, seconds })
}
