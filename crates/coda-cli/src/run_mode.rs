use std::thread;
use std::time::Duration;

use coda_api::{create_engine_from_xml, resolve_entry_script, CreateEngineFromXmlOptions};
use coda_runtime::ScriptOutcome;
use tracing::info;

use crate::{load_scripts_dir, CliError, RunArgs};

pub(crate) fn run_scripts(args: RunArgs) -> Result<i32, CliError> {
    let loaded = load_scripts_dir(&args.scripts_dir)?;
    info!(
        root = %loaded.root.display(),
        files = loaded.scripts_xml.len(),
        "scripts loaded"
    );
    let mut engine = create_engine_from_xml(CreateEngineFromXmlOptions {
        scripts_xml: loaded.scripts_xml,
        ..CreateEngineFromXmlOptions::default()
    })?;
    let names = engine
        .scripts()
        .iter()
        .map(|unit| unit.name.clone())
        .collect::<Vec<_>>();
    let entry = resolve_entry_script(&names, args.entry_script)?;

    let Some(repeat) = args.repeat else {
        let outcome = engine.run(&entry, Vec::new())?;
        emit_outcome(&outcome);
        return Ok(0);
    };

    for index in 0..repeat {
        if index > 0 && args.interval_ms > 0 {
            thread::sleep(Duration::from_millis(args.interval_ms));
        }
        let outcome = engine.run_background(&entry, Vec::new())?;
        emit_outcome(&outcome);
    }
    Ok(0)
}

fn emit_outcome(outcome: &ScriptOutcome) {
    for line in outcome_lines(outcome) {
        println!("{}", line);
    }
}

pub(crate) fn outcome_lines(outcome: &ScriptOutcome) -> Vec<String> {
    let mut lines = vec![
        "RESULT:OK".to_string(),
        format!(
            "VALUE:{}",
            serde_json::to_string(&outcome.value).unwrap_or_else(|_| "null".to_string())
        ),
        format!("STEPS:{}", outcome.steps),
    ];
    for cause in &outcome.degraded_calls {
        lines.push(format!(
            "DEGRADED:{}|{}",
            cause.code(),
            serde_json::to_string(&cause.message).unwrap_or_else(|_| "\"\"".to_string())
        ));
    }
    lines
}
