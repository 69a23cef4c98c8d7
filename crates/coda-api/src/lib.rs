use std::collections::BTreeMap;
use std::sync::Arc;

use coda_core::{CodaError, CodaValue, ErrorKind, ScriptUnit};
use coda_parser::parse_script_units;
use coda_runtime::{
    Clock, CodaEngine, CommandTable, EngineOptions, OutputSink, ScriptOutcome,
};

pub use coda_parser::SCRIPT_FILE_SUFFIX;

#[derive(Default)]
pub struct CreateEngineFromXmlOptions {
    pub scripts_xml: BTreeMap<String, String>,
    pub commands: Option<CommandTable>,
    pub sink: Option<Arc<dyn OutputSink>>,
    pub clock: Option<Arc<dyn Clock>>,
    pub max_steps: Option<usize>,
    pub max_call_depth: Option<usize>,
}

pub struct RunScriptFromXmlOptions {
    pub engine: CreateEngineFromXmlOptions,
    pub entry_script: Option<String>,
    pub entry_args: Vec<CodaValue>,
}

pub fn load_scripts_from_xml_map(
    scripts_xml: &BTreeMap<String, String>,
) -> Result<BTreeMap<String, ScriptUnit>, CodaError> {
    parse_script_units(scripts_xml)
}

pub fn create_engine_from_xml(
    options: CreateEngineFromXmlOptions,
) -> Result<CodaEngine, CodaError> {
    let scripts = load_scripts_from_xml_map(&options.scripts_xml)?;
    CodaEngine::new(EngineOptions {
        scripts,
        commands: options.commands,
        sink: options.sink,
        clock: options.clock,
        evaluator: None,
        max_steps: options.max_steps,
        max_call_depth: options.max_call_depth,
    })
}

/// Loads the scripts and runs the entry script once. The entry defaults to
/// the script named `main`.
pub fn run_script_from_xml(options: RunScriptFromXmlOptions) -> Result<ScriptOutcome, CodaError> {
    let engine = create_engine_from_xml(options.engine)?;
    let entry = resolve_entry_script(
        &engine.scripts().iter().map(|unit| unit.name.clone()).collect::<Vec<_>>(),
        options.entry_script,
    )?;
    engine.run(&entry, options.entry_args)
}

pub fn resolve_entry_script(names: &[String], explicit: Option<String>) -> Result<String, CodaError> {
    if let Some(entry) = explicit {
        if !names.contains(&entry) {
            return Err(CodaError::new(
                ErrorKind::Runtime,
                format!("Entry script \"{}\" is not loaded.", entry),
            ));
        }
        return Ok(entry);
    }

    if names.iter().any(|name| name == "main") {
        return Ok("main".to_string());
    }

    Err(CodaError::new(
        ErrorKind::Runtime,
        "Expected a script with name=\"main\" as default entry.",
    ))
}
