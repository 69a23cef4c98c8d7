mod step;

use std::collections::BTreeMap;
use std::sync::Arc;

use coda_core::{Arity, CodaError, CodaValue, ErrorKind, ScriptUnit};
use tracing::info;

use crate::clock::{Clock, SystemClock};
use crate::context::{ExecutionContext, ScriptTimer};
use crate::dispatcher::{Dispatcher, ScriptLibrary, ScriptRegistry, DEFAULT_MAX_CALL_DEPTH};
use crate::eval::{ExpressionEvaluator, RhaiEvaluator};
use crate::matcher::match_arguments;
use crate::registry::CommandTable;
use crate::sink::{ConsoleSink, OutputSink};

pub const DEFAULT_MAX_STEPS: usize = 100_000;

#[derive(Default)]
pub struct EngineOptions {
    pub scripts: BTreeMap<String, ScriptUnit>,
    /// Defaults to the general command set.
    pub commands: Option<CommandTable>,
    pub sink: Option<Arc<dyn OutputSink>>,
    pub clock: Option<Arc<dyn Clock>>,
    pub evaluator: Option<Box<dyn ExpressionEvaluator>>,
    pub max_steps: Option<usize>,
    pub max_call_depth: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScriptOutcome {
    pub value: CodaValue,
    pub steps: usize,
    /// Calls that fell back to a zero value instead of aborting the run.
    pub degraded_calls: Vec<CodaError>,
}

pub struct CodaEngine {
    dispatcher: Dispatcher,
    library: Arc<ScriptLibrary>,
    evaluator: Box<dyn ExpressionEvaluator>,
    timers: BTreeMap<String, ScriptTimer>,
    max_steps: usize,
}

impl CodaEngine {
    /// Builds an engine and checks that every command used by every script
    /// resolves against the command table.
    pub fn new(options: EngineOptions) -> Result<Self, CodaError> {
        let table = match options.commands {
            Some(table) => table,
            None => CommandTable::with_general_commands()?,
        };

        for unit in options.scripts.values() {
            for (name, location) in unit.command_names() {
                if !table.contains(name) {
                    return Err(CodaError::with_span(
                        ErrorKind::UnknownCommand,
                        format!(
                            "Script \"{}\" ({}) uses unknown command \"{}\".",
                            unit.name, unit.source_path, name
                        ),
                        location.clone(),
                    ));
                }
            }
        }

        let library = Arc::new(ScriptLibrary::from_units(options.scripts));
        let sink = options.sink.unwrap_or_else(|| Arc::new(ConsoleSink));
        let clock = options
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock::default()));
        let registry: Arc<dyn ScriptRegistry> = library.clone();
        let dispatcher = Dispatcher::new(Arc::new(table), registry, sink, clock)
            .with_max_call_depth(options.max_call_depth.unwrap_or(DEFAULT_MAX_CALL_DEPTH));

        info!(
            scripts = library.len(),
            commands = dispatcher.table().len(),
            "engine ready"
        );

        Ok(Self {
            dispatcher,
            library,
            evaluator: options
                .evaluator
                .unwrap_or_else(|| Box::new(RhaiEvaluator::new())),
            timers: BTreeMap::new(),
            max_steps: options.max_steps.unwrap_or(DEFAULT_MAX_STEPS).max(1),
        })
    }

    pub fn commands(&self) -> &CommandTable {
        self.dispatcher.table()
    }

    pub fn scripts(&self) -> &ScriptLibrary {
        &self.library
    }

    /// Runs `name` once with a fresh timer.
    pub fn run(&self, name: &str, args: Vec<CodaValue>) -> Result<ScriptOutcome, CodaError> {
        let (unit, locals) = self.prepare(name, args)?;
        let mut context = ExecutionContext::new(unit, locals, ScriptTimer::new());
        self.execute(&mut context)
    }

    /// Runs `name` as a background script: every `GetSecondsPassed` timer,
    /// the entry script's and those of scripts it calls, carries over from
    /// the previous background run.
    pub fn run_background(
        &mut self,
        name: &str,
        args: Vec<CodaValue>,
    ) -> Result<ScriptOutcome, CodaError> {
        let (unit, locals) = self.prepare(name, args)?;
        let timers = std::mem::take(&mut self.timers);
        let mut context =
            ExecutionContext::new(unit, locals, ScriptTimer::new()).with_timers(timers);
        let outcome = self.execute(&mut context);
        self.timers = context.into_timers();
        outcome
    }

    pub fn timer(&self, name: &str) -> Option<&ScriptTimer> {
        self.timers.get(name)
    }

    fn prepare(
        &self,
        name: &str,
        args: Vec<CodaValue>,
    ) -> Result<(Arc<ScriptUnit>, BTreeMap<String, CodaValue>), CodaError> {
        let Some(unit) = self.library.lookup(name) else {
            return Err(CodaError::new(
                ErrorKind::Runtime,
                format!("Script \"{}\" is not loaded.", name),
            ));
        };
        let signature = Arity::Standard {
            params: unit.signature(),
        };
        let bindings = match_arguments(&unit.name, &signature, args)?;
        let locals = unit
            .params
            .iter()
            .map(|param| param.name.clone())
            .zip(bindings.into_values())
            .collect();
        Ok((unit, locals))
    }
}
