use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use coda_core::{Arity, CodaError, CodaValue, DataType, ErrorKind, ScriptUnit};
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::context::{ExecutionContext, FrameExit, ResumePoint};
use crate::matcher::{match_arguments, Bindings};
use crate::registry::{CommandDescriptor, CommandTable};
use crate::sink::OutputSink;

pub const DEFAULT_MAX_CALL_DEPTH: usize = 64;

/// Script lookup used by `Call`.
pub trait ScriptRegistry: Send + Sync {
    fn lookup(&self, name: &str) -> Option<Arc<ScriptUnit>>;
    fn names(&self) -> Vec<String>;
}

#[derive(Debug, Default, Clone)]
pub struct ScriptLibrary {
    scripts: BTreeMap<String, Arc<ScriptUnit>>,
}

impl ScriptLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_units(units: BTreeMap<String, ScriptUnit>) -> Self {
        Self {
            scripts: units
                .into_iter()
                .map(|(name, unit)| (name, Arc::new(unit)))
                .collect(),
        }
    }

    pub fn insert(&mut self, unit: ScriptUnit) {
        self.scripts.insert(unit.name.clone(), Arc::new(unit));
    }

    pub fn get(&self, name: &str) -> Option<&Arc<ScriptUnit>> {
        self.scripts.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScriptUnit> {
        self.scripts.values().map(Arc::as_ref)
    }

    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }
}

impl ScriptRegistry for ScriptLibrary {
    fn lookup(&self, name: &str) -> Option<Arc<ScriptUnit>> {
        self.scripts.get(name).cloned()
    }

    fn names(&self) -> Vec<String> {
        self.scripts.keys().cloned().collect()
    }
}

/// Everything a command handler may touch.
pub struct CommandInvocation<'a> {
    pub descriptor: &'a CommandDescriptor,
    pub args: Bindings,
    pub context: &'a mut ExecutionContext,
    pub sink: &'a dyn OutputSink,
    pub now: Duration,
}

/// What a handler asks the dispatcher to do.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandEffect {
    Value(CodaValue),
    Return(CodaValue),
    Break,
    Continue,
    Call { target: String, args: Vec<CodaValue> },
}

/// How the calling instruction is written: where the result goes and which
/// type a called script's result is cast to.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallSite {
    pub result: Option<String>,
    pub expect: Option<DataType>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Dispatched {
    /// Plain result; the caller stores it and moves on.
    Value(CodaValue),
    /// A call could not start; `value` stands in for its result.
    Degraded { value: CodaValue, cause: CodaError },
    /// Control moved (loop jump or new frame); nothing to store.
    Transferred,
    /// A called frame finished and the caller resumed with its result.
    Returned { degraded: Option<CodaError> },
    /// The outermost frame finished.
    Finished(CodaValue),
}

pub struct Dispatcher {
    table: Arc<CommandTable>,
    scripts: Arc<dyn ScriptRegistry>,
    sink: Arc<dyn OutputSink>,
    clock: Arc<dyn Clock>,
    max_call_depth: usize,
}

impl Dispatcher {
    pub fn new(
        table: Arc<CommandTable>,
        scripts: Arc<dyn ScriptRegistry>,
        sink: Arc<dyn OutputSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            table,
            scripts,
            sink,
            clock,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }

    pub fn with_max_call_depth(mut self, max_call_depth: usize) -> Self {
        self.max_call_depth = max_call_depth.max(1);
        self
    }

    pub fn table(&self) -> &CommandTable {
        &self.table
    }

    pub fn scripts(&self) -> &dyn ScriptRegistry {
        self.scripts.as_ref()
    }

    /// Resolves `name`, validates `args` against its signature, runs the
    /// handler and applies the resulting control-flow effect to `context`.
    pub fn dispatch(
        &self,
        context: &mut ExecutionContext,
        name: &str,
        args: Vec<CodaValue>,
        site: &CallSite,
    ) -> Result<Dispatched, CodaError> {
        let Some(descriptor) = self.table.lookup(name) else {
            return Err(CodaError::new(
                ErrorKind::UnknownCommand,
                format!("Unknown command \"{}\".", name),
            ));
        };
        let bindings = match_arguments(&descriptor.name, &descriptor.arity, args)?;
        debug!(
            script = %context.identity(),
            command = %descriptor.name,
            parameter_set = bindings.parameter_set().unwrap_or_default(),
            args = bindings.supplied(),
            "dispatch"
        );

        let mut invocation = CommandInvocation {
            descriptor,
            args: bindings,
            context: &mut *context,
            sink: self.sink.as_ref(),
            now: self.clock.now(),
        };
        let effect = (descriptor.handler)(&mut invocation)?;
        self.apply(context, effect, site)
    }

    /// Ends the current frame, used both by `Return` and by running off the
    /// end of a script body.
    pub fn finish_frame(&self, context: &mut ExecutionContext) -> Result<Dispatched, CodaError> {
        match context.finish_frame()? {
            FrameExit::Finished(value) => Ok(Dispatched::Finished(value)),
            FrameExit::Resumed {
                coerced_from: None, ..
            } => Ok(Dispatched::Returned { degraded: None }),
            FrameExit::Resumed {
                callee,
                expected,
                coerced_from: Some(found),
            } => {
                let cause = CodaError::new(
                    ErrorKind::CallFailure,
                    format!(
                        "\"{}\" returned {} where {} was expected; substituted its zero value.",
                        callee, found, expected
                    ),
                );
                warn!(script = %context.identity(), callee = %callee, "{}", cause.message);
                Ok(Dispatched::Returned {
                    degraded: Some(cause),
                })
            }
        }
    }

    fn apply(
        &self,
        context: &mut ExecutionContext,
        effect: CommandEffect,
        site: &CallSite,
    ) -> Result<Dispatched, CodaError> {
        match effect {
            CommandEffect::Value(value) => Ok(Dispatched::Value(value)),
            CommandEffect::Break => {
                context.break_loop()?;
                Ok(Dispatched::Transferred)
            }
            CommandEffect::Continue => {
                context.continue_loop()?;
                Ok(Dispatched::Transferred)
            }
            CommandEffect::Return(value) => {
                context.set_pending_return(value)?;
                self.finish_frame(context)
            }
            CommandEffect::Call { target, args } => self.enter_call(context, &target, args, site),
        }
    }

    fn enter_call(
        &self,
        context: &mut ExecutionContext,
        target: &str,
        args: Vec<CodaValue>,
        site: &CallSite,
    ) -> Result<Dispatched, CodaError> {
        let Some(unit) = self.scripts.lookup(target) else {
            return Ok(self.degrade(
                context,
                site.expect.unwrap_or(DataType::Numeric),
                format!("Call target \"{}\" does not exist.", target),
            ));
        };
        let expected = site.expect.unwrap_or(unit.return_type);

        if context.frame_depth() >= self.max_call_depth {
            return Ok(self.degrade(
                context,
                expected,
                format!(
                    "Call to \"{}\" exceeds the nesting limit of {} frames.",
                    target, self.max_call_depth
                ),
            ));
        }

        let signature = Arity::Standard {
            params: unit.signature(),
        };
        let bindings = match match_arguments(&unit.name, &signature, args) {
            Ok(bindings) => bindings,
            Err(error) => {
                return Ok(self.degrade(
                    context,
                    expected,
                    format!("Call to \"{}\" rejected its arguments: {}", target, error.message),
                ));
            }
        };

        let locals = unit
            .params
            .iter()
            .map(|param| param.name.clone())
            .zip(bindings.into_values())
            .collect();
        let resume = ResumePoint {
            ip: context.ip()? + 1,
            result_slot: site.result.clone(),
            expected,
        };
        context.push_frame(unit, locals, resume);
        Ok(Dispatched::Transferred)
    }

    fn degrade(&self, context: &ExecutionContext, expected: DataType, message: String) -> Dispatched {
        warn!(script = %context.identity(), "{}", message);
        Dispatched::Degraded {
            value: CodaValue::zero(expected),
            cause: CodaError::new(ErrorKind::CallFailure, message),
        }
    }
}
