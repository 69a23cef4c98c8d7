use coda_core::{CodaError, CodaValue, ErrorKind, Instruction};
use tracing::{debug, info};

use super::{CodaEngine, ScriptOutcome};
use crate::context::ExecutionContext;
use crate::dispatcher::{CallSite, Dispatched};

impl CodaEngine {
    pub(super) fn execute(
        &self,
        context: &mut ExecutionContext,
    ) -> Result<ScriptOutcome, CodaError> {
        info!(script = %context.identity(), "script run started");
        let mut degraded_calls = Vec::new();
        let mut steps = 0usize;

        loop {
            if steps >= self.max_steps {
                return Err(CodaError::new(
                    ErrorKind::Runtime,
                    format!(
                        "Script \"{}\" exceeded {} steps.",
                        context.identity(),
                        self.max_steps
                    ),
                ));
            }
            steps += 1;

            let frame = context.current_frame()?;
            let script = frame.script.clone();
            let ip = frame.ip;

            let Some(instruction) = script.instructions.get(ip) else {
                match self.dispatcher.finish_frame(context)? {
                    Dispatched::Finished(value) => {
                        info!(script = %context.identity(), steps, "script run finished");
                        return Ok(ScriptOutcome {
                            value,
                            steps,
                            degraded_calls,
                        });
                    }
                    Dispatched::Returned {
                        degraded: Some(cause),
                    } => degraded_calls.push(cause),
                    _ => {}
                }
                continue;
            };

            let location = instruction.location();
            match self.step(context, instruction) {
                Ok(Step::Continue) => {}
                Ok(Step::Degraded(cause)) => degraded_calls.push(cause.at(location)),
                Ok(Step::Finished(value)) => {
                    info!(script = %context.identity(), steps, "script run finished");
                    return Ok(ScriptOutcome {
                        value,
                        steps,
                        degraded_calls,
                    });
                }
                Err(error) => {
                    debug!(script = %script.name, ip, %error, "instruction failed");
                    return Err(error.at(location));
                }
            }
        }
    }

    fn step(
        &self,
        context: &mut ExecutionContext,
        instruction: &Instruction,
    ) -> Result<Step, CodaError> {
        match instruction {
            Instruction::Assign { target, expr, .. } => {
                let value = self.evaluator.evaluate(expr, context.locals()?)?;
                context.set_local(target, value)?;
                context.advance()?;
            }
            Instruction::Command {
                name,
                args,
                result,
                expect,
                ..
            } => {
                let mut values = Vec::with_capacity(args.len());
                for expr in args {
                    values.push(self.evaluator.evaluate(expr, context.locals()?)?);
                }
                let site = CallSite {
                    result: result.clone(),
                    expect: *expect,
                };
                match self.dispatcher.dispatch(context, name, values, &site)? {
                    Dispatched::Value(value) => {
                        store(context, result, value)?;
                        context.advance()?;
                    }
                    Dispatched::Degraded { value, cause } => {
                        store(context, result, value)?;
                        context.advance()?;
                        return Ok(Step::Degraded(cause));
                    }
                    Dispatched::Transferred => {}
                    Dispatched::Returned { degraded } => {
                        if let Some(cause) = degraded {
                            return Ok(Step::Degraded(cause));
                        }
                    }
                    Dispatched::Finished(value) => return Ok(Step::Finished(value)),
                }
            }
            Instruction::Branch {
                condition,
                else_index,
                ..
            } => {
                if self.condition(context, condition)? {
                    context.advance()?;
                } else {
                    context.set_ip(*else_index)?;
                }
            }
            Instruction::Jump { target, .. } => context.set_ip(*target)?,
            Instruction::LoopStart {
                condition,
                exit_index,
                ..
            } => {
                let ip = context.ip()?;
                if self.condition(context, condition)? {
                    context.enter_loop(ip, *exit_index)?;
                    context.advance()?;
                } else {
                    if context
                        .current_loop()
                        .is_some_and(|active| active.recheck_index == ip)
                    {
                        context.exit_loop()?;
                    }
                    context.set_ip(*exit_index)?;
                }
            }
            Instruction::LoopEnd { start_index, .. } => context.set_ip(*start_index)?,
        }
        Ok(Step::Continue)
    }

    fn condition(&self, context: &ExecutionContext, expr: &str) -> Result<bool, CodaError> {
        Ok(self.evaluator.evaluate(expr, context.locals()?)?.is_truthy())
    }
}

enum Step {
    Continue,
    Degraded(CodaError),
    Finished(CodaValue),
}

fn store(
    context: &mut ExecutionContext,
    slot: &Option<String>,
    value: CodaValue,
) -> Result<(), CodaError> {
    match slot {
        Some(name) => context.set_local(name, value),
        None => Ok(()),
    }
}
