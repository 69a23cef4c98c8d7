use coda_core::{Arity, CodaError, CodaValue, DataType, ErrorKind, ParameterInfo, ParameterSet};
use tracing::warn;

use super::format::format_number;
use crate::dispatcher::{CommandEffect, CommandInvocation};
use crate::registry::{CommandDescriptor, CommandTable};

pub fn register_general_commands(table: &mut CommandTable) -> Result<(), CodaError> {
    for descriptor in general_commands() {
        table.register(descriptor)?;
    }
    Ok(())
}

/// Flow control, timing, formatting and console output.
pub fn general_commands() -> Vec<CommandDescriptor> {
    vec![
        CommandDescriptor::new(
            "Return",
            Arity::Variadic {
                leading: vec![ParameterInfo::optional(
                    "Return Value",
                    DataType::Multi,
                    CodaValue::Invalid,
                )],
                rest: DataType::Multi,
            },
            DataType::Invalid,
            return_command,
        )
        .with_docs(
            "Stops the execution of the calling script and optionally returns a value.",
            "Example:<p><code class=\"s\">Return(45 + 12.4 * 0.1)</code></p>",
        ),
        CommandDescriptor::new(
            "Call",
            Arity::Variadic {
                leading: vec![ParameterInfo::required("Function Script", DataType::String)],
                rest: DataType::Multi,
            },
            DataType::Multi,
            call_command,
        )
        .with_docs(
            "Calls a function script with the given arguments and returns its result.",
            "Arguments after the script name are bound to its parameters in order. \
             A missing script or a bad argument list yields the zero value of the \
             expected type.<p><code class=\"s\">total = Call(\"Sum\", 1, 2)</code></p>",
        ),
        CommandDescriptor::new(
            "Break",
            Arity::Simple { count: 0 },
            DataType::Invalid,
            break_command,
        )
        .with_docs(
            "Exits the innermost loop.",
            "Execution continues after the loop's end.",
        ),
        CommandDescriptor::new(
            "Continue",
            Arity::Simple { count: 0 },
            DataType::Invalid,
            continue_command,
        )
        .with_docs(
            "Skips to the next iteration of the innermost loop.",
            "The loop condition is evaluated again before the body runs.",
        ),
        CommandDescriptor::new(
            "GetSecondsPassed",
            Arity::Simple { count: 0 },
            DataType::Numeric,
            seconds_passed_command,
        )
        .with_docs(
            "Returns the seconds elapsed since this script last called the command.",
            "The first call of a script returns 0. Background scripts keep their \
             timer between runs.",
        ),
        CommandDescriptor::new(
            "FormatNumber",
            Arity::Standard {
                params: vec![
                    ParameterInfo::required("Number", DataType::Numeric),
                    ParameterInfo::required("Format", DataType::String),
                    ParameterInfo::optional(
                        "Locale",
                        DataType::String,
                        CodaValue::String(String::new()),
                    ),
                ],
            },
            DataType::String,
            format_number_command,
        )
        .with_alias("FmtNum")
        .with_docs(
            "Formats a number using a .NET-style numeric format string.",
            "Standard specifiers are C, D, E, F, G, N, P, R and X with an optional \
             precision; anything else is read as a custom pattern built from \
             <code>0 # . , % E0</code> and quoted literals. The optional locale \
             selects separators and symbols (invariant, en-US, en-GB, de-DE, fr-FR).\
             <p><code class=\"s\">text = FmtNum(1234.5678, \"N2\")</code></p>",
        ),
        CommandDescriptor::new(
            "PrintToConsole",
            Arity::Parametric {
                sets: vec![ParameterSet {
                    name: "OneString".to_string(),
                    min: 0,
                    max: 1,
                    params: vec![ParameterInfo::optional(
                        "Message",
                        DataType::String,
                        CodaValue::String(String::new()),
                    )],
                }],
            },
            DataType::Invalid,
            print_command,
        )
        .with_alias("PrintC")
        .with_docs(
            "Prints a message to the console.",
            "<p><code class=\"s\">PrintC(\"Hello\")</code></p>",
        ),
    ]
}

fn return_command(invocation: &mut CommandInvocation<'_>) -> Result<CommandEffect, CodaError> {
    if invocation.args.supplied() > 1 {
        return Err(CodaError::new(
            ErrorKind::ArityMismatch,
            format!(
                "\"Return\" takes at most one value, got {}.",
                invocation.args.supplied()
            ),
        ));
    }
    let value = invocation.args.value(0)?.clone();
    Ok(CommandEffect::Return(value))
}

fn call_command(invocation: &mut CommandInvocation<'_>) -> Result<CommandEffect, CodaError> {
    let target = invocation.args.string(0)?.to_string();
    let args = invocation.args.values()[1..].to_vec();
    Ok(CommandEffect::Call { target, args })
}

fn break_command(_: &mut CommandInvocation<'_>) -> Result<CommandEffect, CodaError> {
    Ok(CommandEffect::Break)
}

fn continue_command(_: &mut CommandInvocation<'_>) -> Result<CommandEffect, CodaError> {
    Ok(CommandEffect::Continue)
}

fn seconds_passed_command(
    invocation: &mut CommandInvocation<'_>,
) -> Result<CommandEffect, CodaError> {
    let seconds = invocation.context.seconds_passed(invocation.now)?;
    Ok(CommandEffect::Value(CodaValue::Numeric(seconds)))
}

fn format_number_command(
    invocation: &mut CommandInvocation<'_>,
) -> Result<CommandEffect, CodaError> {
    let value = invocation.args.numeric(0)?;
    let format = invocation.args.string(1)?;
    let locale = invocation.args.string(2)?;
    let text = format_number(value, format, locale)?;
    Ok(CommandEffect::Value(CodaValue::String(text)))
}

fn print_command(invocation: &mut CommandInvocation<'_>) -> Result<CommandEffect, CodaError> {
    let message = invocation.args.string(0)?;
    if let Err(error) = invocation.sink.write(message) {
        warn!(
            script = %invocation.context.identity(),
            %error,
            "console write failed"
        );
    }
    Ok(CommandEffect::Value(CodaValue::Invalid))
}
