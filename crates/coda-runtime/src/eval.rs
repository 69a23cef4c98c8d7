use std::collections::BTreeMap;

use coda_core::{CodaError, CodaValue, ErrorKind};
use rhai::{Dynamic, Engine, EvalAltResult, ImmutableString, Position, Scope, FLOAT, INT};

/// Turns an argument or condition expression into a value, reading the
/// current frame's locals.
pub trait ExpressionEvaluator {
    fn evaluate(
        &self,
        expr: &str,
        locals: &BTreeMap<String, CodaValue>,
    ) -> Result<CodaValue, CodaError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ScriptReference(u32);

/// Evaluates expressions with Rhai. References are exposed as an opaque
/// `Reference` type built with `reference(id)`.
pub struct RhaiEvaluator {
    engine: Engine,
}

impl Default for RhaiEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl RhaiEvaluator {
    pub fn new() -> Self {
        let mut engine = Engine::new();
        engine.set_strict_variables(true);
        engine.set_max_expr_depths(64, 64);
        engine.set_max_operations(100_000);
        // Built-in integer arithmetic would shadow the overloads below.
        engine.set_fast_operators(false);
        register_numeric_operators(&mut engine);

        engine.register_type_with_name::<ScriptReference>("Reference");
        engine.register_fn(
            "reference",
            |id: INT| -> Result<ScriptReference, Box<EvalAltResult>> {
                u32::try_from(id).map(ScriptReference).map_err(|_| {
                    Box::new(EvalAltResult::ErrorRuntime(
                        Dynamic::from(format!("reference({}) is out of range.", id)),
                        Position::NONE,
                    ))
                })
            },
        );
        engine.register_fn(
            "reference",
            |id: FLOAT| -> Result<ScriptReference, Box<EvalAltResult>> {
                if id.fract() != 0.0 || id < 0.0 || id > u32::MAX as FLOAT {
                    return Err(Box::new(EvalAltResult::ErrorRuntime(
                        Dynamic::from(format!("reference({}) is out of range.", id)),
                        Position::NONE,
                    )));
                }
                Ok(ScriptReference(id as u32))
            },
        );
        engine.register_fn("reference_id", |reference: ScriptReference| {
            reference.0 as INT
        });
        engine.register_fn("is_null", |reference: ScriptReference| reference.0 == 0);
        engine.register_fn("==", |left: ScriptReference, right: ScriptReference| {
            left == right
        });
        engine.register_fn("!=", |left: ScriptReference, right: ScriptReference| {
            left != right
        });

        Self { engine }
    }
}

impl ExpressionEvaluator for RhaiEvaluator {
    fn evaluate(
        &self,
        expr: &str,
        locals: &BTreeMap<String, CodaValue>,
    ) -> Result<CodaValue, CodaError> {
        let mut scope = Scope::new();
        for (name, value) in locals {
            scope.push_dynamic(name.clone(), value_to_dynamic(value));
        }

        let result = self
            .engine
            .eval_expression_with_scope::<Dynamic>(&mut scope, expr)
            .map_err(|error| {
                CodaError::new(
                    ErrorKind::Evaluation,
                    format!("Expression \"{}\" failed: {}", expr, error),
                )
            })?;
        dynamic_to_value(result).map_err(|error| {
            CodaError::new(
                ErrorKind::Evaluation,
                format!("Expression \"{}\" failed: {}", expr, error.message),
            )
        })
    }
}

/// Numeric values are doubles, so integer literals must not fall into
/// Rhai's integer arithmetic (`7 / 2` is 3.5, `1 / 0` is infinity).
fn register_numeric_operators(engine: &mut Engine) {
    engine.register_fn("+", |left: INT, right: INT| left as FLOAT + right as FLOAT);
    engine.register_fn("-", |left: INT, right: INT| left as FLOAT - right as FLOAT);
    engine.register_fn("*", |left: INT, right: INT| left as FLOAT * right as FLOAT);
    engine.register_fn("/", |left: INT, right: INT| left as FLOAT / right as FLOAT);
    engine.register_fn("%", |left: INT, right: INT| left as FLOAT % right as FLOAT);
    engine.register_fn("**", |left: INT, right: INT| {
        (left as FLOAT).powf(right as FLOAT)
    });
}

fn value_to_dynamic(value: &CodaValue) -> Dynamic {
    match value {
        CodaValue::Invalid => Dynamic::UNIT,
        CodaValue::Numeric(value) => Dynamic::from_float(*value as FLOAT),
        CodaValue::String(value) => Dynamic::from(value.clone()),
        CodaValue::Reference(id) => Dynamic::from(ScriptReference(*id)),
    }
}

fn dynamic_to_value(value: Dynamic) -> Result<CodaValue, CodaError> {
    if value.is_unit() {
        return Ok(CodaValue::Invalid);
    }
    if value.is::<bool>() {
        return Ok(CodaValue::Numeric(if value.cast::<bool>() { 1.0 } else { 0.0 }));
    }
    if value.is::<INT>() {
        return Ok(CodaValue::Numeric(value.cast::<INT>() as f64));
    }
    if value.is::<FLOAT>() {
        return Ok(CodaValue::Numeric(value.cast::<FLOAT>()));
    }
    if value.is::<ImmutableString>() {
        return Ok(CodaValue::String(value.cast::<ImmutableString>().to_string()));
    }
    if value.is::<char>() {
        return Ok(CodaValue::String(value.cast::<char>().to_string()));
    }
    if value.is::<ScriptReference>() {
        return Ok(CodaValue::Reference(value.cast::<ScriptReference>().0));
    }

    Err(CodaError::new(
        ErrorKind::Evaluation,
        format!("values of type {} cannot be passed to commands", value.type_name()),
    ))
}
