use coda_core::{required_count, Arity, CodaError, CodaValue, DataType, ErrorKind, ParameterInfo};

/// Arguments after validation against a signature, with omitted optional
/// parameters filled in from their defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct Bindings {
    values: Vec<CodaValue>,
    supplied: usize,
    parameter_set: Option<String>,
}

impl Bindings {
    pub fn values(&self) -> &[CodaValue] {
        &self.values
    }

    pub fn into_values(self) -> Vec<CodaValue> {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of arguments the caller actually passed.
    pub fn supplied(&self) -> usize {
        self.supplied
    }

    /// Name of the matched set for parametric commands.
    pub fn parameter_set(&self) -> Option<&str> {
        self.parameter_set.as_deref()
    }

    pub fn get(&self, index: usize) -> Option<&CodaValue> {
        self.values.get(index)
    }

    pub fn value(&self, index: usize) -> Result<&CodaValue, CodaError> {
        self.values.get(index).ok_or_else(|| {
            CodaError::new(
                ErrorKind::ArityMismatch,
                format!("No argument bound at position {}.", index + 1),
            )
        })
    }

    pub fn numeric(&self, index: usize) -> Result<f64, CodaError> {
        let value = self.value(index)?;
        value
            .as_number()
            .ok_or_else(|| binding_type_error(index, DataType::Numeric, value))
    }

    pub fn string(&self, index: usize) -> Result<&str, CodaError> {
        let value = self.value(index)?;
        value
            .as_string()
            .ok_or_else(|| binding_type_error(index, DataType::String, value))
    }
}

fn binding_type_error(index: usize, expected: DataType, found: &CodaValue) -> CodaError {
    CodaError::new(
        ErrorKind::TypeMismatch,
        format!(
            "Argument {} is {}, expected {}.",
            index + 1,
            found.data_type(),
            expected
        ),
    )
}

/// Validates `args` against `arity`.
///
/// Parametric signatures pick the first set whose bounds admit the argument
/// count; a type mismatch inside that set fails without trying later sets.
pub fn match_arguments(
    command: &str,
    arity: &Arity,
    args: Vec<CodaValue>,
) -> Result<Bindings, CodaError> {
    match arity {
        Arity::Simple { count } => {
            if args.len() != *count {
                return Err(CodaError::new(
                    ErrorKind::ArityMismatch,
                    format!(
                        "\"{}\" takes exactly {} argument(s), got {}.",
                        command,
                        count,
                        args.len()
                    ),
                ));
            }
            Ok(Bindings {
                supplied: args.len(),
                values: args,
                parameter_set: None,
            })
        }
        Arity::Standard { params } => bind_params(command, params, args, None),
        Arity::Parametric { sets } => {
            let count = args.len();
            let Some(set) = sets.iter().find(|set| set.min <= count && count <= set.max) else {
                let accepted = sets
                    .iter()
                    .map(|set| format!("{} ({}..{})", set.name, set.min, set.max))
                    .collect::<Vec<_>>()
                    .join(", ");
                return Err(CodaError::new(
                    ErrorKind::ArityMismatch,
                    format!(
                        "\"{}\" has no parameter set taking {} argument(s); accepted: {}.",
                        command, count, accepted
                    ),
                ));
            };
            bind_params(command, &set.params, args, Some(set.name.clone()))
        }
        Arity::Variadic { leading, rest } => {
            let required = required_count(leading);
            if args.len() < required {
                return Err(CodaError::new(
                    ErrorKind::ArityMismatch,
                    format!(
                        "\"{}\" takes at least {} argument(s), got {}.",
                        command,
                        required,
                        args.len()
                    ),
                ));
            }
            for (index, value) in args.iter().enumerate() {
                match leading.get(index) {
                    Some(param) => check_param(command, index, param, value)?,
                    None => {
                        if !rest.accepts(value) {
                            return Err(mismatch(command, index, "variadic tail", *rest, value));
                        }
                    }
                }
            }
            let supplied = args.len();
            let mut values = args;
            for param in leading.iter().skip(supplied) {
                values.push(param.default.clone().unwrap_or(CodaValue::Invalid));
            }
            Ok(Bindings {
                values,
                supplied,
                parameter_set: None,
            })
        }
    }
}

fn bind_params(
    command: &str,
    params: &[ParameterInfo],
    args: Vec<CodaValue>,
    parameter_set: Option<String>,
) -> Result<Bindings, CodaError> {
    let supplied = args.len();
    let required = required_count(params);
    if supplied < required || supplied > params.len() {
        let expected = if required == params.len() {
            required.to_string()
        } else {
            format!("{} to {}", required, params.len())
        };
        return Err(CodaError::new(
            ErrorKind::ArityMismatch,
            format!(
                "\"{}\" takes {} argument(s), got {}.",
                command, expected, supplied
            ),
        ));
    }

    for (index, (param, value)) in params.iter().zip(&args).enumerate() {
        check_param(command, index, param, value)?;
    }

    let mut values = args;
    for param in &params[supplied..] {
        values.push(param.default.clone().unwrap_or(CodaValue::Invalid));
    }
    Ok(Bindings {
        values,
        supplied,
        parameter_set,
    })
}

fn check_param(
    command: &str,
    index: usize,
    param: &ParameterInfo,
    value: &CodaValue,
) -> Result<(), CodaError> {
    if param.data_type.accepts(value) {
        Ok(())
    } else {
        Err(mismatch(
            command,
            index,
            &param.description,
            param.data_type,
            value,
        ))
    }
}

fn mismatch(
    command: &str,
    index: usize,
    description: &str,
    expected: DataType,
    value: &CodaValue,
) -> CodaError {
    CodaError::new(
        ErrorKind::TypeMismatch,
        format!(
            "Argument {} ({}) of \"{}\" expects {}, got {}.",
            index + 1,
            description,
            command,
            expected,
            value.data_type()
        ),
    )
}
