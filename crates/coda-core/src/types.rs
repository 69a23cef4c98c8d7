use serde::{Deserialize, Serialize};

use crate::value::{CodaValue, DataType};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpan {
    pub start: SourceLocation,
    pub end: SourceLocation,
}

impl SourceSpan {
    pub fn synthetic() -> Self {
        Self::at_line(1)
    }

    pub fn at_line(line: usize) -> Self {
        Self {
            start: SourceLocation { line, column: 1 },
            end: SourceLocation { line, column: 1 },
        }
    }
}

/// One formal parameter. A parameter is optional exactly when it carries a
/// default value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterInfo {
    pub description: String,
    pub data_type: DataType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<CodaValue>,
}

impl ParameterInfo {
    pub fn required(description: impl Into<String>, data_type: DataType) -> Self {
        Self {
            description: description.into(),
            data_type,
            default: None,
        }
    }

    pub fn optional(
        description: impl Into<String>,
        data_type: DataType,
        default: CodaValue,
    ) -> Self {
        Self {
            description: description.into(),
            data_type,
            default: Some(default),
        }
    }

    pub fn is_optional(&self) -> bool {
        self.default.is_some()
    }
}

/// Named alternative signature of a parametric command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterSet {
    pub name: String,
    pub min: usize,
    pub max: usize,
    pub params: Vec<ParameterInfo>,
}

/// Calling convention of a command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Arity {
    /// Exact argument count, untyped.
    Simple { count: usize },
    /// Typed positional signature; optional parameters may only trail.
    Standard { params: Vec<ParameterInfo> },
    /// Alternative named parameter sets tried in declaration order.
    Parametric { sets: Vec<ParameterSet> },
    /// Leading typed parameters followed by an unbounded tail of `rest`.
    Variadic {
        leading: Vec<ParameterInfo>,
        rest: DataType,
    },
}

impl Arity {
    pub fn class_name(&self) -> &'static str {
        match self {
            Self::Simple { .. } => "simple",
            Self::Standard { .. } => "standard",
            Self::Parametric { .. } => "parametric",
            Self::Variadic { .. } => "variadic",
        }
    }

    pub fn min_args(&self) -> usize {
        match self {
            Self::Simple { count } => *count,
            Self::Standard { params } => required_count(params),
            Self::Parametric { sets } => sets.iter().map(|set| set.min).min().unwrap_or(0),
            Self::Variadic { leading, .. } => required_count(leading),
        }
    }

    /// `None` when the descriptor enforces no upper bound.
    pub fn max_args(&self) -> Option<usize> {
        match self {
            Self::Simple { count } => Some(*count),
            Self::Standard { params } => Some(params.len()),
            Self::Parametric { sets } => Some(sets.iter().map(|set| set.max).max().unwrap_or(0)),
            Self::Variadic { .. } => None,
        }
    }
}

pub fn required_count(params: &[ParameterInfo]) -> usize {
    params.iter().take_while(|param| !param.is_optional()).count()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptParam {
    pub name: String,
    pub data_type: DataType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<CodaValue>,
    pub location: SourceSpan,
}

/// Already-tokenized instruction. Jump targets are indices into the owning
/// unit's instruction list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Instruction {
    Assign {
        target: String,
        expr: String,
        location: SourceSpan,
    },
    Command {
        name: String,
        args: Vec<String>,
        result: Option<String>,
        expect: Option<DataType>,
        location: SourceSpan,
    },
    Branch {
        condition: String,
        else_index: usize,
        location: SourceSpan,
    },
    Jump {
        target: usize,
        location: SourceSpan,
    },
    LoopStart {
        condition: String,
        exit_index: usize,
        location: SourceSpan,
    },
    LoopEnd {
        start_index: usize,
        location: SourceSpan,
    },
}

impl Instruction {
    pub fn location(&self) -> &SourceSpan {
        match self {
            Self::Assign { location, .. }
            | Self::Command { location, .. }
            | Self::Branch { location, .. }
            | Self::Jump { location, .. }
            | Self::LoopStart { location, .. }
            | Self::LoopEnd { location, .. } => location,
        }
    }
}

/// A script or function script as handed over by the loader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptUnit {
    pub name: String,
    pub source_path: String,
    pub params: Vec<ScriptParam>,
    pub return_type: DataType,
    pub instructions: Vec<Instruction>,
}

impl ScriptUnit {
    pub fn signature(&self) -> Vec<ParameterInfo> {
        self.params
            .iter()
            .map(|param| ParameterInfo {
                description: param.name.clone(),
                data_type: param.data_type,
                default: param.default.clone(),
            })
            .collect()
    }

    pub fn command_names(&self) -> impl Iterator<Item = (&str, &SourceSpan)> {
        self.instructions.iter().filter_map(|instruction| match instruction {
            Instruction::Command { name, location, .. } => Some((name.as_str(), location)),
            _ => None,
        })
    }
}
