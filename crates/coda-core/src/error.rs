use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::SourceSpan;

/// Failure categories raised by the loader, the command table and the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    DuplicateCommand,
    InvalidSignature,
    UnknownCommand,
    ArityMismatch,
    TypeMismatch,
    FormatError,
    ContextError,
    CallFailure,
    Evaluation,
    Parse,
    Runtime,
}

impl ErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            Self::DuplicateCommand => "DUPLICATE_COMMAND",
            Self::InvalidSignature => "INVALID_SIGNATURE",
            Self::UnknownCommand => "UNKNOWN_COMMAND",
            Self::ArityMismatch => "ARITY_MISMATCH",
            Self::TypeMismatch => "TYPE_MISMATCH",
            Self::FormatError => "FORMAT_ERROR",
            Self::ContextError => "CONTEXT_ERROR",
            Self::CallFailure => "CALL_FAILURE",
            Self::Evaluation => "EVALUATION",
            Self::Parse => "PARSE",
            Self::Runtime => "RUNTIME",
        }
    }

    /// Registration-time kinds abort startup rather than a single run.
    pub fn is_registration(self) -> bool {
        matches!(self, Self::DuplicateCommand | Self::InvalidSignature)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
#[error("{kind}: {message}")]
pub struct CodaError {
    pub kind: ErrorKind,
    pub message: String,
    pub span: Option<SourceSpan>,
}

impl CodaError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            span: None,
        }
    }

    pub fn with_span(kind: ErrorKind, message: impl Into<String>, span: SourceSpan) -> Self {
        Self {
            kind,
            message: message.into(),
            span: Some(span),
        }
    }

    /// Attaches `span` unless a more precise one is already recorded.
    pub fn at(mut self, span: &SourceSpan) -> Self {
        if self.span.is_none() {
            self.span = Some(span.clone());
        }
        self
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }
}
