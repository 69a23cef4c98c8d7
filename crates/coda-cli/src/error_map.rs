use std::fmt::Display;

use coda_core::CodaError;
use thiserror::Error;

/// Host-side failure with a stable code for the `ERROR_CODE:` line.
#[derive(Debug, Error)]
#[error("{code}: {message}")]
pub struct CliError {
    pub code: String,
    pub message: String,
}

impl CliError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl From<CodaError> for CliError {
    fn from(error: CodaError) -> Self {
        let message = match &error.span {
            Some(span) => format!("{} (line {})", error.message, span.start.line),
            None => error.message,
        };
        Self::new(error.kind.code(), message)
    }
}

fn map_error(code: &'static str, error: impl Display) -> CliError {
    CliError::new(code, error.to_string())
}

pub(crate) fn emit_error(error: CliError) -> i32 {
    println!("RESULT:ERROR");
    println!("ERROR_CODE:{}", error.code);
    println!(
        "ERROR_MSG_JSON:{}",
        serde_json::to_string(&error.message).unwrap_or_else(|_| "\"Unknown error\"".to_string())
    );
    1
}

pub(crate) fn map_tui_io(error: std::io::Error) -> CliError {
    map_error("TUI_IO", error)
}

pub(crate) fn map_cli_source_path(error: std::io::Error) -> CliError {
    map_error("CLI_SOURCE_PATH", error)
}

pub(crate) fn map_cli_source_scan(error: std::path::StripPrefixError) -> CliError {
    map_error("CLI_SOURCE_SCAN", error)
}

pub(crate) fn map_cli_source_read(error: std::io::Error) -> CliError {
    map_error("CLI_SOURCE_READ", error)
}

pub(crate) fn map_cli_docs(error: serde_json::Error) -> CliError {
    map_error("CLI_DOCS", error)
}

#[cfg(test)]
mod error_map_tests {
    use coda_core::{ErrorKind, SourceSpan};

    use super::*;

    #[test]
    fn emit_error_returns_non_zero_exit_code() {
        let code = emit_error(CliError::new("ERR", "failed"));
        assert_eq!(code, 1);
    }

    #[test]
    fn engine_errors_keep_their_kind_code_and_line() {
        let error = CliError::from(CodaError::with_span(
            ErrorKind::UnknownCommand,
            "unknown command \"Jump\".",
            SourceSpan::at_line(7),
        ));
        assert_eq!(error.code, "UNKNOWN_COMMAND");
        assert_eq!(error.message, "unknown command \"Jump\". (line 7)");

        let plain = CliError::from(CodaError::new(ErrorKind::Runtime, "stopped"));
        assert_eq!(plain.message, "stopped");
    }

    #[test]
    fn mapping_helpers_keep_error_codes() {
        assert_eq!(map_tui_io(std::io::Error::other("io")).code, "TUI_IO");
        assert_eq!(
            map_cli_source_path(std::io::Error::other("path")).code,
            "CLI_SOURCE_PATH"
        );

        let strip_error = std::path::Path::new("/a")
            .strip_prefix("/b")
            .expect_err("strip prefix");
        assert_eq!(map_cli_source_scan(strip_error).code, "CLI_SOURCE_SCAN");

        assert_eq!(
            map_cli_source_read(std::io::Error::other("read")).code,
            "CLI_SOURCE_READ"
        );

        let invalid = serde_json::from_str::<serde_json::Value>("{").expect_err("invalid json");
        assert_eq!(map_cli_docs(invalid).code, "CLI_DOCS");
    }
}
