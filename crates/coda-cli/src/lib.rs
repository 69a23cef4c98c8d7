use std::ffi::OsString;

use clap::Parser;
use coda_runtime::CommandTable;
use tracing_subscriber::EnvFilter;

mod cli_args;
mod docs;
mod error_map;
mod reference_state;
mod reference_tui;
mod run_mode;
mod source_loader;

pub(crate) use cli_args::{Cli, DocsArgs, DocsFormat, Mode, RunArgs};
pub use error_map::CliError;
pub(crate) use error_map::{
    emit_error, map_cli_docs, map_cli_source_path, map_cli_source_read, map_cli_source_scan,
    map_tui_io,
};
pub(crate) use source_loader::load_scripts_dir;
#[cfg(test)]
pub(crate) use source_loader::{read_scripts_xml_from_dir, resolve_scripts_dir};

/// Installs a stderr subscriber filtered by `RUST_LOG`, `warn` when unset.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn run_cli_from_args<I, T>(args: I) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => {
            let _ = error.print();
            return error.exit_code();
        }
    };
    match run(cli) {
        Ok(code) => code,
        Err(error) => emit_error(error),
    }
}

fn run(cli: Cli) -> Result<i32, CliError> {
    match cli.command {
        Mode::Run(args) => run_mode::run_scripts(args),
        Mode::Docs(args) => run_docs(args),
        Mode::Reference => run_reference(),
    }
}

fn run_docs(args: DocsArgs) -> Result<i32, CliError> {
    let table = CommandTable::with_general_commands()?;
    println!("{}", docs::render_docs(&table, args.format)?);
    Ok(0)
}

fn run_reference() -> Result<i32, CliError> {
    let table = CommandTable::with_general_commands()?;
    let mut state = reference_state::ReferenceState::new(table.documentation());
    reference_tui::run_reference_browser(&mut state)
}

#[cfg(test)]
mod tests;
