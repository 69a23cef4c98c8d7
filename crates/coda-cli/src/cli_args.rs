use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(name = "coda-cli")]
#[command(about = "CodaScript command runner")]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Mode,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Mode {
    /// Runs the entry script of a scripts directory.
    Run(RunArgs),
    /// Prints the command reference.
    Docs(DocsArgs),
    /// Browses the command reference interactively.
    Reference,
}

#[derive(Debug, Args)]
pub(crate) struct RunArgs {
    #[arg(long = "scripts-dir")]
    pub(crate) scripts_dir: String,
    #[arg(long = "entry-script")]
    pub(crate) entry_script: Option<String>,
    /// Runs the entry as a background script this many times.
    #[arg(long = "repeat", value_parser = clap::value_parser!(u32).range(1..))]
    pub(crate) repeat: Option<u32>,
    #[arg(long = "interval-ms", default_value_t = 0)]
    pub(crate) interval_ms: u64,
}

#[derive(Debug, Args)]
pub(crate) struct DocsArgs {
    #[arg(long = "format", value_enum, default_value_t = DocsFormat::Json)]
    pub(crate) format: DocsFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum DocsFormat {
    Json,
    Html,
}
