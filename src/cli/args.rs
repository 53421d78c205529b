//! CLI argument definitions using clap derive

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::cli::commands::{
    capacity::CapacityCommands, completions::CompletionsArgs, config::ConfigCommands,
    fetch::FetchArgs, form::FormCommands, init::InitArgs, schedule::ScheduleCommands,
    session::SessionCommands, trace::TraceCommands,
};

#[derive(Parser)]
#[command(name = "mft")]
#[command(author, version, about = "Manufacturing traceability toolkit")]
#[command(
    long_about = "Batch stage timelines, line capacity utilization and schema-driven production forms over a manufacturing ERP's REST API."
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalOpts,
}

#[derive(clap::Args, Clone, Debug)]
pub struct GlobalOpts {
    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "auto")]
    pub format: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Enable verbose output (debug logging)
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Project root (default: auto-detect by finding .mft/)
    #[arg(long, global = true)]
    pub project: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new mft project
    Init(InitArgs),

    /// View and modify configuration
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Manage the API access token
    #[command(subcommand)]
    Session(SessionCommands),

    /// Download batches, stage records and the schedule into the local snapshot
    Fetch(FetchArgs),

    /// Batch traceability: per-batch stage timelines
    #[command(subcommand)]
    Trace(TraceCommands),

    /// Production line capacity utilization
    #[command(subcommand)]
    Capacity(CapacityCommands),

    /// Production schedule progress
    #[command(subcommand)]
    Schedule(ScheduleCommands),

    /// Production-entry forms (list, fill, validate, submit)
    #[command(subcommand)]
    Form(FormCommands),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Automatically detect based on context (yaml for show, tsv for list)
    #[default]
    Auto,
    /// YAML format (full fidelity)
    Yaml,
    /// Tab-separated values (for piping)
    Tsv,
    /// JSON format (for programming)
    Json,
    /// CSV format (for spreadsheets)
    Csv,
    /// Markdown tables
    Md,
    /// Just keys, one per line
    Id,
}

impl OutputFormat {
    /// Resolve `auto` against the configured default, then the command's own default
    pub fn resolve(self, configured: Option<&str>, fallback: OutputFormat) -> OutputFormat {
        if self != OutputFormat::Auto {
            return self;
        }
        configured
            .and_then(|s| OutputFormat::from_str(s, true).ok())
            .filter(|f| *f != OutputFormat::Auto)
            .unwrap_or(fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_format_resolution() {
        assert_eq!(
            OutputFormat::Json.resolve(Some("csv"), OutputFormat::Tsv),
            OutputFormat::Json
        );
        assert_eq!(
            OutputFormat::Auto.resolve(Some("csv"), OutputFormat::Tsv),
            OutputFormat::Csv
        );
        assert_eq!(
            OutputFormat::Auto.resolve(Some("bogus"), OutputFormat::Tsv),
            OutputFormat::Tsv
        );
        assert_eq!(OutputFormat::Auto.resolve(None, OutputFormat::Yaml), OutputFormat::Yaml);
    }
}
