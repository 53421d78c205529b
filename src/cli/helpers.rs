//! Shared helper functions for CLI commands
//!
//! Project/config/session resolution and structured output used by several
//! command modules.

use chrono::{Datelike, NaiveDate};
use console::style;
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::analysis::Traceability;
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::client::ApiClient;
use crate::core::project::Project;
use crate::core::session::{Session, SessionError};
use crate::core::snapshot::{DataSource, Dataset, Snapshot};
use crate::core::Config;

/// Discover the project honoring `--project`
pub fn project(global: &GlobalOpts) -> Result<Project> {
    Project::resolve(global.project.as_deref()).map_err(|e| miette::miette!("{}", e))
}

/// Configuration for the current project, or global-only outside a project
pub fn config(global: &GlobalOpts) -> Config {
    let project = Project::resolve(global.project.as_deref()).ok();
    Config::load_for(project.as_ref())
}

/// Session from `MFT_TOKEN` or the project session file, if any
pub fn session(project: Option<&Project>) -> Result<Option<Session>> {
    let path = project
        .map(Project::session_path)
        .unwrap_or_else(|| PathBuf::from(".mft/session.yaml"));
    match Session::load(&path) {
        Ok(session) => Ok(Some(session)),
        Err(SessionError::Missing) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// API client for the current project
pub fn client(global: &GlobalOpts) -> Result<ApiClient> {
    let project = Project::resolve(global.project.as_deref()).ok();
    let config = Config::load_for(project.as_ref());
    let session = session(project.as_ref())?;
    Ok(ApiClient::new(&config, session)?)
}

/// Where analysis commands read records from
#[derive(clap::Args, Debug, Clone, Default)]
pub struct SourceArgs {
    /// Read a snapshot directory instead of the project's .mft/data
    #[arg(long, value_name = "DIR", conflicts_with = "remote")]
    pub data: Option<PathBuf>,

    /// Read directly from the API instead of the local snapshot
    #[arg(long)]
    pub remote: bool,
}

impl SourceArgs {
    pub fn open(&self, global: &GlobalOpts) -> Result<Box<dyn DataSource>> {
        if self.remote {
            return Ok(Box::new(client(global)?));
        }
        let dir = match &self.data {
            Some(dir) => dir.clone(),
            None => project(global)?.data_dir(),
        };
        Ok(Box::new(Snapshot::open(&dir)?))
    }
}

/// Configuration, normalized data and timelines for analysis commands
pub struct Loaded {
    pub config: Config,
    pub data: Dataset,
    pub trace: Traceability,
}

impl Loaded {
    /// Read the source and aggregate with the configured pipeline and orphan policy
    pub fn open(source: &SourceArgs, global: &GlobalOpts, with_schedule: bool) -> Result<Self> {
        let config = config(global);
        let data = Dataset::load(source.open(global)?.as_ref(), with_schedule)?;
        let trace = data.trace(&config.pipeline(), config.orphan_policy());
        Ok(Self {
            config,
            data,
            trace,
        })
    }

    /// Output format with the configured default applied
    pub fn format(&self, global: &GlobalOpts, fallback: OutputFormat) -> OutputFormat {
        global
            .format
            .resolve(self.config.default_format.as_deref(), fallback)
    }

    /// Tell the user about records left out of the analysis (on stderr)
    pub fn report_gaps(&self, global: &GlobalOpts) {
        if global.quiet {
            return;
        }
        if !self.data.gaps.is_empty() {
            eprintln!(
                "{} Snapshot has no data for {} (failed in the last fetch)",
                style("!").yellow(),
                self.data.gaps.join(", ")
            );
        }
        if !self.data.skipped.is_empty() {
            eprintln!(
                "{} {} record(s) skipped: no usable batch key or required field",
                style("!").yellow(),
                self.data.skipped.len()
            );
        }
        if self.trace.dropped_orphans > 0 {
            eprintln!(
                "{} {} stage record(s) dropped for {} unknown batch(es)",
                style("!").yellow(),
                self.trace.dropped_orphans,
                self.trace.orphan_keys.len()
            );
        } else if !self.trace.orphan_keys.is_empty() {
            eprintln!(
                "{} {} batch(es) created from stage records alone",
                style("!").yellow(),
                self.trace.orphan_keys.len()
            );
        }
    }
}

/// Print a serializable value as JSON or YAML; returns false for other formats
pub fn print_structured<T: Serialize + ?Sized>(value: &T, format: OutputFormat) -> Result<bool> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(value).into_diagnostic()?);
            Ok(true)
        }
        OutputFormat::Yaml => {
            print!("{}", serde_yml::to_string(value).into_diagnostic()?);
            Ok(true)
        }
        _ => Ok(false),
    }
}

/// Parse `YYYY-MM` (or a full date) into the first day of that month
pub fn parse_month(s: &str) -> std::result::Result<NaiveDate, String> {
    let s = s.trim();
    NaiveDate::parse_from_str(&format!("{}-01", s), "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%Y-%m-%d").map(|d| d.with_day(1).unwrap_or(d)))
        .map_err(|_| format!("expected a month as YYYY-MM, got '{}'", s))
}

/// Truncate a string to max_len characters, adding "..." if truncated
pub fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Weight in kg with thousands kept readable
pub fn format_kg(kg: f64) -> String {
    if kg.abs() >= 10_000.0 {
        format!("{:.0} kg", kg)
    } else {
        format!("{:.1} kg", kg)
    }
}

/// Display a path relative to `base` when possible
pub fn relative_display(path: &Path, base: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .display()
        .to_string()
}
