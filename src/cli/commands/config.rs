//! `mft config` command - Configuration management
//!
//! Provides commands to view and modify mft configuration.

use clap::Subcommand;
use console::style;
use miette::{IntoDiagnostic, Result};
use serde_yml::{Mapping, Value};
use std::fs;
use std::path::{Path, PathBuf};

use crate::cli::helpers;
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::Config;

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show current configuration values
    Show(ShowArgs),

    /// Set a configuration value
    Set(SetArgs),

    /// Unset (remove) a configuration value
    Unset(UnsetArgs),

    /// Show paths to configuration files
    Path(PathArgs),

    /// List all available configuration keys
    Keys,
}

#[derive(clap::Args, Debug)]
pub struct ShowArgs {
    /// Show only this key's value
    pub key: Option<String>,

    /// Show only project-level config
    #[arg(long = "project-only")]
    pub project_only: bool,

    /// Show only global (user) config
    #[arg(long = "global-only")]
    pub global_only: bool,
}

#[derive(clap::Args, Debug)]
pub struct SetArgs {
    /// Configuration key (e.g., api_url, capacity.lines.1600T)
    pub key: String,

    /// Value to set (pipeline takes a comma-separated list of stages)
    pub value: String,

    /// Set in global (user) config instead of project config
    #[arg(long, short = 'g')]
    pub global: bool,
}

#[derive(clap::Args, Debug)]
pub struct UnsetArgs {
    /// Configuration key to remove
    pub key: String,

    /// Remove from global (user) config instead of project config
    #[arg(long, short = 'g')]
    pub global: bool,
}

#[derive(clap::Args, Debug)]
pub struct PathArgs {
    /// Show only project config path
    #[arg(long = "project-only")]
    pub project_only: bool,

    /// Show only global config path
    #[arg(long = "global-only")]
    pub global_only: bool,
}

/// Valid configuration keys
const VALID_KEYS: &[(&str, &str)] = &[
    ("api_url", "Base URL of the ERP REST API"),
    ("timeout_secs", "Request timeout in seconds"),
    (
        "default_format",
        "Default output format (tsv, json, yaml, csv, md, id)",
    ),
    ("orphans", "Stage records with unknown batches: drop or create"),
    ("pipeline", "Comma-separated stages a batch must pass through"),
    ("capacity.fallback", "Capacity (kg/month) for lines not listed"),
    ("capacity.lines.<LINE>", "Monthly capacity (kg) of one line"),
    ("endpoints.<RESOURCE>", "Endpoint path for batches, schedule, a stage or a form"),
];

/// Keys that take a name after a fixed prefix
const PREFIX_KEYS: &[&str] = &["capacity.lines.", "endpoints."];

/// Run a config subcommand
pub fn run(cmd: ConfigCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        ConfigCommands::Show(args) => run_show(args, global),
        ConfigCommands::Set(args) => run_set(args, global),
        ConfigCommands::Unset(args) => run_unset(args, global),
        ConfigCommands::Path(args) => run_path(args, global),
        ConfigCommands::Keys => run_keys(),
    }
}

fn run_show(args: ShowArgs, global: &GlobalOpts) -> Result<()> {
    let config = helpers::config(global);

    if let Some(key) = &args.key {
        check_key(key)?;
        return match get_config_value(&config, key) {
            Some(v) => {
                println!("{}", v);
                Ok(())
            }
            None => Err(miette::miette!("Key '{}' is not set", key)),
        };
    }

    if args.project_only && args.global_only {
        return Err(miette::miette!(
            "Cannot specify both --project-only and --global-only"
        ));
    }

    if args.project_only {
        return show_file("Project config:", &project_config_path(global)?);
    }
    if args.global_only {
        return show_file("Global config:", &global_config_path()?);
    }

    let format = global.format.resolve(None, OutputFormat::Auto);
    if helpers::print_structured(&config, format)? {
        return Ok(());
    }

    println!("{}", style("Effective Configuration").bold().underlined());
    println!();

    print_config_value("api_url", config.api_url.as_deref());
    let timeout = config.timeout_secs.map(|t| t.to_string());
    print_config_value("timeout_secs", timeout.as_deref());
    print_config_value("default_format", config.default_format.as_deref());
    let orphans = config.orphans.map(|o| o.to_string());
    print_config_value("orphans", orphans.as_deref());
    let pipeline = config.pipeline.as_ref().map(|p| join_stages(p.stages()));
    print_config_value("pipeline", pipeline.as_deref());
    let fallback = config.capacity.fallback.map(|f| f.to_string());
    print_config_value("capacity.fallback", fallback.as_deref());
    for (line, cap) in &config.capacity.lines {
        print_config_value(&format!("capacity.lines.{}", line), Some(&cap.to_string()));
    }
    for (resource, path) in &config.endpoints {
        print_config_value(&format!("endpoints.{}", resource), Some(path));
    }

    println!();
    println!("{}", style("Config Sources (in priority order):").dim());
    println!("  1. Environment variables (MFT_API_URL, MFT_TIMEOUT, MFT_TOKEN)");
    println!("  2. Project config (.mft/config.yaml)");
    println!("  3. Global config (~/.config/mft/config.yaml)");

    Ok(())
}

fn run_set(args: SetArgs, global: &GlobalOpts) -> Result<()> {
    check_key(&args.key)?;

    let config_path = if args.global {
        global_config_path()?
    } else {
        project_config_path(global)?
    };

    let mut config_map = read_mapping(&config_path)?;
    set_nested_value(
        &mut config_map,
        &key_path(&args.key),
        parse_value(&args.key, &args.value),
    );
    check_mapping(&config_map)?;

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent).into_diagnostic()?;
    }
    let yaml = serde_yml::to_string(&config_map).into_diagnostic()?;
    fs::write(&config_path, yaml).into_diagnostic()?;

    let scope = if args.global { "global" } else { "project" };
    println!(
        "{} Set {} {} {} in {} config",
        style("✓").green(),
        style(&args.key).cyan(),
        style("→").dim(),
        style(&args.value).yellow(),
        scope
    );

    Ok(())
}

fn run_unset(args: UnsetArgs, global: &GlobalOpts) -> Result<()> {
    let config_path = if args.global {
        global_config_path()?
    } else {
        project_config_path(global)?
    };

    if !config_path.exists() {
        return Err(miette::miette!(
            "Config file does not exist: {}",
            config_path.display()
        ));
    }

    let mut config_map = read_mapping(&config_path)?;
    if !unset_nested_value(&mut config_map, &key_path(&args.key)) {
        return Err(miette::miette!("Key '{}' not found in config", args.key));
    }

    let yaml = serde_yml::to_string(&config_map).into_diagnostic()?;
    fs::write(&config_path, yaml).into_diagnostic()?;

    let scope = if args.global { "global" } else { "project" };
    println!(
        "{} Removed {} from {} config",
        style("✓").green(),
        style(&args.key).cyan(),
        scope
    );

    Ok(())
}

fn run_path(args: PathArgs, global: &GlobalOpts) -> Result<()> {
    if args.project_only && args.global_only {
        return Err(miette::miette!(
            "Cannot specify both --project-only and --global-only"
        ));
    }

    if args.project_only {
        println!("{}", project_config_path(global)?.display());
    } else if args.global_only {
        println!("{}", global_config_path()?.display());
    } else {
        let global_path = global_config_path()?;

        println!("{}", style("Configuration file paths:").bold());
        println!();
        println!("  {} {}", style("Global:").cyan(), global_path.display());
        print_exists(&global_path, 9);

        println!();
        match project_config_path(global) {
            Ok(path) => {
                println!("  {} {}", style("Project:").cyan(), path.display());
                print_exists(&path, 10);
            }
            Err(_) => println!(
                "  {} {}",
                style("Project:").cyan(),
                style("(not in an mft project)").dim()
            ),
        }
    }

    Ok(())
}

fn run_keys() -> Result<()> {
    println!("{}", style("Available configuration keys:").bold());
    println!();

    for (key, description) in VALID_KEYS {
        println!("  {:<24} {}", style(key).cyan(), style(description).dim());
    }

    println!();
    println!(
        "{}",
        style("Use 'mft config set <key> <value>' to set a value.").dim()
    );

    Ok(())
}

// Helper functions

fn global_config_path() -> Result<PathBuf> {
    Config::global_config_path()
        .ok_or_else(|| miette::miette!("Could not determine global config directory"))
}

fn project_config_path(global: &GlobalOpts) -> Result<PathBuf> {
    Ok(helpers::project(global)?.config_path())
}

fn check_key(key: &str) -> Result<()> {
    let fixed = VALID_KEYS
        .iter()
        .any(|(k, _)| !k.contains('<') && *k == key);
    let prefixed = PREFIX_KEYS
        .iter()
        .any(|p| key.strip_prefix(p).is_some_and(|rest| !rest.is_empty()));
    if fixed || prefixed {
        Ok(())
    } else {
        Err(miette::miette!(
            help = "Run `mft config keys` to list valid keys",
            "Unknown configuration key '{}'",
            key
        ))
    }
}

fn get_config_value(config: &Config, key: &str) -> Option<String> {
    if let Some(line) = key.strip_prefix("capacity.lines.") {
        return config.capacity.lines.get(line).map(|c| c.to_string());
    }
    if let Some(resource) = key.strip_prefix("endpoints.") {
        return config.endpoints.get(resource).cloned();
    }
    match key {
        "api_url" => config.api_url.clone(),
        "timeout_secs" => config.timeout_secs.map(|t| t.to_string()),
        "default_format" => config.default_format.clone(),
        "orphans" => config.orphans.map(|o| o.to_string()),
        "pipeline" => config.pipeline.as_ref().map(|p| join_stages(p.stages())),
        "capacity.fallback" => config.capacity.fallback.map(|f| f.to_string()),
        _ => None,
    }
}

fn join_stages(stages: &[crate::core::Stage]) -> String {
    stages
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

/// Command-line text as a YAML value
///
/// Scalars keep their YAML type so `timeout_secs 60` is stored as a number.
/// Endpoints and the API URL always stay strings.
fn parse_value(key: &str, raw: &str) -> Value {
    if key == "pipeline" {
        return Value::Sequence(
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| Value::String(s.to_string()))
                .collect(),
        );
    }
    if key == "api_url" || key.starts_with("endpoints.") {
        return Value::String(raw.to_string());
    }
    match serde_yml::from_str::<Value>(raw) {
        Ok(v @ (Value::Bool(_) | Value::Number(_) | Value::String(_))) => v,
        _ => Value::String(raw.to_string()),
    }
}

/// Reject a config file that would no longer load
fn check_mapping(map: &Value) -> Result<()> {
    let config: Config = serde_yml::from_value(map.clone()).map_err(|e| {
        miette::miette!(
            help = "Run `mft config keys` for the expected values",
            "Invalid configuration value: {}",
            e
        )
    })?;
    config.capacity_table()?;
    Ok(())
}

fn read_mapping(path: &Path) -> Result<Value> {
    if !path.exists() {
        return Ok(Value::Mapping(Mapping::new()));
    }
    let content = fs::read_to_string(path).into_diagnostic()?;
    match serde_yml::from_str::<Value>(&content) {
        Ok(Value::Mapping(map)) => Ok(Value::Mapping(map)),
        Ok(Value::Null) => Ok(Value::Mapping(Mapping::new())),
        Ok(_) => Err(miette::miette!(
            "{} is not a YAML mapping",
            path.display()
        )),
        Err(e) => Err(crate::parse::SyntaxError::from_yaml_error(
            &e,
            &content,
            &path.display().to_string(),
        )
        .into()),
    }
}

fn print_config_value(key: &str, value: Option<&str>) {
    if let Some(v) = value {
        println!("  {}: {}", style(key).cyan(), style(v).yellow());
    } else {
        println!("  {}: {}", style(key).cyan(), style("(not set)").dim());
    }
}

fn print_exists(path: &Path, indent: usize) {
    let note = if path.exists() {
        style("(exists)").green()
    } else {
        style("(not created)").dim()
    };
    println!("{:indent$}{}", "", note, indent = indent);
}

fn show_file(title: &str, path: &Path) -> Result<()> {
    println!("{} {}", style(title).bold(), style(path.display()).dim());
    println!();

    if path.exists() {
        let content = fs::read_to_string(path).into_diagnostic()?;
        print!("{}", content);
    } else {
        println!("{}", style("(not created)").dim());
    }

    Ok(())
}

fn set_nested_value(root: &mut Value, path: &[&str], value: Value) {
    let Value::Mapping(map) = root else {
        return;
    };
    let Some((head, rest)) = path.split_first() else {
        return;
    };
    let head = Value::String(head.to_string());
    if rest.is_empty() {
        map.insert(head, value);
        return;
    }
    let needs_mapping = map.get(&head).map_or(true, |child| !child.is_mapping());
    if needs_mapping {
        map.insert(head.clone(), Value::Mapping(Mapping::new()));
    }
    if let Some(child) = map.get_mut(&head) {
        set_nested_value(child, rest, value);
    }
}

fn unset_nested_value(root: &mut Value, path: &[&str]) -> bool {
    let Value::Mapping(map) = root else {
        return false;
    };
    let Some((head, rest)) = path.split_first() else {
        return false;
    };
    let head = Value::String(head.to_string());
    if rest.is_empty() {
        return map.remove(&head).is_some();
    }
    map.get_mut(&head)
        .is_some_and(|child| unset_nested_value(child, rest))
}

/// Split a key into mapping segments
///
/// Line names and resources may contain dots, so everything after
/// `capacity.lines.` or `endpoints.` is a single segment.
fn key_path(key: &str) -> Vec<&str> {
    if let Some(line) = key.strip_prefix("capacity.lines.") {
        return vec!["capacity", "lines", line];
    }
    if let Some(resource) = key.strip_prefix("endpoints.") {
        return vec!["endpoints", resource];
    }
    key.split('.').collect()
}
