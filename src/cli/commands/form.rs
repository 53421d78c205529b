//! `mft form` command - schema-driven production-entry forms

use clap::Subcommand;
use console::style;
use csv::ReaderBuilder;
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::cli::helpers;
use crate::cli::table::{CellValue, ColumnDef, TableConfig, TableFormatter, TableRow};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::{ApiClient, Config};
use crate::forms::{
    describe, read_values, validate, FormError, FormOrigin, FormRegistry, FormSchema, FormWizard,
    Payload, Violation,
};

#[derive(Subcommand, Debug)]
pub enum FormCommands {
    /// List available forms
    List,

    /// Describe a form's fields, rules and derived values
    Show(ShowArgs),

    /// Fill a form interactively
    Fill(FillArgs),

    /// Check a YAML/JSON entry against a form without submitting
    Validate(EntryArgs),

    /// Validate an entry and submit it to the ERP
    Submit(SubmitArgs),

    /// Validate and submit one entry per CSV row
    Import(ImportArgs),
}

#[derive(clap::Args, Debug)]
pub struct ShowArgs {
    /// Form name (e.g. forging)
    pub name: String,
}

#[derive(clap::Args, Debug)]
pub struct FillArgs {
    /// Form name (e.g. forging)
    pub name: String,

    /// Seed the prompts with values from a YAML/JSON file
    #[arg(long, value_name = "FILE")]
    pub from: Option<PathBuf>,

    /// Write the validated entry to a file instead of stdout
    #[arg(long, short = 'o', value_name = "FILE")]
    pub out: Option<PathBuf>,

    /// Submit the entry once it validates
    #[arg(long)]
    pub submit: bool,
}

#[derive(clap::Args, Debug)]
pub struct EntryArgs {
    /// Form name (e.g. forging)
    pub name: String,

    /// YAML or JSON file with field values
    pub file: PathBuf,
}

#[derive(clap::Args, Debug)]
pub struct SubmitArgs {
    #[command(flatten)]
    pub entry: EntryArgs,

    /// Print the payload instead of sending it
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(clap::Args, Debug)]
pub struct ImportArgs {
    /// Form name (e.g. forging)
    pub name: String,

    /// CSV file; the header row names the fields
    pub file: PathBuf,

    /// Validate rows without submitting
    #[arg(long)]
    pub dry_run: bool,

    /// Submit the valid rows even when others fail
    #[arg(long)]
    pub skip_errors: bool,
}

const LIST_COLUMNS: &[ColumnDef] = &[
    ColumnDef::new("name", "NAME", 16),
    ColumnDef::new("title", "TITLE", 28),
    ColumnDef::new("stage", "STAGE", 18),
    ColumnDef::new("fields", "FIELDS", 6),
    ColumnDef::new("endpoint", "ENDPOINT", 32),
    ColumnDef::new("origin", "ORIGIN", 24),
];

#[derive(Debug, Serialize)]
struct FormSummary<'a> {
    name: &'a str,
    title: &'a str,
    stage: Option<crate::core::Stage>,
    fields: usize,
    endpoint: String,
    origin: String,
}

/// Import statistics
#[derive(Debug, Default)]
struct ImportStats {
    rows_processed: usize,
    submitted: usize,
    invalid: usize,
    failed: usize,
}

pub fn run(cmd: FormCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        FormCommands::List => run_list(global),
        FormCommands::Show(args) => run_show(args, global),
        FormCommands::Fill(args) => run_fill(args, global),
        FormCommands::Validate(args) => run_validate(args, global),
        FormCommands::Submit(args) => run_submit(args, global),
        FormCommands::Import(args) => run_import(args, global),
    }
}

/// Built-in forms plus the project's overrides
fn registry(global: &GlobalOpts) -> Result<FormRegistry> {
    let registry = match helpers::project(global) {
        Ok(project) => FormRegistry::with_overrides(&project.forms_dir())?,
        Err(_) => FormRegistry::builtin()?,
    };
    Ok(registry)
}

/// Endpoint for a form: `endpoints.<form>` from config, else the schema's own
fn endpoint(config: &Config, schema: &FormSchema) -> String {
    config
        .endpoints
        .get(&schema.name)
        .cloned()
        .unwrap_or_else(|| schema.endpoint.clone())
}

fn run_list(global: &GlobalOpts) -> Result<()> {
    let registry = registry(global)?;
    let config = helpers::config(global);
    let root = helpers::project(global).ok().map(|p| p.root().to_path_buf());

    let summaries: Vec<FormSummary> = registry
        .iter()
        .map(|(schema, origin)| FormSummary {
            name: &schema.name,
            title: &schema.title,
            stage: schema.stage,
            fields: schema.fields.len(),
            endpoint: endpoint(&config, schema),
            origin: match (origin, &root) {
                (FormOrigin::Project(path), Some(root)) => helpers::relative_display(path, root),
                _ => origin.to_string(),
            },
        })
        .collect();

    let format = global
        .format
        .resolve(config.default_format.as_deref(), OutputFormat::Tsv);
    if helpers::print_structured(&summaries, format)? {
        return Ok(());
    }

    let rows = summaries.iter().map(|s| {
        TableRow::new(s.name)
            .cell("name", CellValue::Id(s.name.to_string()))
            .cell("title", CellValue::Text(s.title.to_string()))
            .cell(
                "stage",
                s.stage
                    .map_or(CellValue::Empty, |st| CellValue::Text(st.as_str().to_string())),
            )
            .cell("fields", CellValue::Number(s.fields as i64))
            .cell("endpoint", CellValue::Text(s.endpoint.clone()))
            .cell("origin", CellValue::Text(s.origin.clone()))
    });
    let table_config = if global.quiet {
        TableConfig::for_pipe()
    } else {
        TableConfig::default()
    };
    TableFormatter::new(LIST_COLUMNS, "form")
        .with_config(table_config)
        .output(rows, format)
}

fn run_show(args: ShowArgs, global: &GlobalOpts) -> Result<()> {
    let registry = registry(global)?;
    let schema = registry.get(&args.name)?;

    if helpers::print_structured(schema, global.format)? {
        return Ok(());
    }
    print!("{}", describe(schema));
    if let Some(origin) = registry.origin(&schema.name) {
        println!();
        println!("{} {}", style("Source:").dim(), style(origin).dim());
    }
    Ok(())
}

fn run_fill(args: FillArgs, global: &GlobalOpts) -> Result<()> {
    let registry = registry(global)?;
    let schema = registry.get(&args.name)?;

    let prefill = match &args.from {
        Some(path) => read_values(path)?.0,
        None => Map::new(),
    };
    let values = FormWizard::new(schema).run(&prefill)?;

    let payload = match validate(schema, &values) {
        Ok(payload) => payload,
        Err(violations) => {
            print_violations(&violations);
            return Err(miette::miette!(
                "{} entry has {} error(s); nothing was saved",
                schema.name,
                violations.len()
            ));
        }
    };

    let yaml = serde_yml::to_string(&payload).into_diagnostic()?;
    match &args.out {
        Some(path) => {
            std::fs::write(path, &yaml).into_diagnostic()?;
            println!(
                "{} Saved entry to {}",
                style("✓").green(),
                style(path.display()).cyan()
            );
        }
        None if !args.submit => print!("{}", yaml),
        None => {}
    }

    if args.submit {
        let config = helpers::config(global);
        let client = helpers::client(global)?;
        submit(&client, &endpoint(&config, schema), &payload, global)?;
    }
    Ok(())
}

fn run_validate(args: EntryArgs, global: &GlobalOpts) -> Result<()> {
    let registry = registry(global)?;
    let schema = registry.get(&args.name)?;
    let payload = validate_file(schema, &args.file)?;

    if !global.quiet {
        println!(
            "{} {} is a valid {} entry ({} field(s))",
            style("✓").green(),
            style(args.file.display()).cyan(),
            style(&schema.name).yellow(),
            payload.len()
        );
    }
    Ok(())
}

fn run_submit(args: SubmitArgs, global: &GlobalOpts) -> Result<()> {
    let registry = registry(global)?;
    let schema = registry.get(&args.entry.name)?;
    let payload = validate_file(schema, &args.entry.file)?;
    let config = helpers::config(global);
    let endpoint = endpoint(&config, schema);

    if args.dry_run {
        if !global.quiet {
            eprintln!(
                "{} Would POST to {}",
                style("→").blue(),
                style(&endpoint).cyan()
            );
        }
        let format = match global.format {
            OutputFormat::Yaml => OutputFormat::Yaml,
            _ => OutputFormat::Json,
        };
        helpers::print_structured(&payload, format)?;
        return Ok(());
    }

    let client = helpers::client(global)?;
    submit(&client, &endpoint, &payload, global)
}

fn run_import(args: ImportArgs, global: &GlobalOpts) -> Result<()> {
    let registry = registry(global)?;
    let schema = registry.get(&args.name)?;

    if !args.file.exists() {
        return Err(miette::miette!("File not found: {}", args.file.display()));
    }

    println!(
        "{} Importing {} entries from {}{}",
        style("→").blue(),
        style(&schema.name).cyan(),
        style(args.file.display()).yellow(),
        if args.dry_run {
            style(" (dry run)").dim().to_string()
        } else {
            String::new()
        }
    );
    println!();

    let rows = read_csv_rows(&args.file)?;
    let mut stats = ImportStats::default();
    let mut valid: Vec<(usize, Payload)> = Vec::new();

    for (row_num, values) in rows {
        stats.rows_processed += 1;
        match validate(schema, &values) {
            Ok(payload) => valid.push((row_num, payload)),
            Err(violations) => {
                stats.invalid += 1;
                println!("{} Row {}:", style("✗").red(), row_num);
                print_violations(&violations);
            }
        }
    }

    if stats.invalid > 0 && !args.skip_errors {
        print_import_summary(&stats, args.dry_run);
        return Err(miette::miette!(
            help = "Fix the rows above, or pass --skip-errors to submit the valid ones",
            "{} invalid row(s); nothing was submitted",
            stats.invalid
        ));
    }

    if !args.dry_run && !valid.is_empty() {
        let config = helpers::config(global);
        let client = helpers::client(global)?;
        let endpoint = endpoint(&config, schema);
        for (row_num, payload) in &valid {
            match client.submit_form(&endpoint, payload.as_map()) {
                Ok(_) => stats.submitted += 1,
                Err(e) if args.skip_errors => {
                    stats.failed += 1;
                    println!("{} Row {}: {}", style("✗").red(), row_num, e);
                }
                Err(e) => {
                    print_import_summary(&stats, args.dry_run);
                    return Err(miette::Report::new(e)
                        .wrap_err(format!("row {} was not submitted", row_num)));
                }
            }
        }
    }

    print_import_summary(&stats, args.dry_run);
    if stats.failed > 0 {
        return Err(miette::miette!("{} row(s) were rejected", stats.failed));
    }
    Ok(())
}

/// Read a CSV file into one value map per row, keyed by header
///
/// Row numbers count the header as row 1. Empty cells are left out.
fn read_csv_rows(path: &Path) -> Result<Vec<(usize, Map<String, Value>)>> {
    let file = File::open(path).into_diagnostic()?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(BufReader::new(file));

    let headers: Vec<String> = reader
        .headers()
        .into_diagnostic()?
        .iter()
        .map(|h| h.to_lowercase())
        .collect();

    let mut rows = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let record =
            result.map_err(|e| miette::miette!("CSV parse error at row {}: {}", idx + 2, e))?;
        let values: Map<String, Value> = headers
            .iter()
            .zip(record.iter())
            .filter(|(h, cell)| !h.is_empty() && !cell.is_empty())
            .map(|(h, cell)| (h.clone(), Value::String(cell.to_string())))
            .collect();
        if !values.is_empty() {
            rows.push((idx + 2, values));
        }
    }
    Ok(rows)
}

fn print_import_summary(stats: &ImportStats, dry_run: bool) {
    println!();
    println!("{}", style("─".repeat(40)).dim());
    println!("{}", style("Import Summary").bold());
    println!("{}", style("─".repeat(40)).dim());
    println!("  Rows processed: {}", stats.rows_processed);
    if dry_run {
        println!(
            "  Would submit:   {}",
            style(stats.rows_processed - stats.invalid).green()
        );
    } else {
        println!("  Submitted:      {}", style(stats.submitted).green());
    }
    if stats.invalid > 0 {
        println!("  Invalid:        {}", style(stats.invalid).red());
    }
    if stats.failed > 0 {
        println!("  Rejected:       {}", style(stats.failed).red());
    }
}

/// Validate an entry file, reporting violations at their keys in the file
fn validate_file(schema: &FormSchema, path: &Path) -> Result<Payload> {
    let (values, source) = read_values(path)?;
    validate(schema, &values).map_err(|violations| {
        FormError::new(
            &schema.name,
            &path.display().to_string(),
            &source,
            &violations,
        )
        .into()
    })
}

fn print_violations(violations: &[Violation]) {
    for v in violations {
        println!("  {} {}", style("•").red(), v);
        if let Some(help) = v.help() {
            println!("    {}", style(help).dim());
        }
    }
}

fn submit(
    client: &ApiClient,
    endpoint: &str,
    payload: &Payload,
    global: &GlobalOpts,
) -> Result<()> {
    let response = client.submit_form(endpoint, payload.as_map())?;
    if !global.quiet {
        let id = response
            .get("id")
            .map(|id| match id {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            });
        match id {
            Some(id) => println!(
                "{} Submitted to {} (id {})",
                style("✓").green(),
                style(endpoint).cyan(),
                style(id).yellow()
            ),
            None => println!(
                "{} Submitted to {}",
                style("✓").green(),
                style(endpoint).cyan()
            ),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_endpoint_override_by_form_name() {
        let registry = FormRegistry::builtin().unwrap();
        let schema = registry.get("forging").unwrap();
        let mut config = Config::default();
        assert_eq!(endpoint(&config, schema), schema.endpoint);

        config
            .endpoints
            .insert("forging".to_string(), "api/v2/forging/".to_string());
        assert_eq!(endpoint(&config, schema), "api/v2/forging/");
    }

    #[test]
    fn test_read_csv_rows_numbers_rows_and_drops_blanks() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("entries.csv");
        std::fs::write(
            &path,
            "Batch_Number, production ,remarks\nB1, 40 ,\n,,\nB2,55,night shift\n",
        )
        .unwrap();

        let rows = read_csv_rows(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].0, 2);
        assert_eq!(rows[0].1.get("batch_number"), Some(&Value::from("B1")));
        assert_eq!(rows[0].1.get("production"), Some(&Value::from("40")));
        assert!(rows[0].1.get("remarks").is_none());
        assert_eq!(rows[1].0, 4);
        assert_eq!(rows[1].1.get("remarks"), Some(&Value::from("night shift")));
    }

    #[test]
    fn test_validate_file_reports_form_error() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("entry.yaml");
        std::fs::write(&path, "bogus_field: 1\n").unwrap();

        let registry = FormRegistry::builtin().unwrap();
        let schema = registry.get("forging").unwrap();
        let err = validate_file(schema, &path).unwrap_err();
        let form_err = err.downcast_ref::<FormError>().unwrap();
        assert!(form_err.violation_count() >= 1);
    }
}
