//! `mft capacity` command - production line utilization

use chrono::NaiveDate;
use clap::Subcommand;
use console::style;
use miette::Result;

use crate::analysis::{months_covered, production_entries, utilization, LineUtilization};
use crate::cli::helpers::{self, format_kg, Loaded, SourceArgs};
use crate::cli::table::{CellValue, ColumnDef, TableConfig, TableFormatter, TableRow};
use crate::cli::{GlobalOpts, OutputFormat};

#[derive(Subcommand, Debug)]
pub enum CapacityCommands {
    /// Forged weight against capacity, per production line
    Report(ReportArgs),
}

#[derive(clap::Args, Debug)]
pub struct ReportArgs {
    /// Only schedule lines and records of this month (YYYY-MM)
    ///
    /// Without it, every month the data covers is reported and each line's
    /// monthly capacity is multiplied by that number of months.
    #[arg(long, short = 'm', value_parser = helpers::parse_month)]
    pub month: Option<NaiveDate>,

    #[command(flatten)]
    pub source: SourceArgs,
}

const COLUMNS: &[ColumnDef] = &[
    ColumnDef::new("line", "LINE", 16),
    ColumnDef::new("components", "COMPONENTS", 10),
    ColumnDef::new("planned", "PLANNED", 12),
    ColumnDef::new("produced", "PRODUCED", 12),
    ColumnDef::new("capacity", "CAPACITY", 12),
    ColumnDef::new("utilization", "UTIL", 7),
    ColumnDef::new("tier", "TIER", 7),
];

pub fn run(cmd: CapacityCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        CapacityCommands::Report(args) => run_report(args, global),
    }
}

fn run_report(args: ReportArgs, global: &GlobalOpts) -> Result<()> {
    let loaded = Loaded::open(&args.source, global, true)?;
    let table = loaded.config.capacity_table()?;
    loaded.report_gaps(global);

    if loaded.data.schedule.is_empty() && !global.quiet {
        eprintln!(
            "{} No schedule lines found; run `mft fetch` without --no-schedule",
            style("!").yellow()
        );
    }

    let entries = production_entries(&loaded.data.schedule, &loaded.trace, args.month);
    let months = match args.month {
        Some(_) => 1,
        None => months_covered(&loaded.data.schedule, &loaded.trace),
    };
    let lines = utilization(&entries, &table, months);

    let format = loaded.format(global, OutputFormat::Tsv);
    if helpers::print_structured(&lines, format)? {
        return Ok(());
    }

    let rows = lines.iter().map(line_row);
    let config = if global.quiet {
        TableConfig::for_pipe()
    } else {
        TableConfig::default()
    };
    TableFormatter::new(COLUMNS, "line")
        .with_config(config)
        .output(rows, format)?;

    if months > 1 && !lines.is_empty() && !global.quiet && format == OutputFormat::Tsv {
        println!(
            "{} Capacity covers {} months; pass --month YYYY-MM for a single month",
            style("*").yellow(),
            months
        );
    }

    let fallback: Vec<&str> = lines
        .iter()
        .filter(|l| l.fallback_capacity)
        .map(|l| l.line.as_str())
        .collect();
    if !fallback.is_empty() && !global.quiet && format == OutputFormat::Tsv {
        println!(
            "{} Fallback capacity ({}) used for: {}",
            style("*").yellow(),
            format_kg(table.fallback),
            fallback.join(", ")
        );
    }
    Ok(())
}

fn line_row(l: &LineUtilization) -> TableRow {
    let capacity = if l.fallback_capacity {
        format!("{} *", format_kg(l.capacity))
    } else {
        format_kg(l.capacity)
    };
    TableRow::new(l.line.as_str())
        .cell("line", CellValue::Id(l.line.clone()))
        .cell("components", CellValue::Number(l.components as i64))
        .cell("planned", CellValue::Text(format_kg(l.planned_weight)))
        .cell("produced", CellValue::Text(format_kg(l.produced_weight)))
        .cell("capacity", CellValue::Text(capacity))
        .cell("utilization", CellValue::Percent(l.utilization_pct))
        .cell("tier", CellValue::Tier(l.tier))
}
