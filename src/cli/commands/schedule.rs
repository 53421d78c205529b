//! `mft schedule` command - schedule progress

use chrono::NaiveDate;
use clap::Subcommand;
use console::style;
use miette::Result;

use crate::analysis::{schedule_status, ScheduleStatus};
use crate::cli::helpers::{self, format_kg, Loaded, SourceArgs};
use crate::cli::table::{CellValue, ColumnDef, TableConfig, TableFormatter, TableRow};
use crate::cli::{GlobalOpts, OutputFormat};

#[derive(Subcommand, Debug)]
pub enum ScheduleCommands {
    /// Planned pieces against forged and dispatched pieces
    Status(StatusArgs),
}

#[derive(clap::Args, Debug)]
pub struct StatusArgs {
    /// Only schedule lines and records of this month (YYYY-MM)
    #[arg(long, short = 'm', value_parser = helpers::parse_month)]
    pub month: Option<NaiveDate>,

    /// Hide lines whose planned pieces are all dispatched
    #[arg(long)]
    pub open: bool,

    #[command(flatten)]
    pub source: SourceArgs,
}

const COLUMNS: &[ColumnDef] = &[
    ColumnDef::new("component", "COMPONENT", 16),
    ColumnDef::new("customer", "CUSTOMER", 18),
    ColumnDef::new("line", "LINE", 12),
    ColumnDef::new("planned", "PLANNED", 8),
    ColumnDef::new("weight", "WEIGHT", 12),
    ColumnDef::new("batches", "BATCHES", 7),
    ColumnDef::new("forged", "FORGED", 8),
    ColumnDef::new("dispatched", "DISPATCHED", 10),
    ColumnDef::new("remaining", "REMAINING", 9),
    ColumnDef::new("completion", "DONE", 6),
];

pub fn run(cmd: ScheduleCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        ScheduleCommands::Status(args) => run_status(args, global),
    }
}

fn run_status(args: StatusArgs, global: &GlobalOpts) -> Result<()> {
    let loaded = Loaded::open(&args.source, global, true)?;
    loaded.report_gaps(global);

    let mut status = schedule_status(&loaded.data.schedule, &loaded.trace, args.month);
    if args.open {
        status.retain(|s| s.remaining_pieces > 0);
    }

    let format = loaded.format(global, OutputFormat::Tsv);
    if helpers::print_structured(&status, format)? {
        return Ok(());
    }

    if status.is_empty() && !global.quiet {
        eprintln!("{} No schedule lines to report", style("!").yellow());
    }

    let rows = status.iter().map(status_row);
    let config = if global.quiet {
        TableConfig::for_pipe()
    } else {
        TableConfig::default()
    };
    TableFormatter::new(COLUMNS, "schedule line")
        .with_config(config)
        .output(rows, format)
}

fn status_row(s: &ScheduleStatus) -> TableRow {
    TableRow::new(s.component.as_str())
        .cell("component", CellValue::Id(s.component.clone()))
        .cell(
            "customer",
            s.customer
                .clone()
                .map_or(CellValue::Empty, CellValue::Text),
        )
        .cell("line", CellValue::Text(s.line.clone()))
        .cell("planned", CellValue::Number(i64::from(s.planned_pieces)))
        .cell("weight", CellValue::Text(format_kg(s.planned_weight)))
        .cell("batches", CellValue::Number(s.batches as i64))
        .cell("forged", pieces(s.forged_pieces))
        .cell("dispatched", pieces(s.dispatched_pieces))
        .cell("remaining", pieces(s.remaining_pieces))
        .cell("completion", CellValue::Progress(s.completion_pct))
}

fn pieces(n: u64) -> CellValue {
    CellValue::Number(i64::try_from(n).unwrap_or(i64::MAX))
}
