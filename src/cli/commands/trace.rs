//! `mft trace` command - per-batch stage timelines

use clap::Subcommand;
use console::style;
use miette::Result;
use serde::Serialize;

use crate::analysis::{BatchTimeline, StageState, TimelineSummary};
use crate::cli::helpers::{self, Loaded, SourceArgs};
use crate::cli::table::{CellValue, ColumnDef, TableConfig, TableFormatter, TableRow};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::stage::{Pipeline, Stage};
use crate::entities::{Batch, BatchKey};

#[derive(Subcommand, Debug)]
pub enum TraceCommands {
    /// List batches with their current stage and progress
    List(ListArgs),

    /// Show one batch's records stage by stage
    Show(ShowArgs),

    /// Count batches waiting at each stage
    Wip(WipArgs),
}

#[derive(clap::Args, Debug)]
pub struct ListArgs {
    /// Only batches currently waiting on this stage
    #[arg(long, short = 's')]
    pub stage: Option<Stage>,

    /// Only batches that have not finished the pipeline
    #[arg(long)]
    pub incomplete: bool,

    /// Only batches whose component contains this text (case-insensitive)
    #[arg(long, short = 'c')]
    pub component: Option<String>,

    /// Show at most this many batches
    #[arg(long, short = 'n')]
    pub limit: Option<usize>,

    #[command(flatten)]
    pub source: SourceArgs,
}

#[derive(clap::Args, Debug)]
pub struct ShowArgs {
    /// Batch number / Block MT id
    pub key: String,

    #[command(flatten)]
    pub source: SourceArgs,
}

#[derive(clap::Args, Debug)]
pub struct WipArgs {
    #[command(flatten)]
    pub source: SourceArgs,
}

const LIST_COLUMNS: &[ColumnDef] = &[
    ColumnDef::new("key", "BATCH", 16),
    ColumnDef::new("component", "COMPONENT", 16),
    ColumnDef::new("customer", "CUSTOMER", 20),
    ColumnDef::new("stage", "CURRENT STAGE", 18),
    ColumnDef::new("progress", "PROGRESS", 8),
    ColumnDef::new("records", "RECORDS", 7),
    ColumnDef::new("process_time", "PROCESS TIME", 12),
];

const STAGE_COLUMNS: &[ColumnDef] = &[
    ColumnDef::new("stage", "STAGE", 18),
    ColumnDef::new("state", "STATE", 11),
    ColumnDef::new("records", "RECORDS", 7),
    ColumnDef::new("first_date", "FIRST DATE", 10),
    ColumnDef::new("quantity", "QTY", 8),
];

const WIP_COLUMNS: &[ColumnDef] = &[
    ColumnDef::new("stage", "STAGE", 18),
    ColumnDef::new("batches", "BATCHES", 7),
];

/// One pipeline stage of a batch, as `trace show` reports it
#[derive(Debug, Serialize)]
struct StageDetail {
    stage: Stage,
    state: StageState,
    records: usize,
    first_date: Option<chrono::NaiveDate>,
    quantity: u32,
}

#[derive(Debug, Serialize)]
struct TimelineDetail<'a> {
    #[serde(flatten)]
    summary: TimelineSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    batch: Option<&'a Batch>,
    stages: Vec<StageDetail>,
}

pub fn run(cmd: TraceCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        TraceCommands::List(args) => run_list(args, global),
        TraceCommands::Show(args) => run_show(args, global),
        TraceCommands::Wip(args) => run_wip(args, global),
    }
}

fn run_list(args: ListArgs, global: &GlobalOpts) -> Result<()> {
    let loaded = Loaded::open(&args.source, global, false)?;
    loaded.report_gaps(global);

    let needle = args.component.as_deref().map(str::to_lowercase);
    let mut summaries: Vec<TimelineSummary> = loaded
        .trace
        .summaries()
        .into_iter()
        .filter(|s| args.stage.map_or(true, |stage| s.current_stage == Some(stage)))
        .filter(|s| !args.incomplete || s.current_stage.is_some())
        .filter(|s| {
            needle.as_deref().map_or(true, |n| {
                s.component
                    .as_deref()
                    .is_some_and(|c| c.to_lowercase().contains(n))
            })
        })
        .collect();
    if let Some(limit) = args.limit {
        summaries.truncate(limit);
    }

    let format = loaded.format(global, OutputFormat::Tsv);
    if helpers::print_structured(&summaries, format)? {
        return Ok(());
    }

    let rows = summaries.iter().map(summary_row);
    let config = if global.quiet {
        TableConfig::for_pipe()
    } else {
        TableConfig::default()
    };
    TableFormatter::new(LIST_COLUMNS, "batch")
        .with_config(config)
        .output(rows, format)
}

fn summary_row(s: &TimelineSummary) -> TableRow {
    TableRow::new(s.key.as_str())
        .cell("key", CellValue::Id(s.key.to_string()))
        .cell("component", optional_text(s.component.as_deref()))
        .cell("customer", optional_text(s.customer.as_deref()))
        .cell("stage", CellValue::Stage(s.current_stage))
        .cell("progress", CellValue::Progress(s.progress_pct))
        .cell("records", CellValue::Number(s.records as i64))
        .cell(
            "process_time",
            CellValue::ProcessTime(match s.process_time_days {
                Some(days) => crate::analysis::ProcessTime::Days(days),
                None => crate::analysis::ProcessTime::NotAvailable,
            }),
        )
}

fn optional_text(s: Option<&str>) -> CellValue {
    match s {
        Some(s) => CellValue::Text(s.to_string()),
        None => CellValue::Empty,
    }
}

fn run_show(args: ShowArgs, global: &GlobalOpts) -> Result<()> {
    let loaded = Loaded::open(&args.source, global, false)?;
    loaded.report_gaps(global);

    let key = BatchKey::new(&args.key)
        .ok_or_else(|| miette::miette!("Batch key cannot be empty"))?;
    let timeline = loaded.trace.get(&key).ok_or_else(|| {
        miette::miette!(
            help = "Run `mft trace list` to see known batches",
            "No batch '{}' in the data",
            key
        )
    })?;

    let pipeline = &loaded.trace.pipeline;
    let detail = TimelineDetail {
        summary: timeline.summary(pipeline),
        batch: timeline.batch.as_ref(),
        stages: stage_details(timeline, pipeline),
    };

    let format = loaded.format(global, OutputFormat::Auto);
    if helpers::print_structured(&detail, format)? {
        return Ok(());
    }

    print_header(&detail, timeline);

    let rows = detail.stages.iter().map(|d| {
        TableRow::new(d.stage.as_str())
            .cell("stage", CellValue::Text(d.stage.label().to_string()))
            .cell("state", CellValue::Text(d.state.to_string()))
            .cell("records", CellValue::Number(d.records as i64))
            .cell("first_date", CellValue::Date(d.first_date))
            .cell(
                "quantity",
                if d.records == 0 {
                    CellValue::Empty
                } else {
                    CellValue::Number(i64::from(d.quantity))
                },
            )
    });
    let format = match format {
        OutputFormat::Auto => OutputFormat::Tsv,
        other => other,
    };
    TableFormatter::new(STAGE_COLUMNS, "stage")
        .with_config(TableConfig::for_pipe())
        .output(rows, format)
}

fn stage_details(timeline: &BatchTimeline, pipeline: &Pipeline) -> Vec<StageDetail> {
    pipeline
        .stages()
        .iter()
        .map(|&stage| {
            let records = timeline.records(stage);
            StageDetail {
                stage,
                state: timeline.stage_state(pipeline, stage),
                records: records.len(),
                first_date: records.first().and_then(|r| r.date),
                quantity: records.iter().filter_map(|r| r.quantity).sum(),
            }
        })
        .collect()
}

fn print_header(detail: &TimelineDetail<'_>, timeline: &BatchTimeline) {
    let s = &detail.summary;
    println!("{} {}", style("Batch").bold(), style(&s.key).cyan().bold());
    if let Some(component) = &s.component {
        println!("  {}: {}", style("component").dim(), component);
    }
    if let Some(customer) = &s.customer {
        println!("  {}: {}", style("customer").dim(), customer);
    }
    if timeline.batch.is_none() {
        println!(
            "  {}",
            style("(no batch record; built from stage records only)").yellow()
        );
    }
    let stage = match s.current_stage {
        Some(stage) => style(stage.label().to_string()).yellow(),
        None => style("complete".to_string()).green(),
    };
    println!("  {}: {}", style("current stage").dim(), stage);
    println!("  {}: {:.0}%", style("progress").dim(), s.progress_pct);
    println!("  {}: {}", style("process time").dim(), timeline.process_time());
    println!();
}

fn run_wip(args: WipArgs, global: &GlobalOpts) -> Result<()> {
    let loaded = Loaded::open(&args.source, global, false)?;
    loaded.report_gaps(global);

    let buckets = loaded.trace.wip();
    let format = loaded.format(global, OutputFormat::Tsv);
    if helpers::print_structured(&buckets, format)? {
        return Ok(());
    }

    let rows = buckets.iter().map(|b| {
        let name = b.stage.map_or("complete", Stage::as_str);
        TableRow::new(name)
            .cell("stage", CellValue::Stage(b.stage))
            .cell("batches", CellValue::Number(b.batches as i64))
    });
    TableFormatter::new(WIP_COLUMNS, "stage")
        .with_config(TableConfig::for_pipe())
        .output(rows, format)?;

    if !global.quiet && format == OutputFormat::Tsv {
        println!();
        println!("{} batch(es) in total.", style(loaded.trace.len()).cyan());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{aggregate, OrphanPolicy};
    use crate::entities::StageRecord;
    use chrono::NaiveDate;

    fn key(s: &str) -> BatchKey {
        BatchKey::new(s).unwrap()
    }

    #[test]
    fn test_stage_details_sum_quantities() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let records = vec![
            StageRecord::new(key("B1"), Stage::MaterialIssued).on(d),
            StageRecord::new(key("B1"), Stage::Forging).on(d).qty(40),
            StageRecord::new(key("B1"), Stage::Forging).qty(60),
        ];
        let pipeline = Pipeline::default();
        let trace = aggregate(
            vec![Batch::new(key("B1"))],
            records,
            &pipeline,
            OrphanPolicy::Drop,
        );
        let details = stage_details(trace.get(&key("B1")).unwrap(), &pipeline);

        assert_eq!(details.len(), pipeline.len());
        assert_eq!(details[1].stage, Stage::Forging);
        assert_eq!(details[1].records, 2);
        assert_eq!(details[1].quantity, 100);
        assert_eq!(details[1].first_date, Some(d));
        assert_eq!(details[2].state, StageState::InProgress);
        assert_eq!(details[3].state, StageState::NotStarted);
    }

    #[test]
    fn test_summary_row_cells() {
        let trace = aggregate(
            vec![Batch::new(key("B7"))],
            Vec::new(),
            &Pipeline::default(),
            OrphanPolicy::Drop,
        );
        let summary = trace.summaries().remove(0);
        let row = summary_row(&summary);
        assert_eq!(row.id, "B7");
        assert_eq!(row.get("stage").unwrap().raw(), "material_issued");
        assert_eq!(row.get("component").unwrap().raw(), "");
        assert_eq!(row.get("process_time").unwrap().raw(), "");
    }
}
