//! Table formatting for CLI list commands
//!
//! Commands build [`TableRow`]s of typed [`CellValue`]s and hand them to a
//! [`TableFormatter`], which renders aligned columns for the terminal, CSV,
//! Markdown or bare keys.

use chrono::NaiveDate;
use console::style;
use tabled::{builder::Builder, settings::Style};

use crate::analysis::{ProcessTime, UtilizationTier};
use crate::cli::helpers::truncate_str;
use crate::cli::OutputFormat;
use crate::core::stage::Stage;

/// Configuration for table output
#[derive(Debug, Clone)]
pub struct TableConfig {
    /// Show summary line after table (e.g., "5 batch(es) found")
    pub show_summary: bool,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self { show_summary: true }
    }
}

impl TableConfig {
    /// Config for piping (no summary)
    pub fn for_pipe() -> Self {
        Self {
            show_summary: false,
        }
    }
}

/// A typed cell value with semantic meaning for formatting
#[derive(Debug, Clone)]
pub enum CellValue {
    /// Batch key or other identifier (cyan)
    Id(String),
    /// Plain text, truncated to the column
    Text(String),
    /// Current stage; `None` means the batch is complete
    Stage(Option<Stage>),
    /// Percentage with color coding (100=green, >=50=yellow, else plain)
    Progress(f64),
    /// Utilization tier with color coding
    Tier(UtilizationTier),
    ProcessTime(ProcessTime),
    /// Utilization percentage
    Percent(f64),
    Number(i64),
    /// Float value with precision
    Float(f64, usize),
    Date(Option<NaiveDate>),
    /// Empty/placeholder
    Empty,
}

impl CellValue {
    /// Format for terminal output (with colors if terminal)
    pub fn format_tsv(&self, width: usize) -> String {
        match self {
            CellValue::Id(id) => format!("{:<width$}", style(id).cyan(), width = width),
            CellValue::Text(s) => {
                format!("{:<width$}", truncate_str(s, width), width = width)
            }
            CellValue::Stage(stage) => {
                let styled = match stage {
                    Some(s) => style(s.as_str().to_string()).yellow(),
                    None => style("complete".to_string()).green(),
                };
                format!("{:<width$}", styled, width = width)
            }
            CellValue::Progress(pct) => {
                let s = format!("{:.0}%", pct);
                let styled = if *pct >= 100.0 {
                    style(s).green()
                } else if *pct >= 50.0 {
                    style(s).yellow()
                } else {
                    style(s).white()
                };
                format!("{:>width$}", styled, width = width)
            }
            CellValue::Tier(tier) => {
                let s = tier.label().to_string();
                let styled = match tier {
                    UtilizationTier::Low => style(s).dim(),
                    UtilizationTier::Moderate => style(s).green(),
                    UtilizationTier::High => style(s).yellow(),
                    UtilizationTier::Over => style(s).red().bold(),
                };
                format!("{:<width$}", styled, width = width)
            }
            CellValue::ProcessTime(pt) => {
                let styled = match pt {
                    ProcessTime::Days(_) => style(pt.to_string()).white(),
                    ProcessTime::NotAvailable => style(pt.to_string()).dim(),
                };
                format!("{:>width$}", styled, width = width)
            }
            CellValue::Percent(pct) => {
                format!("{:>width$}", format!("{:.1}%", pct), width = width)
            }
            CellValue::Number(n) => format!("{:>width$}", n, width = width),
            CellValue::Float(f, precision) => {
                format!("{:>width$.prec$}", f, width = width, prec = precision)
            }
            CellValue::Date(_) | CellValue::Empty => {
                format!("{:<width$}", self.raw_or_dash(), width = width)
            }
        }
    }

    /// Plain value (no colors), empty when absent
    pub fn raw(&self) -> String {
        match self {
            CellValue::Id(s) | CellValue::Text(s) => s.clone(),
            CellValue::Stage(Some(stage)) => stage.as_str().to_string(),
            CellValue::Stage(None) => "complete".to_string(),
            CellValue::Progress(pct) => format!("{:.0}", pct),
            CellValue::Tier(tier) => tier.label().to_string(),
            CellValue::ProcessTime(pt) => pt.days().map(|d| d.to_string()).unwrap_or_default(),
            CellValue::Percent(pct) => format!("{:.1}", pct),
            CellValue::Number(n) => n.to_string(),
            CellValue::Float(f, precision) => format!("{:.prec$}", f, prec = precision),
            CellValue::Date(date) => date.map(|d| d.to_string()).unwrap_or_default(),
            CellValue::Empty => String::new(),
        }
    }

    fn raw_or_dash(&self) -> String {
        let raw = self.raw();
        if raw.is_empty() {
            "-".to_string()
        } else {
            raw
        }
    }

    /// Format for Markdown output (no colors)
    pub fn format_md(&self) -> String {
        match self {
            CellValue::Progress(pct) => format!("{:.0}%", pct),
            CellValue::Percent(pct) => format!("{:.1}%", pct),
            CellValue::ProcessTime(pt) => pt.to_string(),
            CellValue::Tier(UtilizationTier::Over) => "**>100%**".to_string(),
            _ => self.raw_or_dash(),
        }
    }

    /// Display width of this cell's content (for dynamic column sizing)
    pub fn display_width(&self) -> usize {
        match self {
            CellValue::Progress(pct) => format!("{:.0}%", pct).len(),
            CellValue::Percent(pct) => format!("{:.1}%", pct).len(),
            CellValue::ProcessTime(pt) => pt.to_string().len(),
            other => other.raw_or_dash().chars().count(),
        }
    }
}

/// Column definition with header label and maximum width
#[derive(Debug, Clone)]
pub struct ColumnDef {
    pub key: &'static str,
    pub header: &'static str,
    pub width: usize,
}

impl ColumnDef {
    pub const fn new(key: &'static str, header: &'static str, width: usize) -> Self {
        Self { key, header, width }
    }
}

/// A row of cell values for table output
pub struct TableRow {
    /// Value printed by `--format id`
    pub id: String,
    pub cells: Vec<(&'static str, CellValue)>,
}

impl TableRow {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            cells: Vec::new(),
        }
    }

    pub fn cell(mut self, key: &'static str, value: CellValue) -> Self {
        self.cells.push((key, value));
        self
    }

    pub fn get(&self, key: &str) -> Option<&CellValue> {
        self.cells.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }
}

/// Table formatter that outputs rows in various formats
pub struct TableFormatter<'a> {
    columns: &'a [ColumnDef],
    entity_name: &'static str,
    config: TableConfig,
}

impl<'a> TableFormatter<'a> {
    pub fn new(columns: &'a [ColumnDef], entity_name: &'static str) -> Self {
        Self {
            columns,
            entity_name,
            config: TableConfig::default(),
        }
    }

    /// Configure the formatter with custom settings
    pub fn with_config(mut self, config: TableConfig) -> Self {
        self.config = config;
        self
    }

    /// Output rows in the specified format
    pub fn output<I>(&self, rows: I, format: OutputFormat) -> miette::Result<()>
    where
        I: IntoIterator<Item = TableRow>,
    {
        let rows: Vec<TableRow> = rows.into_iter().collect();
        match format {
            OutputFormat::Csv => self.output_csv(&rows)?,
            OutputFormat::Md => println!("{}", self.render_md(&rows)),
            OutputFormat::Id => {
                for row in &rows {
                    println!("{}", row.id);
                }
            }
            _ => self.output_tsv(&rows),
        }
        Ok(())
    }

    /// Calculate column widths from content, capped at each column's width
    fn calculate_widths(&self, rows: &[TableRow]) -> Vec<usize> {
        self.columns
            .iter()
            .map(|col| {
                let max_content = rows
                    .iter()
                    .filter_map(|r| r.get(col.key))
                    .map(|v| v.display_width())
                    .max()
                    .unwrap_or(0);
                col.header.len().max(max_content).min(col.width.max(col.header.len()))
            })
            .collect()
    }

    fn output_tsv(&self, rows: &[TableRow]) {
        let widths = self.calculate_widths(rows);

        let header: Vec<String> = self
            .columns
            .iter()
            .zip(&widths)
            .map(|(col, w)| format!("{:<width$}", style(col.header).bold(), width = *w))
            .collect();
        println!("{}", header.join("  "));

        let total_width: usize = widths.iter().sum::<usize>() + 2 * widths.len().saturating_sub(1);
        println!("{}", "-".repeat(total_width));

        for row in rows {
            let parts: Vec<String> = self
                .columns
                .iter()
                .zip(&widths)
                .map(|(col, w)| match row.get(col.key) {
                    Some(value) => value.format_tsv(*w),
                    None => format!("{:<width$}", "-", width = *w),
                })
                .collect();
            println!("{}", parts.join("  "));
        }

        if self.config.show_summary {
            println!();
            println!("{} {}(s) found.", style(rows.len()).cyan(), self.entity_name);
        }
    }

    fn output_csv(&self, rows: &[TableRow]) -> miette::Result<()> {
        let mut writer = csv::Writer::from_writer(std::io::stdout());
        let csv_err = |e: csv::Error| miette::miette!("failed to write CSV: {}", e);

        writer
            .write_record(self.columns.iter().map(|c| c.key))
            .map_err(csv_err)?;
        for row in rows {
            writer
                .write_record(
                    self.columns
                        .iter()
                        .map(|col| row.get(col.key).map(CellValue::raw).unwrap_or_default()),
                )
                .map_err(csv_err)?;
        }
        writer
            .flush()
            .map_err(|e| miette::miette!("failed to write CSV: {}", e))
    }

    /// Markdown table via tabled
    pub fn render_md(&self, rows: &[TableRow]) -> String {
        let mut builder = Builder::default();
        builder.push_record(self.columns.iter().map(|c| c.header.to_string()));
        for row in rows {
            builder.push_record(self.columns.iter().map(|col| {
                row.get(col.key)
                    .map(CellValue::format_md)
                    .unwrap_or_else(|| "-".to_string())
                    .replace('|', "\\|")
            }));
        }
        builder.build().with(Style::markdown()).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COLUMNS: &[ColumnDef] = &[
        ColumnDef::new("batch", "BATCH", 16),
        ColumnDef::new("stage", "STAGE", 18),
        ColumnDef::new("progress", "PROGRESS", 8),
    ];

    fn row() -> TableRow {
        TableRow::new("B-101")
            .cell("batch", CellValue::Id("B-101".to_string()))
            .cell("stage", CellValue::Stage(Some(Stage::Forging)))
            .cell("progress", CellValue::Progress(22.2))
    }

    #[test]
    fn test_cell_raw_values() {
        assert_eq!(CellValue::Stage(None).raw(), "complete");
        assert_eq!(CellValue::Progress(22.2).raw(), "22");
        assert_eq!(CellValue::ProcessTime(ProcessTime::NotAvailable).raw(), "");
        assert_eq!(CellValue::ProcessTime(ProcessTime::Days(9)).raw(), "9");
        assert_eq!(CellValue::Date(None).raw(), "");
        assert_eq!(CellValue::Float(2.456, 2).raw(), "2.46");
    }

    #[test]
    fn test_cell_md_values() {
        assert_eq!(CellValue::Empty.format_md(), "-");
        assert_eq!(CellValue::ProcessTime(ProcessTime::NotAvailable).format_md(), "n/a");
        assert_eq!(CellValue::Tier(UtilizationTier::Over).format_md(), "**>100%**");
        assert_eq!(CellValue::Percent(81.26).format_md(), "81.3%");
    }

    #[test]
    fn test_text_truncated_to_width() {
        let cell = CellValue::Text("a very long component name".to_string());
        assert!(cell.format_tsv(10).contains("a very ..."));
    }

    #[test]
    fn test_table_row_builder() {
        let row = row();
        assert_eq!(row.id, "B-101");
        assert!(row.get("stage").is_some());
        assert!(row.get("missing").is_none());
    }

    #[test]
    fn test_widths_follow_content() {
        let formatter = TableFormatter::new(COLUMNS, "batch");
        let widths = formatter.calculate_widths(&[row()]);
        assert_eq!(widths, vec![5, 7, 8]);
    }

    #[test]
    fn test_render_md() {
        let formatter = TableFormatter::new(COLUMNS, "batch");
        let md = formatter.render_md(&[row()]);
        assert!(md.contains("| BATCH "));
        assert!(md.contains("| forging "));
        assert!(md.contains("22%"));
    }
}
