//! Schedule versus actual production
//!
//! Every forging and dispatch record is credited to at most one schedule line:
//! among the lines planned for its batch's component and customer, the one on
//! the record's production line and in the record's month wins. A record made
//! on a line nothing was planned on is not credited anywhere.

use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::debug;

use crate::analysis::aggregate::Traceability;
use crate::analysis::capacity::ProductionEntry;
use crate::core::stage::Stage;
use crate::entities::{BatchKey, ScheduleLine, StageRecord};

/// Line name used for schedule lines with no line assigned
pub const UNASSIGNED_LINE: &str = "unassigned";

/// Progress of one schedule line
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduleStatus {
    pub component: String,
    pub customer: Option<String>,
    pub line: String,
    pub planned_pieces: u32,
    pub planned_weight: f64,
    pub batches: usize,
    pub forged_pieces: u64,
    pub dispatched_pieces: u64,
    pub remaining_pieces: u64,
    pub completion_pct: f64,
}

/// Compare each schedule line with the batches made for it
///
/// With `month` set, only schedule lines planned for that month are reported
/// and only records dated within it are counted.
pub fn schedule_status(
    schedule: &[ScheduleLine],
    trace: &Traceability,
    month: Option<NaiveDate>,
) -> Vec<ScheduleStatus> {
    let credit = Credit::assign(schedule, trace);
    schedule
        .iter()
        .enumerate()
        .filter(|(_, line)| month.map_or(true, |m| line.in_month(m)))
        .map(|(i, line)| {
            let forged = credit.pieces(i, Stage::Forging, month);
            let dispatched = credit.pieces(i, Stage::Dispatch, month);
            let planned = u64::from(line.pieces);
            let completion_pct = if planned == 0 {
                0.0
            } else {
                dispatched as f64 / planned as f64 * 100.0
            };
            ScheduleStatus {
                component: line.component.clone(),
                customer: line.customer.clone(),
                line: line_name(line),
                planned_pieces: line.pieces,
                planned_weight: line.planned_weight(),
                batches: credit.batches[i].len(),
                forged_pieces: forged,
                dispatched_pieces: dispatched,
                remaining_pieces: planned.saturating_sub(dispatched),
                completion_pct,
            }
        })
        .collect()
}

/// Planned and forged weight per schedule line, for capacity utilization
///
/// Produced weight is forged pieces x slug weight.
pub fn production_entries(
    schedule: &[ScheduleLine],
    trace: &Traceability,
    month: Option<NaiveDate>,
) -> Vec<ProductionEntry> {
    let credit = Credit::assign(schedule, trace);
    schedule
        .iter()
        .enumerate()
        .filter(|(_, line)| month.map_or(true, |m| line.in_month(m)))
        .map(|(i, line)| ProductionEntry {
            component: line.component.clone(),
            line: line_name(line),
            planned_weight: line.planned_weight(),
            produced_weight: credit.pieces(i, Stage::Forging, month) as f64 * line.slug_weight,
        })
        .collect()
}

/// Number of calendar months the schedule and its credited forging span
///
/// Never less than one.
pub fn months_covered(schedule: &[ScheduleLine], trace: &Traceability) -> u32 {
    let credit = Credit::assign(schedule, trace);
    let planned = schedule.iter().filter_map(|line| line.month);
    let forged = credit
        .records
        .iter()
        .flatten()
        .filter(|r| r.stage == Stage::Forging)
        .filter_map(|r| r.date);
    let months: BTreeSet<(i32, u32)> = planned
        .chain(forged)
        .map(|d| (d.year(), d.month()))
        .collect();
    u32::try_from(months.len()).unwrap_or(u32::MAX).max(1)
}

fn line_name(line: &ScheduleLine) -> String {
    line.line
        .clone()
        .unwrap_or_else(|| UNASSIGNED_LINE.to_string())
}

/// Forging and dispatch records credited to each schedule line, by index
struct Credit<'a> {
    records: Vec<Vec<&'a StageRecord>>,
    batches: Vec<BTreeSet<&'a BatchKey>>,
}

impl<'a> Credit<'a> {
    fn assign(schedule: &[ScheduleLine], trace: &'a Traceability) -> Self {
        let mut records: Vec<Vec<&StageRecord>> = vec![Vec::new(); schedule.len()];
        let mut batches: Vec<BTreeSet<&BatchKey>> = vec![BTreeSet::new(); schedule.len()];
        let mut uncredited = 0usize;

        for (key, timeline) in &trace.timelines {
            let Some(batch) = &timeline.batch else {
                continue;
            };
            let candidates: Vec<usize> = schedule
                .iter()
                .enumerate()
                .filter(|(_, line)| {
                    line.matches(batch.component.as_deref(), batch.customer.as_deref())
                })
                .map(|(i, _)| i)
                .collect();
            if candidates.is_empty() {
                continue;
            }

            let mut credited = false;
            for stage in [Stage::Forging, Stage::Dispatch] {
                for record in timeline.records(stage) {
                    match best_line(schedule, &candidates, record.line.as_deref(), record.date) {
                        Some(i) => {
                            records[i].push(record);
                            batches[i].insert(key);
                            credited = true;
                        }
                        None => uncredited += 1,
                    }
                }
            }
            // Batches with nothing forged yet count against their issue month
            if !credited {
                if let Some(i) = best_line(schedule, &candidates, None, batch.created) {
                    batches[i].insert(key);
                }
            }
        }

        if uncredited > 0 {
            debug!(uncredited, "records on lines with no matching schedule line");
        }
        Self { records, batches }
    }

    fn pieces(&self, index: usize, stage: Stage, month: Option<NaiveDate>) -> u64 {
        self.records[index]
            .iter()
            .filter(|r| r.stage == stage)
            .filter(|r| match month {
                Some(m) => r.date.is_some_and(|d| same_month(d, m)),
                None => true,
            })
            .filter_map(|r| r.quantity)
            .fold(0u64, |acc, q| acc.saturating_add(u64::from(q)))
    }
}

/// Pick the schedule line a record belongs to
///
/// A line mismatch rules a candidate out; a month mismatch only ranks it
/// lower. Ties go to the earlier schedule line.
fn best_line(
    schedule: &[ScheduleLine],
    candidates: &[usize],
    line: Option<&str>,
    date: Option<NaiveDate>,
) -> Option<usize> {
    let mut best: Option<(u8, usize)> = None;
    for &i in candidates {
        let plan = &schedule[i];
        let mut score = 0u8;
        match (line, plan.line.as_deref()) {
            (Some(have), Some(want)) if have.eq_ignore_ascii_case(want) => score += 2,
            (Some(_), Some(_)) => continue,
            _ => {}
        }
        if let (Some(d), Some(_)) = (date, plan.month) {
            if plan.in_month(d) {
                score += 1;
            }
        }
        if best.map_or(true, |(s, _)| score > s) {
            best = Some((score, i));
        }
    }
    best.map(|(_, i)| i)
}

fn same_month(a: NaiveDate, b: NaiveDate) -> bool {
    a.year() == b.year() && a.month() == b.month()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::aggregate::{aggregate, OrphanPolicy};
    use crate::core::stage::Pipeline;
    use crate::entities::{Batch, BatchKey, StageRecord};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn batch(key: &str, component: &str, customer: &str) -> Batch {
        let mut b = Batch::new(BatchKey::new(key).unwrap());
        b.component = Some(component.to_string());
        b.customer = Some(customer.to_string());
        b
    }

    fn rec(key: &str, stage: Stage, on: NaiveDate, qty: u32) -> StageRecord {
        StageRecord::new(BatchKey::new(key).unwrap(), stage).on(on).qty(qty)
    }

    fn sample_trace() -> Traceability {
        aggregate(
            vec![
                batch("B1", "FL-220", "Acme"),
                batch("B2", "FL-220", "Acme"),
                batch("B3", "FL-220", "Globex"),
            ],
            vec![
                rec("B1", Stage::Forging, date(2024, 5, 3), 300),
                rec("B2", Stage::Forging, date(2024, 5, 20), 200),
                rec("B2", Stage::Forging, date(2024, 6, 2), 50),
                rec("B1", Stage::Dispatch, date(2024, 5, 28), 250),
                rec("B3", Stage::Forging, date(2024, 5, 4), 999),
            ],
            &Pipeline::default(),
            OrphanPolicy::Drop,
        )
    }

    fn acme_line() -> ScheduleLine {
        let mut line = ScheduleLine::new("FL-220", 1000, 2.0);
        line.customer = Some("Acme".to_string());
        line.line = Some("1600T".to_string());
        line.month = Some(date(2024, 5, 1));
        line
    }

    #[test]
    fn test_schedule_status_all_time() {
        let status = schedule_status(&[acme_line()], &sample_trace(), None);
        assert_eq!(status.len(), 1);
        let s = &status[0];
        assert_eq!(s.batches, 2);
        assert_eq!(s.forged_pieces, 550);
        assert_eq!(s.dispatched_pieces, 250);
        assert_eq!(s.remaining_pieces, 750);
        assert!((s.completion_pct - 25.0).abs() < 1e-9);
        assert!((s.planned_weight - 2060.0).abs() < 1e-9);
    }

    #[test]
    fn test_schedule_status_month_filter() {
        let may = schedule_status(&[acme_line()], &sample_trace(), Some(date(2024, 5, 15)));
        assert_eq!(may[0].forged_pieces, 500);

        let june = schedule_status(&[acme_line()], &sample_trace(), Some(date(2024, 6, 1)));
        assert!(june.is_empty());
    }

    #[test]
    fn test_zero_planned_pieces() {
        let line = ScheduleLine::new("FL-999", 0, 1.0);
        let status = schedule_status(&[line], &sample_trace(), None);
        assert_eq!(status[0].completion_pct, 0.0);
        assert_eq!(status[0].line, UNASSIGNED_LINE);
    }

    #[test]
    fn test_production_entries_use_forged_weight() {
        let entries = production_entries(&[acme_line()], &sample_trace(), Some(date(2024, 5, 1)));
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].line, "1600T");
        assert_eq!(entries[0].produced_weight, 1000.0);
        assert!((entries[0].planned_weight - 2060.0).abs() < 1e-9);
    }

    fn monthly_line(month: u32) -> ScheduleLine {
        let mut line = ScheduleLine::new("FL-220", 100, 1.0);
        line.line = Some("1600T".to_string());
        line.month = Some(date(2024, month, 1));
        line
    }

    #[test]
    fn test_monthly_lines_credit_each_record_once() {
        let trace = aggregate(
            vec![batch("B1", "FL-220", "Acme")],
            vec![rec("B1", Stage::Forging, date(2024, 5, 10), 100)],
            &Pipeline::default(),
            OrphanPolicy::Drop,
        );
        let schedule = [monthly_line(5), monthly_line(6)];

        let entries = production_entries(&schedule, &trace, None);
        let produced: f64 = entries.iter().map(|e| e.produced_weight).sum();
        assert_eq!(produced, 100.0);
        assert_eq!(entries[0].produced_weight, 100.0);
        assert_eq!(entries[1].produced_weight, 0.0);

        let status = schedule_status(&schedule, &trace, None);
        assert_eq!(status[0].forged_pieces, 100);
        assert_eq!(status[0].batches, 1);
        assert_eq!(status[1].forged_pieces, 0);
        assert_eq!(status[1].batches, 0);
    }

    #[test]
    fn test_record_goes_to_its_own_press() {
        let trace = aggregate(
            vec![batch("B1", "FL-220", "Acme")],
            vec![
                rec("B1", Stage::Forging, date(2024, 5, 10), 40).at_line("2500T"),
                rec("B1", Stage::Forging, date(2024, 5, 11), 60).at_line("1600T"),
                rec("B1", Stage::Forging, date(2024, 5, 12), 7).at_line("Hammer"),
            ],
            &Pipeline::default(),
            OrphanPolicy::Drop,
        );
        let mut big_press = monthly_line(5);
        big_press.line = Some("2500T".to_string());
        let schedule = [monthly_line(5), big_press];

        let status = schedule_status(&schedule, &trace, None);
        assert_eq!(status[0].forged_pieces, 60);
        assert_eq!(status[1].forged_pieces, 40);
    }

    #[test]
    fn test_large_quantities_do_not_overflow() {
        let trace = aggregate(
            vec![batch("B1", "FL-220", "Acme")],
            vec![
                rec("B1", Stage::Forging, date(2024, 5, 1), 3_000_000_000),
                rec("B1", Stage::Forging, date(2024, 5, 2), 3_000_000_000),
            ],
            &Pipeline::default(),
            OrphanPolicy::Drop,
        );
        let status = schedule_status(&[acme_line()], &trace, None);
        assert_eq!(status[0].forged_pieces, 6_000_000_000);
        assert_eq!(status[0].remaining_pieces, 1000);
    }

    #[test]
    fn test_months_covered() {
        let trace = sample_trace();
        assert_eq!(months_covered(&[acme_line()], &trace), 2);
        assert_eq!(months_covered(&[monthly_line(5), monthly_line(7)], &trace), 3);
        assert_eq!(months_covered(&[], &trace), 1);
    }
}
