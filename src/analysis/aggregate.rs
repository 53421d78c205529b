//! Batch stage aggregation
//!
//! Folds flat per-stage record lists into one timeline per batch and derives
//! lifecycle position, progress and process time from it. Stage completion is
//! structural: a stage is done once it has at least one record.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

use crate::core::stage::{Pipeline, Stage};
use crate::entities::{Batch, BatchKey, StageRecord};

/// What to do with a stage record whose batch key matches no known batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrphanPolicy {
    /// Discard the record and count it in [`Traceability::dropped_orphans`]
    #[default]
    Drop,
    /// Create a timeline without batch metadata
    Create,
}

impl std::fmt::Display for OrphanPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrphanPolicy::Drop => write!(f, "drop"),
            OrphanPolicy::Create => write!(f, "create"),
        }
    }
}

impl std::str::FromStr for OrphanPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "drop" => Ok(OrphanPolicy::Drop),
            "create" => Ok(OrphanPolicy::Create),
            _ => Err(format!("Invalid orphan policy: {}. Use drop or create", s)),
        }
    }
}

/// Display state of one pipeline stage for a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    Completed,
    InProgress,
    NotStarted,
}

impl std::fmt::Display for StageState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageState::Completed => write!(f, "completed"),
            StageState::InProgress => write!(f, "in_progress"),
            StageState::NotStarted => write!(f, "not_started"),
        }
    }
}

/// Days from material issue to dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessTime {
    Days(i64),
    NotAvailable,
}

impl ProcessTime {
    pub fn days(self) -> Option<i64> {
        match self {
            ProcessTime::Days(d) => Some(d),
            ProcessTime::NotAvailable => None,
        }
    }
}

impl std::fmt::Display for ProcessTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessTime::Days(1) => write!(f, "1 day"),
            ProcessTime::Days(d) => write!(f, "{} days", d),
            ProcessTime::NotAvailable => write!(f, "n/a"),
        }
    }
}

/// Every record known for one batch, grouped by stage
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchTimeline {
    pub key: BatchKey,

    /// Batch metadata; `None` for timelines created from orphan records
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch: Option<Batch>,

    /// Records per stage, ordered by date (undated records last)
    pub stages: BTreeMap<Stage, Vec<StageRecord>>,
}

impl BatchTimeline {
    fn new(key: BatchKey, batch: Option<Batch>) -> Self {
        Self {
            key,
            batch,
            stages: BTreeMap::new(),
        }
    }

    /// Records for a stage (empty slice when none)
    pub fn records(&self, stage: Stage) -> &[StageRecord] {
        self.stages.get(&stage).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_stage(&self, stage: Stage) -> bool {
        !self.records(stage).is_empty()
    }

    pub fn record_count(&self) -> usize {
        self.stages.values().map(Vec::len).sum()
    }

    /// Index of the first pipeline stage without records
    ///
    /// Every earlier stage has at least one record. Equals the pipeline length
    /// once all stages are done.
    pub fn current_stage_index(&self, pipeline: &Pipeline) -> usize {
        pipeline
            .stages()
            .iter()
            .take_while(|s| self.has_stage(**s))
            .count()
    }

    /// The stage the batch is waiting on, or `None` when complete
    pub fn current_stage(&self, pipeline: &Pipeline) -> Option<Stage> {
        pipeline
            .stages()
            .get(self.current_stage_index(pipeline))
            .copied()
    }

    pub fn is_complete(&self, pipeline: &Pipeline) -> bool {
        self.current_stage_index(pipeline) == pipeline.len()
    }

    pub fn stage_state(&self, pipeline: &Pipeline, stage: Stage) -> StageState {
        if self.has_stage(stage) {
            StageState::Completed
        } else if self.current_stage(pipeline) == Some(stage) {
            StageState::InProgress
        } else {
            StageState::NotStarted
        }
    }

    /// Completed stages up to the current one, over (current index + 1)
    pub fn progress_pct(&self, pipeline: &Pipeline) -> f64 {
        if pipeline.is_empty() {
            return 0.0;
        }
        let current = self.current_stage_index(pipeline);
        let window = (current + 1).min(pipeline.len());
        let done = pipeline.stages()[..window]
            .iter()
            .filter(|s| self.has_stage(**s))
            .count();
        done as f64 / window as f64 * 100.0
    }

    /// Days between the first material issue and the first dispatch
    pub fn process_time(&self) -> ProcessTime {
        let issued = self.first_date(Stage::MaterialIssued);
        let dispatched = self.first_date(Stage::Dispatch);
        match (issued, dispatched) {
            (Some(start), Some(end)) => {
                let days = (end - start).num_days();
                if days < 0 {
                    warn!(batch = %self.key, days, "dispatch recorded before material issue");
                }
                ProcessTime::Days(days.abs())
            }
            _ => ProcessTime::NotAvailable,
        }
    }

    fn first_date(&self, stage: Stage) -> Option<NaiveDate> {
        self.records(stage).first().and_then(|r| r.date)
    }

    /// Flat summary row for list output
    pub fn summary(&self, pipeline: &Pipeline) -> TimelineSummary {
        let batch = self.batch.as_ref();
        TimelineSummary {
            key: self.key.clone(),
            component: batch.and_then(|b| b.component.clone()),
            customer: batch.and_then(|b| b.customer.clone()),
            current_stage: self.current_stage(pipeline),
            current_stage_index: self.current_stage_index(pipeline),
            stages_done: pipeline
                .stages()
                .iter()
                .filter(|s| self.has_stage(**s))
                .count(),
            progress_pct: self.progress_pct(pipeline),
            process_time_days: self.process_time().days(),
            records: self.record_count(),
        }
    }
}

/// One row of `trace list`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineSummary {
    pub key: BatchKey,
    pub component: Option<String>,
    pub customer: Option<String>,
    /// `None` once every pipeline stage is done
    pub current_stage: Option<Stage>,
    pub current_stage_index: usize,
    pub stages_done: usize,
    pub progress_pct: f64,
    pub process_time_days: Option<i64>,
    pub records: usize,
}

/// Number of batches waiting at a stage (`None` = completed)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WipBucket {
    pub stage: Option<Stage>,
    pub batches: usize,
}

/// Result of aggregation: one timeline per distinct batch key
#[derive(Debug, Clone, PartialEq)]
pub struct Traceability {
    pub pipeline: Pipeline,
    pub timelines: BTreeMap<BatchKey, BatchTimeline>,
    /// Records discarded under [`OrphanPolicy::Drop`]
    pub dropped_orphans: usize,
    /// Keys seen on records with no matching batch
    pub orphan_keys: BTreeSet<BatchKey>,
}

impl Traceability {
    pub fn get(&self, key: &BatchKey) -> Option<&BatchTimeline> {
        self.timelines.get(key)
    }

    pub fn len(&self) -> usize {
        self.timelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timelines.is_empty()
    }

    pub fn summaries(&self) -> Vec<TimelineSummary> {
        self.timelines
            .values()
            .map(|t| t.summary(&self.pipeline))
            .collect()
    }

    /// Batches per current stage, in pipeline order, completed last
    pub fn wip(&self) -> Vec<WipBucket> {
        let mut counts = vec![0usize; self.pipeline.len() + 1];
        for timeline in self.timelines.values() {
            counts[timeline.current_stage_index(&self.pipeline)] += 1;
        }
        self.pipeline
            .stages()
            .iter()
            .map(|s| Some(*s))
            .chain(std::iter::once(None))
            .zip(counts)
            .map(|(stage, batches)| WipBucket { stage, batches })
            .collect()
    }
}

/// Group stage records into per-batch timelines
///
/// Batches define the known keys; when a key appears twice the first batch
/// wins. Records are attached to their batch's timeline and sorted by date
/// within each stage (stable, undated last). Records for unknown keys follow
/// `policy`.
pub fn aggregate(
    batches: impl IntoIterator<Item = Batch>,
    records: impl IntoIterator<Item = StageRecord>,
    pipeline: &Pipeline,
    policy: OrphanPolicy,
) -> Traceability {
    let mut timelines: BTreeMap<BatchKey, BatchTimeline> = BTreeMap::new();

    for batch in batches {
        if timelines.contains_key(&batch.key) {
            debug!(batch = %batch.key, "duplicate batch ignored");
            continue;
        }
        timelines.insert(batch.key.clone(), BatchTimeline::new(batch.key.clone(), Some(batch)));
    }

    let mut dropped_orphans = 0;
    let mut orphan_keys = BTreeSet::new();

    for record in records {
        let timeline = match timelines.get_mut(&record.batch) {
            Some(t) => t,
            None => {
                orphan_keys.insert(record.batch.clone());
                match policy {
                    OrphanPolicy::Drop => {
                        dropped_orphans += 1;
                        continue;
                    }
                    OrphanPolicy::Create => timelines
                        .entry(record.batch.clone())
                        .or_insert_with(|| BatchTimeline::new(record.batch.clone(), None)),
                }
            }
        };
        timeline.stages.entry(record.stage).or_default().push(record);
    }

    for timeline in timelines.values_mut() {
        for records in timeline.stages.values_mut() {
            records.sort_by_key(|r| (r.date.is_none(), r.date));
        }
    }

    if dropped_orphans > 0 {
        warn!(
            dropped = dropped_orphans,
            keys = orphan_keys.len(),
            "stage records reference unknown batches"
        );
    }
    debug!(batches = timelines.len(), %policy, "aggregated stage records");

    Traceability {
        pipeline: pipeline.clone(),
        timelines,
        dropped_orphans,
        orphan_keys,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> BatchKey {
        BatchKey::new(s).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn rec(batch: &str, stage: Stage) -> StageRecord {
        StageRecord::new(key(batch), stage)
    }

    fn full_pipeline_records(batch: &str) -> Vec<StageRecord> {
        Stage::ALL.iter().map(|s| rec(batch, *s)).collect()
    }

    #[test]
    fn test_one_entry_per_distinct_key() {
        let batches = vec![Batch::new(key("B1")), Batch::new(key("B2")), Batch::new(key("B1"))];
        let records = vec![
            rec("B1", Stage::Forging),
            rec("B1", Stage::Forging),
            rec("B2", Stage::MaterialIssued),
        ];
        let t = aggregate(batches, records, &Pipeline::default(), OrphanPolicy::Drop);
        assert_eq!(t.len(), 2);
        assert_eq!(t.get(&key("B1")).unwrap().records(Stage::Forging).len(), 2);
    }

    #[test]
    fn test_reaggregation_is_idempotent() {
        let batches = vec![Batch::new(key("B2")), Batch::new(key("B1"))];
        let records = vec![
            rec("B1", Stage::Forging).on(date(2024, 1, 3)),
            rec("B1", Stage::Forging).on(date(2024, 1, 1)),
            rec("X", Stage::Dispatch),
        ];
        let pipeline = Pipeline::default();
        let a = aggregate(batches.clone(), records.clone(), &pipeline, OrphanPolicy::Create);
        let b = aggregate(batches, records, &pipeline, OrphanPolicy::Create);
        assert_eq!(a, b);
    }

    #[test]
    fn test_orphan_policy_drop() {
        let t = aggregate(
            vec![Batch::new(key("B1"))],
            vec![rec("B1", Stage::Forging), rec("ZZ", Stage::Forging), rec("ZZ", Stage::Marking)],
            &Pipeline::default(),
            OrphanPolicy::Drop,
        );
        assert_eq!(t.len(), 1);
        assert_eq!(t.dropped_orphans, 2);
        assert!(t.orphan_keys.contains(&key("ZZ")));
    }

    #[test]
    fn test_orphan_policy_create() {
        let t = aggregate(
            vec![Batch::new(key("B1"))],
            vec![rec("ZZ", Stage::Forging), rec("ZZ", Stage::Marking)],
            &Pipeline::default(),
            OrphanPolicy::Create,
        );
        assert_eq!(t.len(), 2);
        assert_eq!(t.dropped_orphans, 0);
        let orphan = t.get(&key("ZZ")).unwrap();
        assert!(orphan.batch.is_none());
        assert_eq!(orphan.record_count(), 2);
    }

    #[test]
    fn test_records_sorted_by_date_undated_last() {
        let t = aggregate(
            vec![Batch::new(key("B1"))],
            vec![
                rec("B1", Stage::Forging).qty(1),
                rec("B1", Stage::Forging).on(date(2024, 2, 1)).qty(2),
                rec("B1", Stage::Forging).on(date(2024, 1, 1)).qty(3),
            ],
            &Pipeline::default(),
            OrphanPolicy::Drop,
        );
        let qtys: Vec<_> = t
            .get(&key("B1"))
            .unwrap()
            .records(Stage::Forging)
            .iter()
            .map(|r| r.quantity.unwrap())
            .collect();
        assert_eq!(qtys, vec![3, 2, 1]);
    }

    #[test]
    fn test_current_stage_index_is_contiguous_prefix() {
        let pipeline = Pipeline::default();
        let t = aggregate(
            vec![Batch::new(key("B1"))],
            vec![
                rec("B1", Stage::MaterialIssued),
                rec("B1", Stage::Forging),
                rec("B1", Stage::CncMachining),
            ],
            &pipeline,
            OrphanPolicy::Drop,
        );
        let tl = t.get(&key("B1")).unwrap();
        assert_eq!(tl.current_stage_index(&pipeline), 2);
        assert_eq!(tl.current_stage(&pipeline), Some(Stage::HeatTreatment));
        assert_eq!(tl.stage_state(&pipeline, Stage::Forging), StageState::Completed);
        assert_eq!(tl.stage_state(&pipeline, Stage::HeatTreatment), StageState::InProgress);
        assert_eq!(tl.stage_state(&pipeline, Stage::CncMachining), StageState::Completed);
        assert_eq!(tl.stage_state(&pipeline, Stage::Dispatch), StageState::NotStarted);
    }

    #[test]
    fn test_current_stage_index_never_regresses() {
        let pipeline = Pipeline::default();
        let mut records = Vec::new();
        let mut last = 0;
        // Add records out of pipeline order; index must only grow
        for stage in [
            Stage::Dispatch,
            Stage::Forging,
            Stage::MaterialIssued,
            Stage::Marking,
            Stage::HeatTreatment,
            Stage::PreMachining,
            Stage::CncMachining,
            Stage::VisualInspection,
            Stage::FinalInspection,
        ] {
            records.push(rec("B1", stage));
            let t = aggregate(
                vec![Batch::new(key("B1"))],
                records.clone(),
                &pipeline,
                OrphanPolicy::Drop,
            );
            let idx = t.get(&key("B1")).unwrap().current_stage_index(&pipeline);
            assert!(idx >= last, "index went from {} to {}", last, idx);
            last = idx;
        }
        assert_eq!(last, pipeline.len());
    }

    #[test]
    fn test_progress_bounds() {
        let pipeline = Pipeline::default();

        let empty = aggregate(vec![Batch::new(key("B1"))], vec![], &pipeline, OrphanPolicy::Drop);
        assert_eq!(empty.get(&key("B1")).unwrap().progress_pct(&pipeline), 0.0);

        // Out-of-order record alone must not count as full progress
        let stray = aggregate(
            vec![Batch::new(key("B1"))],
            vec![rec("B1", Stage::Dispatch)],
            &pipeline,
            OrphanPolicy::Drop,
        );
        assert_eq!(stray.get(&key("B1")).unwrap().progress_pct(&pipeline), 0.0);

        let partial = aggregate(
            vec![Batch::new(key("B1"))],
            vec![rec("B1", Stage::MaterialIssued), rec("B1", Stage::Forging)],
            &pipeline,
            OrphanPolicy::Drop,
        );
        let pct = partial.get(&key("B1")).unwrap().progress_pct(&pipeline);
        assert!(pct > 0.0 && pct < 100.0);

        let done = aggregate(
            vec![Batch::new(key("B1"))],
            full_pipeline_records("B1"),
            &pipeline,
            OrphanPolicy::Drop,
        );
        let tl = done.get(&key("B1")).unwrap();
        assert_eq!(tl.progress_pct(&pipeline), 100.0);
        assert!(tl.is_complete(&pipeline));
        assert_eq!(tl.current_stage(&pipeline), None);
    }

    #[test]
    fn test_progress_below_100_until_every_stage_done() {
        let pipeline = Pipeline::default();
        let mut records = full_pipeline_records("B1");
        records.retain(|r| r.stage != Stage::Marking);
        let t = aggregate(vec![Batch::new(key("B1"))], records, &pipeline, OrphanPolicy::Drop);
        let pct = t.get(&key("B1")).unwrap().progress_pct(&pipeline);
        assert!(pct < 100.0);
        assert!((0.0..=100.0).contains(&pct));
    }

    #[test]
    fn test_process_time_two_stage_pipeline() {
        let pipeline = Pipeline::new(vec![Stage::MaterialIssued, Stage::Dispatch]).unwrap();
        let t = aggregate(
            vec![Batch::new(key("B1"))],
            vec![
                rec("B1", Stage::MaterialIssued).on(date(2024, 1, 1)),
                rec("B1", Stage::Dispatch).on(date(2024, 1, 10)),
            ],
            &pipeline,
            OrphanPolicy::Drop,
        );
        let tl = t.get(&key("B1")).unwrap();
        assert_eq!(tl.process_time(), ProcessTime::Days(9));
        assert_eq!(tl.progress_pct(&pipeline), 100.0);
    }

    #[test]
    fn test_process_time_uses_earliest_records() {
        let t = aggregate(
            vec![Batch::new(key("B1"))],
            vec![
                rec("B1", Stage::Dispatch).on(date(2024, 1, 20)),
                rec("B1", Stage::Dispatch).on(date(2024, 1, 12)),
                rec("B1", Stage::MaterialIssued).on(date(2024, 1, 2)),
            ],
            &Pipeline::default(),
            OrphanPolicy::Drop,
        );
        assert_eq!(t.get(&key("B1")).unwrap().process_time(), ProcessTime::Days(10));
    }

    #[test]
    fn test_process_time_not_available() {
        let pipeline = Pipeline::default();
        let missing_dispatch = aggregate(
            vec![Batch::new(key("B1"))],
            vec![rec("B1", Stage::MaterialIssued).on(date(2024, 1, 1))],
            &pipeline,
            OrphanPolicy::Drop,
        );
        assert_eq!(
            missing_dispatch.get(&key("B1")).unwrap().process_time(),
            ProcessTime::NotAvailable
        );

        let undated = aggregate(
            vec![Batch::new(key("B1"))],
            vec![
                rec("B1", Stage::MaterialIssued),
                rec("B1", Stage::Dispatch).on(date(2024, 1, 10)),
            ],
            &pipeline,
            OrphanPolicy::Drop,
        );
        assert_eq!(
            undated.get(&key("B1")).unwrap().process_time(),
            ProcessTime::NotAvailable
        );
    }

    #[test]
    fn test_process_time_is_non_negative() {
        let t = aggregate(
            vec![Batch::new(key("B1"))],
            vec![
                rec("B1", Stage::MaterialIssued).on(date(2024, 1, 10)),
                rec("B1", Stage::Dispatch).on(date(2024, 1, 7)),
            ],
            &Pipeline::default(),
            OrphanPolicy::Drop,
        );
        assert_eq!(t.get(&key("B1")).unwrap().process_time(), ProcessTime::Days(3));
    }

    #[test]
    fn test_wip_buckets() {
        let pipeline =
            Pipeline::new(vec![Stage::MaterialIssued, Stage::Forging, Stage::Dispatch]).unwrap();
        let t = aggregate(
            vec![Batch::new(key("A")), Batch::new(key("B")), Batch::new(key("C"))],
            vec![
                rec("B", Stage::MaterialIssued),
                rec("C", Stage::MaterialIssued),
                rec("C", Stage::Forging),
                rec("C", Stage::Dispatch),
            ],
            &pipeline,
            OrphanPolicy::Drop,
        );
        let wip = t.wip();
        assert_eq!(
            wip,
            vec![
                WipBucket {
                    stage: Some(Stage::MaterialIssued),
                    batches: 1,
                },
                WipBucket {
                    stage: Some(Stage::Forging),
                    batches: 1,
                },
                WipBucket {
                    stage: Some(Stage::Dispatch),
                    batches: 0,
                },
                WipBucket {
                    stage: None,
                    batches: 1,
                },
            ]
        );
    }

    #[test]
    fn test_summary_carries_batch_metadata() {
        let mut batch = Batch::new(key("B1"));
        batch.component = Some("FL-220".to_string());
        let pipeline = Pipeline::default();
        let t = aggregate(
            vec![batch],
            vec![rec("B1", Stage::MaterialIssued)],
            &pipeline,
            OrphanPolicy::Drop,
        );
        let s = t.summaries().remove(0);
        assert_eq!(s.component.as_deref(), Some("FL-220"));
        assert_eq!(s.current_stage, Some(Stage::Forging));
        assert_eq!(s.stages_done, 1);
        assert_eq!(s.records, 1);
        assert_eq!(s.process_time_days, None);
    }

    #[test]
    fn test_orphan_policy_parsing() {
        assert_eq!("drop".parse::<OrphanPolicy>().unwrap(), OrphanPolicy::Drop);
        assert_eq!("CREATE".parse::<OrphanPolicy>().unwrap(), OrphanPolicy::Create);
        assert!("keep".parse::<OrphanPolicy>().is_err());
    }

    #[test]
    fn test_process_time_display() {
        assert_eq!(ProcessTime::Days(9).to_string(), "9 days");
        assert_eq!(ProcessTime::Days(1).to_string(), "1 day");
        assert_eq!(ProcessTime::NotAvailable.to_string(), "n/a");
    }
}
