//! Analysis over normalized production data
//!
//! - [`aggregate`] - per-batch stage timelines, progress and process time
//! - [`capacity`] - line capacity utilization and tiers
//! - [`schedule`] - schedule lines versus forged / dispatched pieces

pub mod aggregate;
pub mod capacity;
pub mod schedule;

pub use aggregate::{
    aggregate, BatchTimeline, OrphanPolicy, ProcessTime, StageState, TimelineSummary,
    Traceability, WipBucket,
};
pub use capacity::{utilization, CapacityTable, LineUtilization, ProductionEntry, UtilizationTier};
pub use schedule::{months_covered, production_entries, schedule_status, ScheduleStatus};
