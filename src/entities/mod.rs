//! Entity type definitions
//!
//! - [`Batch`] - a lot of raw material allocated to a component (Block MT)
//! - [`StageRecord`] - one production event for a batch at a pipeline stage
//! - [`ScheduleLine`] - planned production for a component / customer

pub mod batch;
pub mod schedule;
pub mod stage_record;

pub use batch::{Batch, BatchKey};
pub use schedule::ScheduleLine;
pub use stage_record::StageRecord;
