//! mft: manufacturing traceability toolkit
//!
//! Reads batches and per-stage production records from a manufacturing ERP's
//! REST API, folds them into per-batch stage timelines, computes production
//! line utilization and validates production-entry forms against explicit
//! schemas before they are submitted.

pub mod analysis;
pub mod cli;
pub mod core;
pub mod entities;
pub mod forms;
pub mod logging;
pub mod parse;
