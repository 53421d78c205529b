//! Stage record - one production event for a batch at a pipeline stage

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::stage::Stage;
use crate::entities::batch::BatchKey;

/// An append-only event: something happened to a batch at a stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    /// Batch this record belongs to
    pub batch: BatchKey,

    /// Stage the record was produced at
    pub stage: Stage,

    /// Event date (None when missing or unparseable in the source)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,

    /// Quantity produced / inspected / dispatched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<u32>,

    /// Production line (press / machine) the record was made on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<String>,

    /// Operator or verifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,

    /// Free-text remarks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,

    /// Remaining source fields, kept verbatim
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl StageRecord {
    pub fn new(batch: BatchKey, stage: Stage) -> Self {
        Self {
            batch,
            stage,
            date: None,
            quantity: None,
            line: None,
            operator: None,
            remarks: None,
            extra: BTreeMap::new(),
        }
    }

    /// Builder-style date setter
    pub fn on(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    /// Builder-style quantity setter
    pub fn qty(mut self, quantity: u32) -> Self {
        self.quantity = Some(quantity);
        self
    }

    /// Builder-style production line setter
    pub fn at_line(mut self, line: impl Into<String>) -> Self {
        self.line = Some(line.into());
        self
    }
}
