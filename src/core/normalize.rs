//! Normalization of raw API records into canonical entities
//!
//! The ERP endpoints are not consistent about field names: the batch
//! identifier shows up as `batch_number` on some pages and `block_mt_id` on
//! others, quantities as `qty`, `pieces` or `production`, and dates in several
//! formats. Everything is reconciled here so aggregation only ever sees
//! [`BatchKey`], [`StageRecord`] and friends.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use miette::Diagnostic;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::core::stage::Stage;
use crate::entities::{Batch, BatchKey, ScheduleLine, StageRecord};

/// Field names that may carry the batch identifier, in lookup order
pub const BATCH_KEY_FIELDS: &[&str] = &["batch_number", "block_mt_id", "batch_id", "batch_no"];

const DATE_FIELDS: &[&str] = &[
    "date",
    "issue_date",
    "forging_date",
    "ht_date",
    "inspection_date",
    "dispatch_date",
    "invoice_date",
    "created_at",
];
const QUANTITY_FIELDS: &[&str] = &[
    "qty",
    "quantity",
    "pieces",
    "production",
    "pices",
    "no_of_pieces",
];
const OPERATOR_FIELDS: &[&str] = &["operator", "verified_by", "inspector", "shift_incharge"];
const REMARK_FIELDS: &[&str] = &["remarks", "remark", "notes"];
const LINE_FIELDS: &[&str] = &["line", "press", "machine"];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d-%m-%Y", "%d/%m/%Y", "%Y/%m/%d"];

/// A record that could not be normalized
#[derive(Debug, Clone, Error, Diagnostic, PartialEq)]
pub enum NormalizeError {
    #[error("{source_name} record #{index} is not a JSON object")]
    #[diagnostic(code(mft::normalize::not_object))]
    NotAnObject { source_name: String, index: usize },

    #[error("{source_name} record #{index} has no batch identifier")]
    #[diagnostic(
        code(mft::normalize::missing_key),
        help("Expected one of: batch_number, block_mt_id, batch_id, batch_no")
    )]
    MissingBatchKey { source_name: String, index: usize },

    #[error("{source_name} record #{index} is missing required field '{field}'")]
    #[diagnostic(code(mft::normalize::missing_field))]
    MissingField {
        source_name: String,
        index: usize,
        field: &'static str,
    },
}

/// Normalized items plus the records that had to be skipped
#[derive(Debug, Clone)]
pub struct Normalized<T> {
    pub items: Vec<T>,
    pub skipped: Vec<NormalizeError>,
}

impl<T> Default for Normalized<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

/// Extract the canonical batch key from a raw record
pub fn batch_key(obj: &Map<String, Value>) -> Option<BatchKey> {
    BATCH_KEY_FIELDS
        .iter()
        .filter_map(|f| obj.get(*f))
        .find_map(value_as_string)
        .and_then(|s| BatchKey::new(&s))
}

/// Parse a date from the formats the ERP emits
///
/// Accepts ISO dates, RFC 3339 timestamps, `YYYY-MM-DDTHH:MM:SS` and the
/// day-first forms used by older pages. Anything else yields `None`.
pub fn parse_date(value: &Value) -> Option<NaiveDate> {
    let s = value.as_str()?.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt.date());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.date());
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

/// Normalize one stage's raw records
pub fn normalize_stage_records(stage: Stage, raw: &[Value]) -> Normalized<StageRecord> {
    let mut out = Normalized::default();

    for (index, value) in raw.iter().enumerate() {
        let Some(obj) = value.as_object() else {
            out.skipped.push(NormalizeError::NotAnObject {
                source_name: stage.to_string(),
                index,
            });
            continue;
        };
        let Some(key) = batch_key(obj) else {
            out.skipped.push(NormalizeError::MissingBatchKey {
                source_name: stage.to_string(),
                index,
            });
            continue;
        };

        let mut record = StageRecord::new(key, stage);
        record.date = first_field(obj, DATE_FIELDS).and_then(parse_date);
        record.quantity = first_field(obj, QUANTITY_FIELDS).and_then(value_as_u32);
        record.line = text(obj, LINE_FIELDS);
        record.operator = first_field(obj, OPERATOR_FIELDS).and_then(value_as_string);
        record.remarks = first_field(obj, REMARK_FIELDS).and_then(value_as_string);
        record.extra = remaining_fields(
            obj,
            &[
                BATCH_KEY_FIELDS,
                DATE_FIELDS,
                QUANTITY_FIELDS,
                LINE_FIELDS,
                OPERATOR_FIELDS,
                REMARK_FIELDS,
            ],
        );

        out.items.push(record);
    }

    out
}

/// Normalize raw batch (Block MT) records
pub fn normalize_batches(raw: &[Value]) -> Normalized<Batch> {
    let mut out = Normalized::default();

    for (index, value) in raw.iter().enumerate() {
        let Some(obj) = value.as_object() else {
            out.skipped.push(NormalizeError::NotAnObject {
                source_name: "batches".to_string(),
                index,
            });
            continue;
        };
        let Some(key) = batch_key(obj) else {
            out.skipped.push(NormalizeError::MissingBatchKey {
                source_name: "batches".to_string(),
                index,
            });
            continue;
        };

        let mut batch = Batch::new(key);
        batch.component = text(obj, &["component", "component_no", "part_number"]);
        batch.customer = text(obj, &["customer", "customer_name"]);
        batch.supplier = text(obj, &["supplier", "supplier_name"]);
        batch.heat_number = text(obj, &["heat_number", "heatno", "heat_no"]);
        batch.grade = text(obj, &["grade", "material_grade"]);
        batch.pieces = first_field(obj, &["pieces", "pices", "no_of_pieces", "qty"])
            .and_then(value_as_u32);
        batch.weight = first_field(obj, &["weight", "bar_weight", "issued_weight"])
            .and_then(value_as_f64);
        batch.created =
            first_field(obj, &["created_at", "date", "issue_date"]).and_then(parse_date);

        out.items.push(batch);
    }

    out
}

/// Normalize raw schedule lines
pub fn normalize_schedule(raw: &[Value]) -> Normalized<ScheduleLine> {
    let mut out = Normalized::default();

    for (index, value) in raw.iter().enumerate() {
        let Some(obj) = value.as_object() else {
            out.skipped.push(NormalizeError::NotAnObject {
                source_name: "schedule".to_string(),
                index,
            });
            continue;
        };
        let Some(component) = text(obj, &["component", "component_no", "part_number"]) else {
            out.skipped.push(NormalizeError::MissingField {
                source_name: "schedule".to_string(),
                index,
                field: "component",
            });
            continue;
        };
        let Some(pieces) = first_field(obj, &["pieces", "pices", "planned_pieces", "qty"])
            .and_then(value_as_u32)
        else {
            out.skipped.push(NormalizeError::MissingField {
                source_name: "schedule".to_string(),
                index,
                field: "pieces",
            });
            continue;
        };

        let slug_weight = first_field(obj, &["slug_weight", "slug_wt"])
            .and_then(value_as_f64)
            .unwrap_or(0.0);
        let mut line = ScheduleLine::new(component, pieces, slug_weight);
        line.customer = text(obj, &["customer", "customer_name"]);
        line.line = text(obj, &["line", "press", "machine"]);
        line.weight = first_field(obj, &["weight", "target_weight"]).and_then(value_as_f64);
        line.month = first_field(obj, &["month", "date", "planned_date"]).and_then(parse_month);

        out.items.push(line);
    }

    out
}

fn parse_month(value: &Value) -> Option<NaiveDate> {
    parse_date(value).or_else(|| {
        let s = value.as_str()?.trim();
        NaiveDate::parse_from_str(&format!("{}-01", s), "%Y-%m-%d").ok()
    })
}

fn first_field<'a>(obj: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names
        .iter()
        .filter_map(|n| obj.get(*n))
        .find(|v| !v.is_null())
}

fn text(obj: &Map<String, Value>, names: &[&str]) -> Option<String> {
    first_field(obj, names).and_then(value_as_string)
}

fn value_as_string(value: &Value) -> Option<String> {
    let s = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn value_as_u32(value: &Value) -> Option<u32> {
    let f = value_as_f64(value)?;
    if f.is_finite() && f >= 0.0 && f <= u32::MAX as f64 {
        Some(f.round() as u32)
    } else {
        None
    }
}

fn remaining_fields(obj: &Map<String, Value>, known: &[&[&str]]) -> BTreeMap<String, Value> {
    obj.iter()
        .filter(|(k, _)| !known.iter().any(|group| group.contains(&k.as_str())))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}
