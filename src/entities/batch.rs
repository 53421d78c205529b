//! Batch (Block MT) - a tracked lot of raw material allocated to a component

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Canonical batch identifier
///
/// Source systems name this `batch_number`, `block_mt_id`, `batch_id` or
/// `batch_no`; by the time a key exists those differences are gone.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BatchKey(String);

impl BatchKey {
    /// Create a key from raw text, trimming whitespace
    ///
    /// Returns `None` for blank input.
    pub fn new(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BatchKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for BatchKey {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        BatchKey::new(&value).ok_or_else(|| "Batch key cannot be empty".to_string())
    }
}

impl From<BatchKey> for String {
    fn from(key: BatchKey) -> Self {
        key.0
    }
}

/// A produced lot, created at raw-material allocation time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    /// Canonical batch identifier
    pub key: BatchKey,

    /// Component (part number) the material was allocated to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,

    /// Customer the component is made for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer: Option<String>,

    /// Raw material supplier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supplier: Option<String>,

    /// Supplier heat number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heat_number: Option<String>,

    /// Material grade
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade: Option<String>,

    /// Planned pieces for this batch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pieces: Option<u32>,

    /// Allocated material weight (kg)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,

    /// Allocation date
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<NaiveDate>,
}

impl Batch {
    /// Create a batch with only its key known
    pub fn new(key: BatchKey) -> Self {
        Self {
            key,
            component: None,
            customer: None,
            supplier: None,
            heat_number: None,
            grade: None,
            pieces: None,
            weight: None,
            created: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_key_trims_and_rejects_blank() {
        assert_eq!(BatchKey::new("  B-001 ").unwrap().as_str(), "B-001");
        assert!(BatchKey::new("   ").is_none());
        assert!(BatchKey::new("").is_none());
    }

    #[test]
    fn test_batch_deserialization() {
        let yaml = r#"
key: "BMT-2024-017"
component: "FL-220"
supplier: "Sunflag"
heat_number: "H4471"
pieces: 400
weight: 1250.5
created: 2024-03-02
"#;
        let batch: Batch = serde_yml::from_str(yaml).unwrap();
        assert_eq!(batch.key.as_str(), "BMT-2024-017");
        assert_eq!(batch.pieces, Some(400));
        assert_eq!(batch.created, NaiveDate::from_ymd_opt(2024, 3, 2));
        assert!(batch.customer.is_none());
    }

    #[test]
    fn test_blank_key_fails_deserialization() {
        let result: Result<Batch, _> = serde_yml::from_str("key: \"  \"");
        assert!(result.is_err());
    }
}
