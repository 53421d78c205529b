//! Line capacity utilization
//!
//! Capacities come from one table owned by configuration. Lines missing from
//! the table use the table's fallback capacity, which is never zero.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// Capacity used for lines absent from the table when none is configured (kg/month)
pub const DEFAULT_FALLBACK_CAPACITY: f64 = 1000.0;

/// Monthly weight capacity per production line (kg)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapacityTable {
    /// Capacity for lines not listed in `lines`
    pub fallback: f64,

    /// Line name -> monthly capacity
    pub lines: BTreeMap<String, f64>,
}

impl Default for CapacityTable {
    fn default() -> Self {
        Self {
            fallback: DEFAULT_FALLBACK_CAPACITY,
            lines: BTreeMap::new(),
        }
    }
}

impl CapacityTable {
    /// Check that every capacity is a positive finite number
    pub fn validate(&self) -> Result<(), String> {
        if !(self.fallback.is_finite() && self.fallback > 0.0) {
            return Err(format!(
                "capacity.fallback must be greater than zero (got {})",
                self.fallback
            ));
        }
        for (line, cap) in &self.lines {
            if !(cap.is_finite() && *cap > 0.0) {
                return Err(format!(
                    "capacity for line '{}' must be greater than zero (got {})",
                    line, cap
                ));
            }
        }
        Ok(())
    }

    /// Capacity for a line and whether the fallback was used
    pub fn capacity_for(&self, line: &str) -> (f64, bool) {
        match self.lines.get(line) {
            Some(cap) if cap.is_finite() && *cap > 0.0 => (*cap, false),
            _ => (self.fallback, true),
        }
    }
}

/// Utilization band
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UtilizationTier {
    /// Below 60%
    Low,
    /// 60% up to (not including) 80%
    Moderate,
    /// 80% up to and including 100%
    High,
    /// Above 100%
    Over,
}

impl UtilizationTier {
    pub fn from_pct(pct: f64) -> Self {
        if pct < 60.0 {
            UtilizationTier::Low
        } else if pct < 80.0 {
            UtilizationTier::Moderate
        } else if pct <= 100.0 {
            UtilizationTier::High
        } else {
            UtilizationTier::Over
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            UtilizationTier::Low => "<60%",
            UtilizationTier::Moderate => "60-80%",
            UtilizationTier::High => "80-100%",
            UtilizationTier::Over => ">100%",
        }
    }
}

impl std::fmt::Display for UtilizationTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UtilizationTier::Low => write!(f, "low"),
            UtilizationTier::Moderate => write!(f, "moderate"),
            UtilizationTier::High => write!(f, "high"),
            UtilizationTier::Over => write!(f, "over"),
        }
    }
}

/// Planned and produced weight of one component on one line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionEntry {
    pub component: String,
    pub line: String,
    pub planned_weight: f64,
    pub produced_weight: f64,
}

/// Utilization of one line
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineUtilization {
    pub line: String,
    /// Monthly capacity times `months`
    pub capacity: f64,
    /// Months the capacity covers
    pub months: u32,
    /// True when the line was not in the capacity table
    pub fallback_capacity: bool,
    pub components: usize,
    pub planned_weight: f64,
    pub produced_weight: f64,
    pub utilization_pct: f64,
    pub tier: UtilizationTier,
}

/// Aggregate production entries per line and compute utilization
///
/// Entries spanning `months` calendar months are measured against that many
/// months of capacity. Output is sorted by line name.
pub fn utilization(
    entries: &[ProductionEntry],
    table: &CapacityTable,
    months: u32,
) -> Vec<LineUtilization> {
    struct Acc {
        planned: f64,
        produced: f64,
        components: Vec<String>,
    }

    let months = months.max(1);
    let mut per_line: BTreeMap<&str, Acc> = BTreeMap::new();
    for entry in entries {
        let acc = per_line.entry(entry.line.as_str()).or_insert(Acc {
            planned: 0.0,
            produced: 0.0,
            components: Vec::new(),
        });
        acc.planned += entry.planned_weight;
        acc.produced += entry.produced_weight;
        if !acc.components.contains(&entry.component) {
            acc.components.push(entry.component.clone());
        }
    }

    per_line
        .into_iter()
        .map(|(line, acc)| {
            let (monthly, fallback) = table.capacity_for(line);
            if fallback {
                warn!(line, capacity = monthly, "no capacity configured for line, using fallback");
            }
            let capacity = monthly * f64::from(months);
            let utilization_pct = acc.produced / capacity * 100.0;
            LineUtilization {
                line: line.to_string(),
                capacity,
                months,
                fallback_capacity: fallback,
                components: acc.components.len(),
                planned_weight: acc.planned,
                produced_weight: acc.produced,
                utilization_pct,
                tier: UtilizationTier::from_pct(utilization_pct),
            }
        })
        .collect()
}
