//! Schedule line - planned production for a (component, customer) pair

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Forging allowance applied to slug weight when no target weight is given
pub const FORGING_ALLOWANCE: f64 = 1.03;

/// Weight of material needed for `pieces` slugs, including the forging allowance
pub fn material_weight(slug_weight: f64, pieces: u32) -> f64 {
    slug_weight * pieces as f64 * FORGING_ALLOWANCE
}

/// Planned quantity of a component for a customer on a production line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleLine {
    /// Component (part number)
    pub component: String,

    /// Customer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer: Option<String>,

    /// Production line (forging press / hammer)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<String>,

    /// Planned pieces
    pub pieces: u32,

    /// Slug weight per piece (kg)
    #[serde(default)]
    pub slug_weight: f64,

    /// Explicit target weight (kg); overrides the slug-derived weight
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,

    /// Month the plan applies to (any day within the month)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub month: Option<NaiveDate>,
}

impl ScheduleLine {
    pub fn new(component: impl Into<String>, pieces: u32, slug_weight: f64) -> Self {
        Self {
            component: component.into(),
            customer: None,
            line: None,
            pieces,
            slug_weight,
            weight: None,
            month: None,
        }
    }

    /// Target weight: explicit weight, else slug weight x pieces x allowance
    pub fn planned_weight(&self) -> f64 {
        self.weight
            .unwrap_or_else(|| material_weight(self.slug_weight, self.pieces))
    }

    /// Whether this line is planned for the month containing `date`
    ///
    /// Lines without a month apply to every month.
    pub fn in_month(&self, date: NaiveDate) -> bool {
        match self.month {
            Some(m) => m.year() == date.year() && m.month() == date.month(),
            None => true,
        }
    }

    /// Whether a batch for `component` / `customer` counts against this line
    ///
    /// A line without a customer matches every customer of the component.
    pub fn matches(&self, component: Option<&str>, customer: Option<&str>) -> bool {
        let component_ok = component.is_some_and(|c| c.eq_ignore_ascii_case(&self.component));
        let customer_ok = match (&self.customer, customer) {
            (None, _) => true,
            (Some(want), Some(have)) => want.eq_ignore_ascii_case(have),
            (Some(_), None) => false,
        };
        component_ok && customer_ok
    }
}
