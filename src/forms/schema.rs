//! Form schema types
//!
//! A form schema enumerates every field a production-entry form carries: its
//! type, whether the operator may edit it, the rules its value must satisfy and,
//! for computed fields, how it is derived from other fields.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;

use crate::core::stage::Stage;

/// A form definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FormSchema {
    /// Identifier used on the command line (e.g. `forging`)
    pub name: String,

    /// Human-readable title
    pub title: String,

    /// API path the payload is POSTed to, relative to the base URL
    pub endpoint: String,

    /// Stage this form records, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub fields: Vec<FieldSpec>,
}

/// One field of a form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldSpec {
    /// Payload key
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    pub kind: FieldKind,

    /// Allowed values for `select` fields
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,

    #[serde(default)]
    pub required: bool,

    /// The operator may not supply a value
    #[serde(default)]
    pub read_only: bool,

    #[serde(default, skip_serializing_if = "Rules::is_empty")]
    pub rules: Rules,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derive: Option<Derivation>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
}

/// Value type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Integer,
    Decimal,
    Date,
    Select,
    Boolean,
}

impl FieldKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Integer => "integer",
            FieldKind::Decimal => "decimal",
            FieldKind::Date => "date",
            FieldKind::Select => "select",
            FieldKind::Boolean => "boolean",
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, FieldKind::Integer | FieldKind::Decimal)
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Rules as written in a schema file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Rules {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
}

/// A single validation rule
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rule {
    Min(f64),
    Max(f64),
    MaxLength(usize),
}

impl Rules {
    pub fn is_empty(&self) -> bool {
        self.min.is_none() && self.max.is_none() && self.max_length.is_none()
    }

    pub fn iter(&self) -> impl Iterator<Item = Rule> {
        [
            self.min.map(Rule::Min),
            self.max.map(Rule::Max),
            self.max_length.map(Rule::MaxLength),
        ]
        .into_iter()
        .flatten()
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::Min(v) => write!(f, ">= {}", v),
            Rule::Max(v) => write!(f, "<= {}", v),
            Rule::MaxLength(n) => write!(f, "at most {} chars", n),
        }
    }
}

/// How a computed field gets its value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case", deny_unknown_fields)]
pub enum Derivation {
    /// Product of the named numeric fields times a constant factor
    Product {
        of: Vec<String>,
        #[serde(default = "one")]
        factor: f64,
        /// Decimal places to round the result to
        #[serde(default, skip_serializing_if = "Option::is_none")]
        round: Option<u32>,
    },
}

fn one() -> f64 {
    1.0
}

impl Derivation {
    /// Fields this derivation reads
    pub fn inputs(&self) -> &[String] {
        match self {
            Derivation::Product { of, .. } => of,
        }
    }

    /// Compute the value from resolved inputs (in `inputs()` order)
    pub fn compute(&self, inputs: &[f64]) -> f64 {
        match self {
            Derivation::Product { factor, round, .. } => {
                let value = inputs.iter().product::<f64>() * factor;
                match round {
                    Some(places) => {
                        let scale = 10f64.powi(*places as i32);
                        (value * scale).round() / scale
                    }
                    None => value,
                }
            }
        }
    }
}

impl fmt::Display for Derivation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Derivation::Product { of, factor, .. } => {
                write!(f, "{}", of.join(" * "))?;
                if (*factor - 1.0).abs() > f64::EPSILON {
                    write!(f, " * {}", factor)?;
                }
                Ok(())
            }
        }
    }
}

impl FieldSpec {
    /// Label for prompts and tables, falling back to the title-cased name
    pub fn label(&self) -> String {
        if let Some(label) = &self.label {
            return label.clone();
        }
        self.name
            .split('_')
            .filter(|w| !w.is_empty())
            .map(|w| {
                let mut chars = w.chars();
                match chars.next() {
                    None => String::new(),
                    Some(c) => c.to_uppercase().chain(chars).collect(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Computed fields are never entered by the operator
    pub fn is_editable(&self) -> bool {
        !self.read_only && self.derive.is_none()
    }
}

impl FormSchema {
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Fields the operator fills in, in declaration order
    pub fn editable_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| f.is_editable())
    }

    /// Check the schema itself is coherent
    ///
    /// Returns one message per problem; an empty list means the schema is usable.
    pub fn check(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.name.trim().is_empty() {
            problems.push("form name is empty".to_string());
        }
        if self.endpoint.trim().is_empty() {
            problems.push("endpoint is empty".to_string());
        }

        let mut seen = HashSet::new();
        for field in &self.fields {
            if !seen.insert(field.name.as_str()) {
                problems.push(format!("field '{}' is declared twice", field.name));
            }
            if field.kind == FieldKind::Select && field.options.is_empty() {
                problems.push(format!("select field '{}' has no options", field.name));
            }
            if field.kind != FieldKind::Select && !field.options.is_empty() {
                problems.push(format!(
                    "field '{}' lists options but is {}",
                    field.name, field.kind
                ));
            }
            if (field.rules.min.is_some() || field.rules.max.is_some()) && !field.kind.is_numeric()
            {
                problems.push(format!(
                    "field '{}' has min/max rules but is {}",
                    field.name, field.kind
                ));
            }
            if let (Some(min), Some(max)) = (field.rules.min, field.rules.max) {
                if min > max {
                    problems.push(format!("field '{}' has min > max", field.name));
                }
            }
            if let Some(derive) = &field.derive {
                if !field.kind.is_numeric() {
                    problems.push(format!(
                        "derived field '{}' must be integer or decimal",
                        field.name
                    ));
                }
                for input in derive.inputs() {
                    match self.field(input) {
                        None => problems.push(format!(
                            "field '{}' derives from unknown field '{}'",
                            field.name, input
                        )),
                        Some(src) if !src.kind.is_numeric() => problems.push(format!(
                            "field '{}' derives from non-numeric field '{}'",
                            field.name, input
                        )),
                        Some(src) if src.derive.is_some() => problems.push(format!(
                            "field '{}' derives from derived field '{}'",
                            field.name, input
                        )),
                        Some(_) => {}
                    }
                }
            }
        }

        problems
    }
}
