//! Form validation with detailed error reporting
//!
//! Operator input is checked field by field against a [`FormSchema`]. Values
//! are coerced to the field's kind, rules are applied, read-only fields are
//! refused and derived fields are computed. The result is the JSON payload the
//! API expects.

use miette::{Diagnostic, NamedSource, SourceSpan};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::path::Path;
use thiserror::Error;

use crate::core::normalize::parse_date;
use crate::forms::schema::{FieldKind, FieldSpec, FormSchema, Rule};

/// What is wrong with one field
#[derive(Debug, Clone, PartialEq)]
pub enum Issue {
    Missing,
    ReadOnly,
    Unknown,
    WrongType(FieldKind),
    NotAnOption(Vec<String>),
    BelowMin(f64),
    AboveMax(f64),
    TooLong(usize),
    /// A derived field could not be computed; holds the missing inputs
    Underivable(Vec<String>),
}

/// A single field violation
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    pub field: String,
    pub issue: Issue,
}

impl Violation {
    fn new(field: &str, issue: Issue) -> Self {
        Self {
            field: field.to_string(),
            issue,
        }
    }

    /// Short hint for the source label
    pub fn hint(&self) -> &'static str {
        match self.issue {
            Issue::Missing => "required field missing",
            Issue::ReadOnly => "read-only",
            Issue::Unknown => "unknown field",
            Issue::WrongType(_) => "wrong type",
            Issue::NotAnOption(_) => "invalid value",
            Issue::BelowMin(_) => "too small",
            Issue::AboveMax(_) => "too large",
            Issue::TooLong(_) => "too long",
            Issue::Underivable(_) => "cannot compute",
        }
    }

    /// Suggestion for fixing the input
    pub fn help(&self) -> Option<String> {
        match &self.issue {
            Issue::Missing => Some(format!("Add the '{}' field", self.field)),
            Issue::ReadOnly => Some(format!(
                "Remove '{}'; it is filled in automatically",
                self.field
            )),
            Issue::Unknown => Some(format!("Remove '{}' or check its spelling", self.field)),
            Issue::NotAnOption(options) => Some(format!("Valid values: {}", options.join(", "))),
            Issue::Underivable(missing) => Some(format!("Provide {}", missing.join(", "))),
            _ => None,
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let field = &self.field;
        match &self.issue {
            Issue::Missing => write!(f, "missing required field '{}'", field),
            Issue::ReadOnly => write!(f, "'{}' is read-only", field),
            Issue::Unknown => write!(f, "unknown field '{}'", field),
            Issue::WrongType(kind) => write!(f, "'{}' must be {}", field, kind),
            Issue::NotAnOption(_) => write!(f, "'{}' is not one of the allowed values", field),
            Issue::BelowMin(min) => write!(f, "'{}' must be at least {}", field, min),
            Issue::AboveMax(max) => write!(f, "'{}' must be at most {}", field, max),
            Issue::TooLong(max) => write!(f, "'{}' must be at most {} characters", field, max),
            Issue::Underivable(_) => write!(f, "'{}' cannot be computed", field),
        }
    }
}

/// Validated request body
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Payload(Map<String, Value>);

impl Payload {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Form input rejected, with each violation labelled in the input file
#[derive(Debug, Error, Diagnostic)]
#[error("form '{form}' is invalid: {summary}")]
#[diagnostic(code(mft::form::invalid))]
pub struct FormError {
    form: String,
    summary: String,

    #[source_code]
    src: NamedSource<String>,

    #[related]
    violations: Vec<ViolationReport>,
}

#[derive(Debug, Error, Diagnostic)]
#[error("{message}")]
pub struct ViolationReport {
    #[label("{hint}")]
    span: SourceSpan,

    message: String,
    hint: String,

    #[help]
    help: Option<String>,
}

impl FormError {
    pub fn new(form: &str, filename: &str, source: &str, violations: &[Violation]) -> Self {
        let count = violations.len();
        let summary = if count == 1 {
            "1 error".to_string()
        } else {
            format!("{} errors", count)
        };
        let violations = violations
            .iter()
            .map(|v| ViolationReport {
                span: find_key_span(source, &v.field).unwrap_or_else(|| first_line(source)),
                message: v.to_string(),
                hint: v.hint().to_string(),
                help: v.help(),
            })
            .collect();
        Self {
            form: form.to_string(),
            summary,
            src: NamedSource::new(filename, source.to_string()),
            violations,
        }
    }

    pub fn violation_count(&self) -> usize {
        self.violations.len()
    }
}

/// Validate operator input against a schema
pub fn validate(
    schema: &FormSchema,
    values: &Map<String, Value>,
) -> Result<Payload, Vec<Violation>> {
    let mut payload = Map::new();
    let mut violations = Vec::new();

    for key in values.keys() {
        if schema.field(key).is_none() {
            violations.push(Violation::new(key, Issue::Unknown));
        }
    }

    for field in &schema.fields {
        let supplied = values.get(&field.name).filter(|v| !is_blank(v));

        if !field.is_editable() {
            if supplied.is_some() {
                violations.push(Violation::new(&field.name, Issue::ReadOnly));
            }
            if field.derive.is_none() {
                if let Some(default) = &field.default {
                    payload.insert(field.name.clone(), default.clone());
                }
            }
            continue;
        }

        match supplied.or(field.default.as_ref()) {
            None if field.required => violations.push(Violation::new(&field.name, Issue::Missing)),
            None => {}
            Some(raw) => match coerce(field, raw).and_then(|v| check_rules(field, v)) {
                Ok(value) => {
                    payload.insert(field.name.clone(), value);
                }
                Err(issue) => violations.push(Violation::new(&field.name, issue)),
            },
        }
    }

    for field in &schema.fields {
        let Some(derive) = &field.derive else {
            continue;
        };
        let mut inputs = Vec::new();
        let mut missing = Vec::new();
        for name in derive.inputs() {
            match payload.get(name).and_then(Value::as_f64) {
                Some(v) => inputs.push(v),
                None => missing.push(name.clone()),
            }
        }
        if !missing.is_empty() {
            // Inputs that failed validation are already reported
            let reported = missing
                .iter()
                .all(|m| violations.iter().any(|v| &v.field == m));
            if field.required && !reported {
                violations.push(Violation::new(&field.name, Issue::Underivable(missing)));
            }
            continue;
        }
        let computed = derive.compute(&inputs);
        let value = if field.kind == FieldKind::Integer {
            Value::from(computed.round() as i64)
        } else {
            Value::from(computed)
        };
        match check_rules(field, value) {
            Ok(value) => {
                payload.insert(field.name.clone(), value);
            }
            Err(issue) => violations.push(Violation::new(&field.name, issue)),
        }
    }

    if violations.is_empty() {
        Ok(Payload(payload))
    } else {
        Err(violations)
    }
}

/// Read form input from a YAML or JSON file
///
/// Returns the values along with the raw text for error reporting.
pub fn read_values(path: &Path) -> miette::Result<(Map<String, Value>, String)> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| miette::miette!("failed to read {}: {}", path.display(), e))?;
    let value: Value = crate::parse::parse_str(&content, path)?;
    match value {
        Value::Object(map) => Ok((map, content)),
        Value::Null => Ok((Map::new(), content)),
        _ => Err(miette::miette!(
            "{}: form input must be a mapping of field names to values",
            path.display()
        )),
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Convert a raw value to the field's kind
fn coerce(field: &FieldSpec, raw: &Value) -> Result<Value, Issue> {
    let wrong = || Issue::WrongType(field.kind);
    match field.kind {
        FieldKind::Text => match raw {
            Value::String(s) => Ok(Value::String(s.trim().to_string())),
            Value::Number(n) => Ok(Value::String(n.to_string())),
            _ => Err(wrong()),
        },
        FieldKind::Integer => {
            let n = match raw {
                Value::Number(n) => n
                    .as_i64()
                    .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
                Value::String(s) => s.trim().parse::<i64>().ok(),
                _ => None,
            };
            n.map(Value::from).ok_or_else(wrong)
        }
        FieldKind::Decimal => {
            let n = match raw {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            };
            n.filter(|f| f.is_finite()).map(Value::from).ok_or_else(wrong)
        }
        FieldKind::Date => parse_date(raw)
            .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
            .ok_or_else(wrong),
        FieldKind::Select => {
            let s = match raw {
                Value::String(s) => s.trim().to_string(),
                Value::Number(n) => n.to_string(),
                _ => return Err(wrong()),
            };
            field
                .options
                .iter()
                .find(|o| o.eq_ignore_ascii_case(&s))
                .map(|o| Value::String(o.clone()))
                .ok_or_else(|| Issue::NotAnOption(field.options.clone()))
        }
        FieldKind::Boolean => match raw {
            Value::Bool(b) => Ok(Value::Bool(*b)),
            Value::String(s) => match s.trim().to_lowercase().as_str() {
                "true" | "yes" | "y" | "1" => Ok(Value::Bool(true)),
                "false" | "no" | "n" | "0" => Ok(Value::Bool(false)),
                _ => Err(wrong()),
            },
            _ => Err(wrong()),
        },
    }
}

fn check_rules(field: &FieldSpec, value: Value) -> Result<Value, Issue> {
    for rule in field.rules.iter() {
        match rule {
            Rule::Min(min) => {
                if value.as_f64().is_some_and(|v| v < min) {
                    return Err(Issue::BelowMin(min));
                }
            }
            Rule::Max(max) => {
                if value.as_f64().is_some_and(|v| v > max) {
                    return Err(Issue::AboveMax(max));
                }
            }
            Rule::MaxLength(max) => {
                if value.as_str().is_some_and(|s| s.chars().count() > max) {
                    return Err(Issue::TooLong(max));
                }
            }
        }
    }
    Ok(value)
}

/// Span of `key:` or `"key":` in YAML or JSON text
fn find_key_span(content: &str, key: &str) -> Option<SourceSpan> {
    let patterns = [format!("{}:", key), format!("\"{}\":", key)];

    let mut offset = 0;
    for line in content.lines() {
        let trimmed = line.trim_start();
        let indent = line.len() - trimmed.len();
        for pattern in &patterns {
            if let Some(pos) = trimmed.find(pattern.as_str()) {
                let at_start = pos == 0;
                let after_brace = trimmed[..pos].trim_end().ends_with(['{', ',']);
                if at_start || after_brace {
                    return Some((offset + indent + pos, pattern.len() - 1).into());
                }
            }
        }
        offset += line.len() + 1;
    }
    None
}

fn first_line(content: &str) -> SourceSpan {
    let len = content.find('\n').unwrap_or(content.len()).max(1);
    (0, len).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forms::schema::{Derivation, Rules};
    use serde_json::json;

    fn field(name: &str, kind: FieldKind) -> FieldSpec {
        FieldSpec {
            name: name.to_string(),
            label: None,
            kind,
            options: Vec::new(),
            required: false,
            read_only: false,
            rules: Rules::default(),
            derive: None,
            default: None,
            help: None,
        }
    }

    fn forging() -> FormSchema {
        let mut batch = field("batch_number", FieldKind::Text);
        batch.required = true;
        let mut date = field("date", FieldKind::Date);
        date.required = true;
        let mut shift = field("shift", FieldKind::Select);
        shift.options = vec!["A".into(), "B".into(), "C".into()];
        let mut production = field("production", FieldKind::Integer);
        production.required = true;
        production.rules.min = Some(1.0);
        let mut slug = field("slug_weight", FieldKind::Decimal);
        slug.required = true;
        let mut weight = field("weight", FieldKind::Decimal);
        weight.read_only = true;
        weight.required = true;
        weight.derive = Some(Derivation::Product {
            of: vec!["slug_weight".into(), "production".into()],
            factor: 1.03,
            round: Some(3),
        });
        let mut remarks = field("remarks", FieldKind::Text);
        remarks.rules.max_length = Some(10);

        FormSchema {
            name: "forging".into(),
            title: "Forging".into(),
            endpoint: "api/forging/".into(),
            stage: None,
            description: None,
            fields: vec![batch, date, shift, production, slug, weight, remarks],
        }
    }

    fn values(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_valid_forging_entry() {
        let payload = validate(
            &forging(),
            &values(json!({
                "batch_number": " B-101 ",
                "date": "05/01/2024",
                "shift": "b",
                "production": "100",
                "slug_weight": 2.5
            })),
        )
        .unwrap();

        assert_eq!(payload.get("batch_number"), Some(&json!("B-101")));
        assert_eq!(payload.get("date"), Some(&json!("2024-01-05")));
        assert_eq!(payload.get("shift"), Some(&json!("B")));
        assert_eq!(payload.get("production"), Some(&json!(100)));
        assert_eq!(payload.get("weight"), Some(&json!(257.5)));
        assert!(payload.get("remarks").is_none());
    }

    #[test]
    fn test_missing_and_unknown() {
        let errs = validate(&forging(), &values(json!({"batch_number": "B1", "colour": "red"})))
            .unwrap_err();
        assert!(errs.contains(&Violation::new("colour", Issue::Unknown)));
        assert!(errs.contains(&Violation::new("date", Issue::Missing)));
        assert!(errs.contains(&Violation::new("production", Issue::Missing)));
        // Inputs of 'weight' are missing and already reported
        assert!(!errs.iter().any(|v| v.field == "weight"));
    }

    #[test]
    fn test_read_only_rejected() {
        let errs = validate(
            &forging(),
            &values(json!({
                "batch_number": "B1", "date": "2024-01-05", "production": 1,
                "slug_weight": 1.0, "weight": 999
            })),
        )
        .unwrap_err();
        assert_eq!(errs, vec![Violation::new("weight", Issue::ReadOnly)]);
    }

    #[test]
    fn test_rules_and_types() {
        let errs = validate(
            &forging(),
            &values(json!({
                "batch_number": "B1", "date": "not a date", "production": 0,
                "slug_weight": "heavy", "shift": "D", "remarks": "far too long remark"
            })),
        )
        .unwrap_err();
        let issues: Vec<_> = errs.iter().map(|v| (v.field.as_str(), v.hint())).collect();
        assert!(issues.contains(&("date", "wrong type")));
        assert!(issues.contains(&("production", "too small")));
        assert!(issues.contains(&("slug_weight", "wrong type")));
        assert!(issues.contains(&("shift", "invalid value")));
        assert!(issues.contains(&("remarks", "too long")));
    }

    #[test]
    fn test_blank_counts_as_missing_and_default_applies() {
        let mut schema = forging();
        schema.fields[2].default = Some(json!("A"));
        let payload = validate(
            &schema,
            &values(json!({
                "batch_number": "B1", "date": "2024-01-05", "production": 2,
                "slug_weight": 1.0, "remarks": "  "
            })),
        )
        .unwrap();
        assert_eq!(payload.get("shift"), Some(&json!("A")));
        assert!(payload.get("remarks").is_none());
    }

    #[test]
    fn test_form_error_labels_key() {
        let source = "batch_number: B1\nweight: 10\n";
        let violations = vec![Violation::new("weight", Issue::ReadOnly)];
        let err = FormError::new("forging", "in.yaml", source, &violations);
        assert_eq!(err.violation_count(), 1);
        let span = err.violations[0].span;
        assert_eq!(span.offset(), 17);
        assert_eq!(span.len(), "weight".len());
    }

    #[test]
    fn test_find_key_span_json() {
        let source = "{\n  \"production\": 5,\n  \"weight\": 1\n}";
        let span = find_key_span(source, "weight").unwrap();
        assert_eq!(&source[span.offset()..span.offset() + span.len()], "\"weight\"");
        assert!(find_key_span(source, "shift").is_none());
    }

    #[test]
    fn test_read_values() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("in.yaml");
        std::fs::write(&path, "batch_number: B1\nproduction: 3\n").unwrap();
        let (map, source) = read_values(&path).unwrap();
        assert_eq!(map.len(), 2);
        assert!(source.contains("production"));

        std::fs::write(&path, "- 1\n- 2\n").unwrap();
        assert!(read_values(&path).is_err());
    }
}
