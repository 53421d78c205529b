//! Schema-driven interactive form filling
//!
//! Walks the editable fields of any [`FormSchema`] and prompts for each one.
//! Values are collected raw; [`crate::forms::validate`] does the checking.

use console::style;
use dialoguer::{theme::ColorfulTheme, Input, Select};
use miette::{IntoDiagnostic, Result};
use serde_json::{Map, Value};

use crate::forms::schema::{FieldKind, FieldSpec, FormSchema};

/// Interactive prompter for one form
pub struct FormWizard<'a> {
    schema: &'a FormSchema,
    theme: ColorfulTheme,
}

impl<'a> FormWizard<'a> {
    pub fn new(schema: &'a FormSchema) -> Self {
        Self {
            schema,
            theme: ColorfulTheme::default(),
        }
    }

    /// Prompt for every editable field, seeding prompts with `prefill`
    pub fn run(&self, prefill: &Map<String, Value>) -> Result<Map<String, Value>> {
        println!();
        println!(
            "{} {}",
            style("◆").cyan(),
            style(&self.schema.title).bold()
        );
        println!("{}", style("─".repeat(50)).dim());
        println!();

        let mut values = Map::new();
        for field in self.schema.editable_fields() {
            let seed = prefill.get(&field.name).or(field.default.as_ref());
            if let Some(v) = self.prompt_field(field, seed)? {
                values.insert(field.name.clone(), v);
            }
        }

        for field in self.schema.fields.iter().filter(|f| f.derive.is_some()) {
            if let Some(derive) = &field.derive {
                println!(
                    "  {} {} = {}",
                    style("ƒ").dim(),
                    field.label(),
                    style(derive).dim()
                );
            }
        }

        println!();
        println!("{} Values collected!", style("✓").green());
        Ok(values)
    }

    fn prompt_field(&self, field: &FieldSpec, seed: Option<&Value>) -> Result<Option<Value>> {
        let prompt = format_prompt(field);

        match field.kind {
            FieldKind::Select => {
                let mut items: Vec<&str> = field.options.iter().map(String::as_str).collect();
                if !field.required {
                    items.push("(none)");
                }
                let default_idx = seed
                    .and_then(Value::as_str)
                    .and_then(|d| field.options.iter().position(|o| o.eq_ignore_ascii_case(d)))
                    .unwrap_or(0);

                let selection = Select::with_theme(&self.theme)
                    .with_prompt(&prompt)
                    .items(&items)
                    .default(default_idx)
                    .interact()
                    .into_diagnostic()?;

                Ok(field
                    .options
                    .get(selection)
                    .map(|o| Value::String(o.clone())))
            }

            FieldKind::Boolean => {
                let default_val = seed.and_then(Value::as_bool).unwrap_or(false);
                let items = &["Yes", "No"];
                let default_idx = if default_val { 0 } else { 1 };

                let selection = Select::with_theme(&self.theme)
                    .with_prompt(&prompt)
                    .items(items)
                    .default(default_idx)
                    .interact()
                    .into_diagnostic()?;

                Ok(Some(Value::Bool(selection == 0)))
            }

            FieldKind::Text
            | FieldKind::Integer
            | FieldKind::Decimal
            | FieldKind::Date => {
                let default_str = seed.map(value_to_text).unwrap_or_default();

                let mut input = Input::<String>::with_theme(&self.theme)
                    .with_prompt(&prompt)
                    .allow_empty(!field.required);
                if !default_str.is_empty() {
                    input = input.default(default_str);
                }
                let value = input.interact_text().into_diagnostic()?;

                if value.trim().is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(Value::String(value)))
                }
            }
        }
    }
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Format the prompt for a field
fn format_prompt(field: &FieldSpec) -> String {
    let mut prompt = field.label();
    match field.kind {
        FieldKind::Date => prompt.push_str(" (YYYY-MM-DD)"),
        FieldKind::Integer | FieldKind::Decimal => {
            let bounds = field
                .rules
                .iter()
                .map(|r| r.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            if !bounds.is_empty() {
                prompt.push_str(&format!(" [{}]", bounds));
            }
        }
        _ => {}
    }
    if let Some(help) = &field.help {
        let short = if help.chars().count() > 50 {
            format!("{}...", help.chars().take(47).collect::<String>())
        } else {
            help.clone()
        };
        prompt = format!("{} ({})", prompt, style(short).dim());
    }
    prompt
}

/// Plain-text description of a schema, one line per field
pub fn describe(schema: &FormSchema) -> String {
    let mut out = String::new();
    out.push_str(&format!("{} ({})\n", schema.title, schema.name));
    out.push_str(&format!("endpoint: {}\n", schema.endpoint));
    if let Some(stage) = schema.stage {
        out.push_str(&format!("stage: {}\n", stage));
    }
    if let Some(desc) = &schema.description {
        out.push_str(&format!("{}\n", desc));
    }
    out.push('\n');

    for field in &schema.fields {
        let mut flags = Vec::new();
        if field.required {
            flags.push("required".to_string());
        }
        if !field.is_editable() {
            flags.push("read-only".to_string());
        }
        flags.extend(field.rules.iter().map(|r| r.to_string()));
        if !field.options.is_empty() {
            flags.push(format!("one of: {}", field.options.join("|")));
        }
        if let Some(derive) = &field.derive {
            flags.push(format!("= {}", derive));
        }
        if let Some(default) = &field.default {
            flags.push(format!("default {}", value_to_text(default)));
        }

        out.push_str(&format!("  {:<20} {:<8}", field.name, field.kind.as_str()));
        if !flags.is_empty() {
            out.push_str(&format!(" {}", flags.join(", ")));
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forms::FormRegistry;

    #[test]
    fn test_describe_forging() {
        let registry = FormRegistry::builtin().unwrap();
        let text = describe(registry.get("forging").unwrap());
        assert!(text.starts_with("Forging production (forging)"));
        assert!(text.contains("endpoint: api/forging/"));
        assert!(text.contains("read-only"));
        assert!(text.contains("= slug_weight * production * 1.03"));
        assert!(text.contains("one of: A|B|C"));
    }

    #[test]
    fn test_prompt_mentions_bounds_and_format() {
        let registry = FormRegistry::builtin().unwrap();
        let schema = registry.get("forging").unwrap();
        assert!(format_prompt(schema.field("date").unwrap()).contains("YYYY-MM-DD"));
        assert!(format_prompt(schema.field("production").unwrap()).contains(">= 0"));
    }
}
