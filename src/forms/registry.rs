//! Form schema registry
//!
//! Built-in schemas are embedded from `forms/` at compile time. A project can
//! add forms or replace built-in ones by dropping `<name>.yaml` files into
//! `.mft/forms/`.

use miette::Diagnostic;
use rust_embed::Embed;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

use crate::forms::schema::FormSchema;
use crate::parse::diagnostics::SyntaxError;

#[derive(Embed)]
#[folder = "forms/"]
struct BuiltinForms;

/// Where a schema was loaded from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormOrigin {
    Builtin,
    Project(PathBuf),
}

impl fmt::Display for FormOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormOrigin::Builtin => write!(f, "built-in"),
            FormOrigin::Project(path) => write!(f, "{}", path.display()),
        }
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum RegistryError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Syntax(#[from] SyntaxError),

    #[error("form schema '{name}' is inconsistent: {}", problems.join("; "))]
    #[diagnostic(code(mft::form::schema))]
    Inconsistent { name: String, problems: Vec<String> },

    #[error("failed to read {path}: {message}")]
    #[diagnostic(code(mft::form::io))]
    Io { path: PathBuf, message: String },

    #[error("unknown form '{name}'")]
    #[diagnostic(code(mft::form::unknown), help("Available forms: {available}"))]
    Unknown { name: String, available: String },
}

/// All known form schemas, by name
#[derive(Debug, Clone, Default)]
pub struct FormRegistry {
    forms: BTreeMap<String, (FormSchema, FormOrigin)>,
}

impl FormRegistry {
    /// Built-in schemas only
    pub fn builtin() -> Result<Self, RegistryError> {
        let mut registry = Self::default();
        for file in BuiltinForms::iter() {
            let filename = file.as_ref();
            let Some(content) = BuiltinForms::get(filename) else {
                continue;
            };
            let text = String::from_utf8_lossy(&content.data);
            let schema = parse_schema(&text, filename)?;
            registry.insert(schema, FormOrigin::Builtin);
        }
        Ok(registry)
    }

    /// Built-in schemas overlaid with every `*.yaml` file in `dir`
    pub fn with_overrides(dir: &Path) -> Result<Self, RegistryError> {
        let mut registry = Self::builtin()?;
        if !dir.is_dir() {
            return Ok(registry);
        }

        let mut paths: Vec<PathBuf> = WalkDir::new(dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| {
                p.extension()
                    .is_some_and(|ext| ext == "yaml" || ext == "yml")
            })
            .collect();
        paths.sort();

        for path in paths {
            let text = std::fs::read_to_string(&path).map_err(|e| RegistryError::Io {
                path: path.clone(),
                message: e.to_string(),
            })?;
            let schema = parse_schema(&text, &path.display().to_string())?;
            debug!(form = %schema.name, path = %path.display(), "project form schema");
            registry.insert(schema, FormOrigin::Project(path));
        }
        Ok(registry)
    }

    fn insert(&mut self, schema: FormSchema, origin: FormOrigin) {
        self.forms.insert(schema.name.clone(), (schema, origin));
    }

    pub fn get(&self, name: &str) -> Result<&FormSchema, RegistryError> {
        self.forms
            .get(name)
            .map(|(schema, _)| schema)
            .ok_or_else(|| RegistryError::Unknown {
                name: name.to_string(),
                available: self.names().join(", "),
            })
    }

    pub fn origin(&self, name: &str) -> Option<&FormOrigin> {
        self.forms.get(name).map(|(_, origin)| origin)
    }

    pub fn names(&self) -> Vec<&str> {
        self.forms.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FormSchema, &FormOrigin)> {
        self.forms.values().map(|(schema, origin)| (schema, origin))
    }

    pub fn len(&self) -> usize {
        self.forms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forms.is_empty()
    }
}

fn parse_schema(text: &str, filename: &str) -> Result<FormSchema, RegistryError> {
    let schema: FormSchema = serde_yml::from_str(text)
        .map_err(|e| SyntaxError::from_yaml_error(&e, text, filename))?;
    let problems = schema.check();
    if !problems.is_empty() {
        return Err(RegistryError::Inconsistent {
            name: schema.name,
            problems,
        });
    }
    Ok(schema)
}
