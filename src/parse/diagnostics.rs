//! YAML / JSON syntax errors with source locations

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// Syntax error in a YAML or JSON document, pointing at the offending spot
#[derive(Debug, Error, Diagnostic)]
#[error("{format} syntax error: {message}")]
#[diagnostic(code(mft::parse::syntax))]
pub struct SyntaxError {
    #[source_code]
    src: NamedSource<String>,

    #[label("error here")]
    span: SourceSpan,

    #[help]
    help: Option<String>,

    format: &'static str,

    /// The underlying error message
    message: String,
}

impl SyntaxError {
    /// Create a syntax error from a serde_yml error
    pub fn from_yaml_error(err: &serde_yml::Error, source: &str, filename: &str) -> Self {
        let (line, column) = err
            .location()
            .map(|loc| (loc.line(), loc.column()))
            .unwrap_or((1, 1));
        let message = err.to_string();
        let help = generate_help(&message);
        Self::at_location("YAML", message, source, filename, line, column, help)
    }

    /// Create a syntax error from a serde_json error
    pub fn from_json_error(err: &serde_json::Error, source: &str, filename: &str) -> Self {
        let message = err.to_string();
        let help = if err.is_eof() {
            Some("The document ends early; check for a missing ']' or '}'".to_string())
        } else {
            None
        };
        Self::at_location(
            "JSON",
            message,
            source,
            filename,
            err.line().max(1),
            err.column().max(1),
            help,
        )
    }

    /// Create a syntax error at a specific location (1-based line and column)
    pub fn at_location(
        format: &'static str,
        message: impl Into<String>,
        source: &str,
        filename: &str,
        line: usize,
        column: usize,
        help: Option<String>,
    ) -> Self {
        let offset = line_col_to_offset(source, line, column);

        Self {
            src: NamedSource::new(filename, source.to_string()),
            span: SourceSpan::from(offset..offset.saturating_add(1)),
            help,
            format,
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Byte offset of a 1-based line/column, clamped to the end of the source
pub(crate) fn line_col_to_offset(source: &str, line: usize, column: usize) -> usize {
    let line_start: usize = source
        .split_inclusive('\n')
        .take(line.saturating_sub(1))
        .map(str::len)
        .sum();
    if line_start >= source.len() {
        return source.len().saturating_sub(1);
    }

    let rest = &source[line_start..];
    let line_len = rest.find('\n').unwrap_or(rest.len());
    rest[..line_len]
        .char_indices()
        .nth(column.saturating_sub(1))
        .map_or(line_start + line_len, |(i, _)| line_start + i)
}

/// Fragments of parser messages and what to tell the user about them
const HINTS: &[(&str, &str)] = &[
    ("tab", "Indent with spaces; YAML does not allow tabs"),
    ("duplicate key", "A field appears twice in the same entry"),
    ("expected block end", "Indentation is inconsistent around this line"),
    (
        "mapping values are not allowed",
        "Put a space after ':' or quote values that contain ':'",
    ),
    (
        "unknown variant",
        "Value is not one of the allowed options for this key",
    ),
    (
        "invalid type",
        "Quote batch numbers and dates so they stay text",
    ),
];

fn generate_help(message: &str) -> Option<String> {
    let lower = message.to_lowercase();
    HINTS
        .iter()
        .find(|(needle, _)| lower.contains(needle))
        .map(|(_, hint)| hint.to_string())
}
