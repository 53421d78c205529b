//! Parsing of YAML / JSON input files with located diagnostics

pub mod diagnostics;

use miette::{IntoDiagnostic, Result};
use serde::de::DeserializeOwned;
use std::path::Path;

pub use diagnostics::SyntaxError;

/// Parse a YAML or JSON file by extension (`.json` is JSON, everything else YAML)
pub fn parse_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .into_diagnostic()
        .map_err(|e| e.wrap_err(format!("failed to read {}", path.display())))?;
    parse_str(&content, path)
}

/// Parse already-loaded content; `path` picks the format and names the source
pub fn parse_str<T: DeserializeOwned>(content: &str, path: &Path) -> Result<T> {
    let filename = path.display().to_string();
    if path.extension().is_some_and(|e| e.eq_ignore_ascii_case("json")) {
        serde_json::from_str(content)
            .map_err(|e| SyntaxError::from_json_error(&e, content, &filename).into())
    } else {
        serde_yml::from_str(content)
            .map_err(|e| SyntaxError::from_yaml_error(&e, content, &filename).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    #[test]
    fn test_parse_by_extension() {
        let tmp = tempdir().unwrap();
        let yaml = tmp.path().join("a.yaml");
        let json = tmp.path().join("a.json");
        std::fs::write(&yaml, "pieces: 10\n").unwrap();
        std::fs::write(&json, r#"{"pieces": 10}"#).unwrap();

        let a: BTreeMap<String, u32> = parse_file(&yaml).unwrap();
        let b: BTreeMap<String, u32> = parse_file(&json).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_parse_error_is_reported() {
        let result: Result<BTreeMap<String, u32>> = parse_str("pieces: [", Path::new("x.yaml"));
        assert!(result.is_err());
        let result: Result<BTreeMap<String, u32>> = parse_str("{", Path::new("x.json"));
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_file() {
        let result: Result<BTreeMap<String, u32>> =
            parse_file(Path::new("/definitely/not/here.yaml"));
        assert!(result.is_err());
    }
}
