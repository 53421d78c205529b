//! Project discovery and structure

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the per-project state directory
pub const PROJECT_DIR: &str = ".mft";

/// A directory tree holding an `.mft/` state directory
#[derive(Debug, Clone)]
pub struct Project {
    /// Root directory of the project (parent of .mft/)
    root: PathBuf,
}

impl Project {
    /// Find project root by walking up from the current directory
    pub fn discover() -> Result<Self, ProjectError> {
        let current = std::env::current_dir().map_err(|e| ProjectError::IoError(e.to_string()))?;
        Self::discover_from(&current)
    }

    /// Find project root by walking up from the given directory
    pub fn discover_from(start: &Path) -> Result<Self, ProjectError> {
        let mut current = start
            .canonicalize()
            .map_err(|e| ProjectError::IoError(e.to_string()))?;

        loop {
            if current.join(PROJECT_DIR).is_dir() {
                return Ok(Self { root: current });
            }

            if !current.pop() {
                return Err(ProjectError::NotFound {
                    searched_from: start.to_path_buf(),
                });
            }
        }
    }

    /// Use `--project` when given, otherwise discover from the current directory
    pub fn resolve(explicit: Option<&Path>) -> Result<Self, ProjectError> {
        match explicit {
            Some(path) => Self::discover_from(path),
            None => Self::discover(),
        }
    }

    /// Create a new project structure at the given path
    pub fn init(path: &Path) -> Result<Self, ProjectError> {
        let root = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());

        if root.join(PROJECT_DIR).exists() {
            return Err(ProjectError::AlreadyExists(root));
        }

        Self::create_layout(&root)?;
        Ok(Self { root })
    }

    /// Force initialization even if .mft/ exists
    ///
    /// Rewrites the default config; the snapshot and form overrides are kept.
    pub fn init_force(path: &Path) -> Result<Self, ProjectError> {
        let root = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        Self::create_layout(&root)?;
        Ok(Self { root })
    }

    fn create_layout(root: &Path) -> Result<(), ProjectError> {
        let dir = root.join(PROJECT_DIR);
        for sub in ["data", "forms"] {
            std::fs::create_dir_all(dir.join(sub))
                .map_err(|e| ProjectError::IoError(e.to_string()))?;
        }
        std::fs::write(dir.join("config.yaml"), Self::default_config())
            .map_err(|e| ProjectError::IoError(e.to_string()))?;
        std::fs::write(dir.join(".gitignore"), "session.yaml\n")
            .map_err(|e| ProjectError::IoError(e.to_string()))?;
        Ok(())
    }

    fn default_config() -> &'static str {
        r#"# mft project configuration

# Base URL of the ERP REST API
# api_url: "https://erp.example.com/"

# Request timeout in seconds
# timeout_secs: 30

# Default output format (auto, tsv, json, yaml, csv, md, id)
# default_format: auto

# Stage records whose batch is unknown: drop or create
# orphans: drop

# Stages a batch must pass through, in order
# pipeline: [material_issued, forging, heat_treatment, pre_machining,
#            cnc_machining, marking, visual_inspection, final_inspection, dispatch]

# Monthly line capacity in kg. Lines not listed use the fallback.
# capacity:
#   fallback: 1000
#   lines:
#     "1600T": 120000

# Endpoint paths relative to api_url
# endpoints:
#   forging: "api/forging/"
"#
    }

    /// Get the project root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the .mft state directory
    pub fn mft_dir(&self) -> PathBuf {
        self.root.join(PROJECT_DIR)
    }

    pub fn config_path(&self) -> PathBuf {
        self.mft_dir().join("config.yaml")
    }

    /// Directory holding the fetched API snapshot
    pub fn data_dir(&self) -> PathBuf {
        self.mft_dir().join("data")
    }

    /// Directory holding project form schema overrides
    pub fn forms_dir(&self) -> PathBuf {
        self.mft_dir().join("forms")
    }

    pub fn session_path(&self) -> PathBuf {
        self.mft_dir().join("session.yaml")
    }
}

/// Errors related to project operations
#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("not an mft project (or any parent): {searched_from}\nRun 'mft init' to create one")]
    NotFound { searched_from: PathBuf },

    #[error("mft project already exists at {0}")]
    AlreadyExists(PathBuf),

    #[error("IO error: {0}")]
    IoError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_project_init() {
        let tmp = tempdir().unwrap();
        let project = Project::init(tmp.path()).unwrap();

        assert!(project.mft_dir().exists());
        assert!(project.config_path().exists());
        assert!(project.data_dir().is_dir());
        assert!(project.forms_dir().is_dir());
    }

    #[test]
    fn test_project_discover() {
        let tmp = tempdir().unwrap();
        Project::init(tmp.path()).unwrap();

        let subdir = tmp.path().join("reports/2024");
        std::fs::create_dir_all(&subdir).unwrap();

        let project = Project::discover_from(&subdir).unwrap();
        assert_eq!(project.root(), tmp.path().canonicalize().unwrap());
    }

    #[test]
    fn test_project_not_found() {
        let tmp = tempdir().unwrap();
        let result = Project::discover_from(tmp.path());
        assert!(matches!(result, Err(ProjectError::NotFound { .. })));
    }

    #[test]
    fn test_project_already_exists() {
        let tmp = tempdir().unwrap();
        Project::init(tmp.path()).unwrap();
        assert!(matches!(
            Project::init(tmp.path()),
            Err(ProjectError::AlreadyExists(_))
        ));
        assert!(Project::init_force(tmp.path()).is_ok());
    }
}
