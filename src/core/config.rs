//! Configuration management with layered hierarchy

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use crate::analysis::{CapacityTable, OrphanPolicy};
use crate::core::stage::{Pipeline, Stage};
use crate::core::Project;

/// Default request timeout
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Capacity settings as written in config files (merged per line)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapacityConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<f64>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub lines: BTreeMap<String, f64>,
}

/// mft configuration with layered hierarchy
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the ERP REST API
    pub api_url: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: Option<u64>,

    /// Default output format
    pub default_format: Option<String>,

    /// Handling of stage records with unknown batch keys
    pub orphans: Option<OrphanPolicy>,

    /// Stages a batch must pass through
    pub pipeline: Option<Pipeline>,

    /// Line capacities
    pub capacity: CapacityConfig,

    /// Endpoint path overrides, keyed by resource name
    pub endpoints: BTreeMap<String, String>,
}

/// Configuration that parsed but does not make sense
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("invalid capacity configuration: {0}")]
    #[diagnostic(
        code(mft::config::capacity),
        help("Capacities are monthly weights in kg and must be greater than zero")
    )]
    Capacity(String),

    #[error("no API URL configured")]
    #[diagnostic(
        code(mft::config::api_url),
        help("Set one with `mft config set api_url https://erp.example.com/` or MFT_API_URL")
    )]
    MissingApiUrl,

    #[error("unknown endpoint resource '{0}'")]
    #[diagnostic(
        code(mft::config::endpoint),
        help("Valid resources: batches, schedule, or a stage name such as forging")
    )]
    UnknownResource(String),
}

impl Config {
    /// Load configuration from all sources, merging in priority order
    pub fn load() -> Self {
        Self::load_for(Project::discover().ok().as_ref())
    }

    /// Load configuration for a specific project
    pub fn load_for(project: Option<&Project>) -> Self {
        let mut config = Config::default();

        // 1. Built-in defaults (already in Default impl)

        // 2. Global user config (~/.config/mft/config.yaml)
        if let Some(global_path) = Self::global_config_path() {
            if let Some(global) = Self::read_file(&global_path) {
                config.merge(global);
            }
        }

        // 3. Project config (.mft/config.yaml)
        if let Some(project) = project {
            if let Some(project_config) = Self::read_file(&project.config_path()) {
                config.merge(project_config);
            }
        }

        // 4. Environment variables
        if let Ok(url) = std::env::var("MFT_API_URL") {
            config.api_url = Some(url);
        }
        if let Ok(timeout) = std::env::var("MFT_TIMEOUT") {
            match timeout.parse() {
                Ok(secs) => config.timeout_secs = Some(secs),
                Err(_) => warn!(value = %timeout, "ignoring non-numeric MFT_TIMEOUT"),
            }
        }

        config
    }

    fn read_file(path: &Path) -> Option<Config> {
        if !path.exists() {
            return None;
        }
        let contents = std::fs::read_to_string(path).ok()?;
        if contents.trim().is_empty() {
            return None;
        }
        match serde_yml::from_str::<Config>(&contents) {
            Ok(config) => {
                debug!(path = %path.display(), "loaded config");
                Some(config)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unreadable config file");
                None
            }
        }
    }

    /// Get the path to the global config file
    ///
    /// `MFT_CONFIG_DIR` replaces the platform config directory.
    pub fn global_config_path() -> Option<PathBuf> {
        if let Ok(dir) = std::env::var("MFT_CONFIG_DIR") {
            return Some(PathBuf::from(dir).join("config.yaml"));
        }
        directories::ProjectDirs::from("", "", "mft")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Merge another config into this one (other takes precedence)
    fn merge(&mut self, other: Config) {
        if other.api_url.is_some() {
            self.api_url = other.api_url;
        }
        if other.timeout_secs.is_some() {
            self.timeout_secs = other.timeout_secs;
        }
        if other.default_format.is_some() {
            self.default_format = other.default_format;
        }
        if other.orphans.is_some() {
            self.orphans = other.orphans;
        }
        if other.pipeline.is_some() {
            self.pipeline = other.pipeline;
        }
        if other.capacity.fallback.is_some() {
            self.capacity.fallback = other.capacity.fallback;
        }
        self.capacity.lines.extend(other.capacity.lines);
        self.endpoints.extend(other.endpoints);
    }

    /// The API base URL, always ending in '/'
    pub fn api_url(&self) -> Result<String, ConfigError> {
        let url = self
            .api_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or(ConfigError::MissingApiUrl)?;
        if url.ends_with('/') {
            Ok(url.to_string())
        } else {
            Ok(format!("{}/", url))
        }
    }

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }

    pub fn orphan_policy(&self) -> OrphanPolicy {
        self.orphans.unwrap_or_default()
    }

    pub fn pipeline(&self) -> Pipeline {
        self.pipeline.clone().unwrap_or_default()
    }

    /// The single capacity table, validated
    pub fn capacity_table(&self) -> Result<CapacityTable, ConfigError> {
        let mut table = CapacityTable {
            lines: self.capacity.lines.clone(),
            ..CapacityTable::default()
        };
        if let Some(fallback) = self.capacity.fallback {
            table.fallback = fallback;
        }
        table.validate().map_err(ConfigError::Capacity)?;
        Ok(table)
    }

    /// Endpoint path for a resource (`batches`, `schedule` or a stage name)
    pub fn endpoint(&self, resource: &str) -> Result<String, ConfigError> {
        if let Some(path) = self.endpoints.get(resource) {
            return Ok(path.trim_start_matches('/').to_string());
        }
        default_endpoint(resource)
            .map(String::from)
            .ok_or_else(|| ConfigError::UnknownResource(resource.to_string()))
    }

    pub fn stage_endpoint(&self, stage: Stage) -> Result<String, ConfigError> {
        self.endpoint(stage.as_str())
    }
}

/// Built-in endpoint paths, relative to the API base URL
pub fn default_endpoint(resource: &str) -> Option<&'static str> {
    let path = match resource {
        "batches" => "api/raw_material/blockmt/",
        "schedule" => "api/schedule/",
        "material_issued" => "api/raw_material/issue/",
        "forging" => "api/forging/",
        "heat_treatment" => "api/heat_treatment/",
        "pre_machining" => "api/pre_machining/",
        "cnc_machining" => "api/cnc/",
        "marking" => "api/marking/",
        "visual_inspection" => "api/visual_inspection/",
        "final_inspection" => "api/final_inspection/",
        "dispatch" => "api/dispatch/",
        _ => return None,
    };
    Some(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_prefers_later_layer() {
        let mut base: Config = serde_yml::from_str(
            "api_url: http://a/\norphans: create\ncapacity:\n  fallback: 10\n  lines:\n    L1: 100\n    L2: 200\n",
        )
        .unwrap();
        let over: Config =
            serde_yml::from_str("api_url: http://b/\ncapacity:\n  lines:\n    L2: 250\n").unwrap();
        base.merge(over);

        assert_eq!(base.api_url.as_deref(), Some("http://b/"));
        assert_eq!(base.orphan_policy(), OrphanPolicy::Create);
        let table = base.capacity_table().unwrap();
        assert_eq!(table.fallback, 10.0);
        assert_eq!(table.lines.get("L1"), Some(&100.0));
        assert_eq!(table.lines.get("L2"), Some(&250.0));
    }

    #[test]
    fn test_api_url_gets_trailing_slash() {
        let config = Config {
            api_url: Some("https://erp.example.com".to_string()),
            ..Config::default()
        };
        assert_eq!(config.api_url().unwrap(), "https://erp.example.com/");
        assert!(matches!(Config::default().api_url(), Err(ConfigError::MissingApiUrl)));
    }

    #[test]
    fn test_invalid_capacity_is_rejected() {
        let config: Config = serde_yml::from_str("capacity:\n  fallback: 0\n").unwrap();
        assert!(matches!(config.capacity_table(), Err(ConfigError::Capacity(_))));
    }

    #[test]
    fn test_endpoints_default_and_override() {
        let mut config = Config::default();
        assert_eq!(config.stage_endpoint(Stage::Forging).unwrap(), "api/forging/");
        config
            .endpoints
            .insert("forging".to_string(), "/v2/forging/".to_string());
        assert_eq!(config.stage_endpoint(Stage::Forging).unwrap(), "v2/forging/");
        assert!(config.endpoint("painting").is_err());
    }

    #[test]
    fn test_every_stage_has_default_endpoint() {
        for stage in Stage::ALL {
            assert!(default_endpoint(stage.as_str()).is_some(), "{}", stage);
        }
    }

    #[test]
    fn test_pipeline_from_config() {
        let config: Config =
            serde_yml::from_str("pipeline: [material_issued, dispatch]\n").unwrap();
        assert_eq!(config.pipeline().len(), 2);
        assert_eq!(Config::default().pipeline().len(), Stage::ALL.len());
    }
}
