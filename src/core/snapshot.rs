//! Data sources: the live API or a snapshot of it on disk
//!
//! A snapshot is a directory of JSON files exactly as the API returned them:
//! `batches.json`, `schedule.json` and one `<stage>.json` per stage, plus a
//! `manifest.json` describing when and where it was fetched. Missing files
//! read as empty lists.
//!
//! A fetch writes into a staging directory next to the snapshot and swaps it
//! in only when done, so a snapshot never mixes files from two fetches.

use chrono::{DateTime, Utc};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use crate::analysis::{aggregate, OrphanPolicy, Traceability};
use crate::core::client::{extract_list, ApiClient, ApiError};
use crate::core::normalize::{
    normalize_batches, normalize_schedule, normalize_stage_records, NormalizeError,
};
use crate::core::stage::{Pipeline, Stage};
use crate::entities::{Batch, ScheduleLine, StageRecord};
use crate::parse::diagnostics::SyntaxError;

const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Error, Diagnostic)]
pub enum SourceError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Syntax(#[from] SyntaxError),

    #[error("{path}: {message}")]
    #[diagnostic(code(mft::snapshot::shape))]
    Shape { path: PathBuf, message: String },

    #[error("no snapshot at {0}")]
    #[diagnostic(
        code(mft::snapshot::missing),
        help("Run `mft fetch` to download one, or pass --data DIR")
    )]
    Missing(PathBuf),

    #[error("snapshot IO error at {path}: {message}")]
    #[diagnostic(code(mft::snapshot::io))]
    Io { path: PathBuf, message: String },
}

/// Somewhere raw ERP records can be read from
pub trait DataSource {
    fn batches(&self) -> Result<Vec<Value>, SourceError>;
    fn stage_records(&self, stage: Stage) -> Result<Vec<Value>, SourceError>;
    fn schedule(&self) -> Result<Vec<Value>, SourceError>;

    /// Resources known to be absent from this source
    fn gaps(&self) -> Vec<String> {
        Vec::new()
    }
}

impl DataSource for ApiClient {
    fn batches(&self) -> Result<Vec<Value>, SourceError> {
        Ok(self.fetch_batches(&[])?)
    }

    fn stage_records(&self, stage: Stage) -> Result<Vec<Value>, SourceError> {
        Ok(self.fetch_stage_records(stage, &[])?)
    }

    fn schedule(&self) -> Result<Vec<Value>, SourceError> {
        Ok(self.fetch_schedule(&[])?)
    }
}

/// Where and when a snapshot was taken
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub fetched_at: DateTime<Utc>,
    pub api_url: String,
    /// Record count per file stem
    pub counts: BTreeMap<String, usize>,
    /// Stems that failed to download and have no file
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed: Vec<String>,
}

/// A snapshot directory
#[derive(Debug, Clone)]
pub struct Snapshot {
    dir: PathBuf,
}

impl Snapshot {
    /// Open an existing snapshot directory
    pub fn open(dir: &Path) -> Result<Self, SourceError> {
        if !dir.is_dir() {
            return Err(SourceError::Missing(dir.to_path_buf()));
        }
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    /// Start a fresh snapshot in a staging directory beside `target`
    ///
    /// `target` is left untouched until [`Snapshot::commit`].
    pub fn stage(target: &Path) -> Result<Self, SourceError> {
        let dir = sibling(target, "partial");
        if dir.exists() {
            std::fs::remove_dir_all(&dir).map_err(|e| io_error(&dir, e))?;
        }
        std::fs::create_dir_all(&dir).map_err(|e| io_error(&dir, e))?;
        Ok(Self { dir })
    }

    /// Replace `target` with this staged snapshot
    ///
    /// The previous snapshot is restored if the swap fails.
    pub fn commit(self, target: &Path) -> Result<Snapshot, SourceError> {
        let backup = sibling(target, "old");
        if backup.exists() {
            std::fs::remove_dir_all(&backup).map_err(|e| io_error(&backup, e))?;
        }
        if target.exists() {
            std::fs::rename(target, &backup).map_err(|e| io_error(target, e))?;
        }
        if let Err(e) = std::fs::rename(&self.dir, target) {
            if backup.exists() {
                if let Err(restore) = std::fs::rename(&backup, target) {
                    warn!(path = %backup.display(), error = %restore, "could not restore snapshot");
                }
            }
            return Err(io_error(target, e));
        }
        if backup.exists() {
            if let Err(e) = std::fs::remove_dir_all(&backup) {
                warn!(path = %backup.display(), error = %e, "could not remove old snapshot");
            }
        }
        Ok(Snapshot {
            dir: target.to_path_buf(),
        })
    }

    /// Throw away a staged snapshot
    pub fn discard(self) {
        if let Err(e) = std::fs::remove_dir_all(&self.dir) {
            debug!(path = %self.dir.display(), error = %e, "could not remove staging directory");
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, stem: &str) -> PathBuf {
        self.dir.join(format!("{}.json", stem))
    }

    fn read_list(&self, stem: &str) -> Result<Vec<Value>, SourceError> {
        let path = self.path(stem);
        if !path.exists() {
            debug!(path = %path.display(), "snapshot file absent, treating as empty");
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&path).map_err(|e| SourceError::Io {
            path: path.clone(),
            message: e.to_string(),
        })?;
        let value: Value = serde_json::from_str(&content).map_err(|e| {
            SyntaxError::from_json_error(&e, &content, &path.display().to_string())
        })?;
        extract_list(value).map_err(|message| SourceError::Shape { path, message })
    }

    /// Write one resource's raw records
    pub fn write_list(&self, stem: &str, records: &[Value]) -> Result<(), SourceError> {
        let path = self.path(stem);
        let json = serde_json::to_string_pretty(records).map_err(|e| SourceError::Io {
            path: path.clone(),
            message: e.to_string(),
        })?;
        std::fs::write(&path, json).map_err(|e| SourceError::Io {
            path,
            message: e.to_string(),
        })
    }

    pub fn write_manifest(&self, manifest: &Manifest) -> Result<(), SourceError> {
        let path = self.dir.join(MANIFEST_FILE);
        let json = serde_json::to_string_pretty(manifest).map_err(|e| SourceError::Io {
            path: path.clone(),
            message: e.to_string(),
        })?;
        std::fs::write(&path, json).map_err(|e| SourceError::Io {
            path,
            message: e.to_string(),
        })
    }

    /// The manifest, if the snapshot was written by `mft fetch`
    pub fn manifest(&self) -> Option<Manifest> {
        let content = std::fs::read_to_string(self.dir.join(MANIFEST_FILE)).ok()?;
        serde_json::from_str(&content).ok()
    }
}

impl DataSource for Snapshot {
    fn batches(&self) -> Result<Vec<Value>, SourceError> {
        self.read_list("batches")
    }

    fn stage_records(&self, stage: Stage) -> Result<Vec<Value>, SourceError> {
        self.read_list(stage.as_str())
    }

    fn schedule(&self) -> Result<Vec<Value>, SourceError> {
        self.read_list("schedule")
    }

    fn gaps(&self) -> Vec<String> {
        self.manifest().map(|m| m.failed).unwrap_or_default()
    }
}

/// `<dir>.<suffix>` next to `dir`
fn sibling(dir: &Path, suffix: &str) -> PathBuf {
    let mut name = dir
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "data".into());
    name.push(".");
    name.push(suffix);
    dir.with_file_name(name)
}

fn io_error(path: &Path, err: std::io::Error) -> SourceError {
    SourceError::Io {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

/// Normalized data read from a source
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub batches: Vec<Batch>,
    pub records: Vec<StageRecord>,
    pub schedule: Vec<ScheduleLine>,
    /// Records that could not be normalized
    pub skipped: Vec<NormalizeError>,
    /// Resources the source is missing
    pub gaps: Vec<String>,
}

impl Dataset {
    /// Read and normalize batches plus every stage's records
    ///
    /// The schedule is only read when `with_schedule` is set.
    pub fn load(source: &dyn DataSource, with_schedule: bool) -> Result<Self, SourceError> {
        let mut data = Dataset {
            gaps: source.gaps(),
            ..Dataset::default()
        };

        let batches = normalize_batches(&source.batches()?);
        data.batches = batches.items;
        data.skipped.extend(batches.skipped);

        for stage in Stage::ALL {
            let records = normalize_stage_records(stage, &source.stage_records(stage)?);
            data.records.extend(records.items);
            data.skipped.extend(records.skipped);
        }

        if with_schedule {
            let schedule = normalize_schedule(&source.schedule()?);
            data.schedule = schedule.items;
            data.skipped.extend(schedule.skipped);
        }

        for skipped in &data.skipped {
            warn!("{}", skipped);
        }
        for gap in &data.gaps {
            warn!(resource = %gap, "snapshot has no data for a resource that failed to download");
        }
        debug!(
            batches = data.batches.len(),
            records = data.records.len(),
            schedule = data.schedule.len(),
            skipped = data.skipped.len(),
            "dataset loaded"
        );

        Ok(data)
    }

    /// Aggregate into per-batch timelines
    pub fn trace(&self, pipeline: &Pipeline, policy: OrphanPolicy) -> Traceability {
        aggregate(
            self.batches.iter().cloned(),
            self.records.iter().cloned(),
            pipeline,
            policy,
        )
    }
}
