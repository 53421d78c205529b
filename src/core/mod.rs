//! Core module - project layout, configuration, API access and normalization

pub mod client;
pub mod config;
pub mod normalize;
pub mod project;
pub mod session;
pub mod snapshot;
pub mod stage;

pub use client::{ApiClient, ApiError};
pub use config::{Config, ConfigError};
pub use normalize::{Normalized, NormalizeError};
pub use project::{Project, ProjectError};
pub use session::{Session, SessionError};
pub use snapshot::{DataSource, Dataset, Manifest, Snapshot, SourceError};
pub use stage::{Pipeline, Stage};
