//! Configuration loading and types for metasync.
//!
//! Configuration is read from a YAML file and deserialized into the
//! [`Config`] struct.  Each subsection governs a different part of the
//! system: logging, the metadata document store, synchronization limits,
//! observability, and the list of storage backends to mirror.

use serde::Deserialize;
use std::path::Path;

use crate::metadata::model::BackendIdentity;

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Metadata store settings.
    #[serde(default)]
    pub metadata: MetadataConfig,

    /// Synchronization settings.
    #[serde(default)]
    pub sync: SyncConfig,

    /// Observability settings.
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Storage backends whose metadata is mirrored.
    #[serde(default)]
    pub backends: Vec<BackendConfig>,
}

impl Config {
    /// Look up a configured backend by id.
    pub fn backend(&self, id: &str) -> Option<&BackendConfig> {
        self.backends.iter().find(|b| b.id == id)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: text or json.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Observability settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// Enable Prometheus metrics collection.
    #[serde(default = "default_true")]
    pub metrics: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self { metrics: true }
    }
}

/// Metadata store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetadataConfig {
    /// Backend type: `sqlite` or `memory`.
    #[serde(default = "default_metadata_engine")]
    pub engine: String,

    /// SQLite-specific configuration.
    #[serde(default)]
    pub sqlite: SqliteConfig,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            engine: default_metadata_engine(),
            sqlite: SqliteConfig::default(),
        }
    }
}

/// SQLite-specific metadata configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_metadata_path")]
    pub path: String,

    /// Table holding one document per backend.
    #[serde(default = "default_collection")]
    pub collection: String,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: default_metadata_path(),
            collection: default_collection(),
        }
    }
}

/// Limits applied to a single synchronization cycle.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Maximum bucket tasks running at once (0 = unbounded).
    #[serde(default = "default_max_concurrent_buckets")]
    pub max_concurrent_buckets: usize,

    /// Deadline for one backend's full cycle in seconds (0 = none).
    #[serde(default)]
    pub timeout_seconds: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_concurrent_buckets: default_max_concurrent_buckets(),
            timeout_seconds: 0,
        }
    }
}

/// One storage backend to mirror.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// Unique backend id; the key of the stored aggregate.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Backend type (e.g. `aws-s3`).
    #[serde(rename = "type", default = "default_backend_type")]
    pub backend_type: String,
    /// Default session region.
    #[serde(default = "default_region")]
    pub region: String,
    /// Tenant owning this backend.
    #[serde(default)]
    pub tenant_id: String,
    /// Custom S3-compatible endpoint (e.g. MinIO, LocalStack).
    #[serde(default)]
    pub endpoint_url: String,
    /// Force path-style URL addressing.
    #[serde(default)]
    pub use_path_style: bool,
    /// Explicit access key (falls back to env/credential chain).
    #[serde(default)]
    pub access_key_id: String,
    /// Explicit secret key (falls back to env/credential chain).
    #[serde(default)]
    pub secret_access_key: String,
}

impl BackendConfig {
    /// The identity fields copied into every aggregate for this backend.
    pub fn identity(&self) -> BackendIdentity {
        BackendIdentity {
            id: self.id.clone(),
            name: self.name.clone(),
            backend_type: self.backend_type.clone(),
            region: self.region.clone(),
            tenant_id: self.tenant_id.clone(),
        }
    }
}

// -- Defaults ----------------------------------------------------------------

fn default_true() -> bool {
    true
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_backend_type() -> String {
    "aws-s3".to_string()
}

fn default_metadata_engine() -> String {
    "sqlite".to_string()
}

fn default_metadata_path() -> String {
    "./data/metadata.db".to_string()
}

fn default_collection() -> String {
    "metadatabucket".to_string()
}

fn default_max_concurrent_buckets() -> usize {
    16
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

// -- Loader ------------------------------------------------------------------

/// Load and parse configuration from a YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    let config: Config = serde_yaml::from_str(&contents)?;
    Ok(config)
}
