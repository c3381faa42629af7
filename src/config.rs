//! Configuration loading and types for bytevault.
//!
//! Configuration is read from a YAML file and deserialized into the
//! [`StoreConfig`] struct.  The set of recognized fields is closed
//! (`deny_unknown_fields`) and validated with `garde` at construction
//! time, so a misconfigured embedding fails at startup rather than at
//! the first request.

use garde::Validate;
use serde::Deserialize;
use std::path::Path;

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Service identity: endpoint and region.
    #[serde(default)]
    #[garde(dive)]
    pub service: ServiceConfig,

    /// Credentials handed to the surrounding API layer.
    #[serde(default)]
    #[garde(dive)]
    pub credentials: CredentialsConfig,

    /// Object and capacity limits.
    #[serde(default)]
    #[garde(dive)]
    pub limits: LimitsConfig,

    /// Snapshot persistence settings.
    #[serde(default)]
    #[garde(dive)]
    pub snapshot: SnapshotConfig,

    /// Logging settings.
    #[serde(default)]
    #[garde(dive)]
    pub logging: LoggingConfig,

    /// Observability settings.
    #[serde(default)]
    #[garde(dive)]
    pub observability: ObservabilityConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            service: ServiceConfig::default(),
            credentials: CredentialsConfig::default(),
            limits: LimitsConfig::default(),
            snapshot: SnapshotConfig::default(),
            logging: LoggingConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Service identity configuration.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Endpoint advertised to clients (host:port or URL).
    #[serde(default = "default_endpoint")]
    #[garde(length(min = 1))]
    pub endpoint: String,

    /// Region to present (e.g. `us-east-1`).
    #[serde(default = "default_region")]
    #[garde(pattern(r"^[a-z0-9-]+$"))]
    pub region: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            region: default_region(),
        }
    }
}

/// Credential configuration.
///
/// The core does not verify signatures itself; these values are consumed
/// by the surrounding API layer.  They are still validated here so an
/// embedding cannot start with empty credentials.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct CredentialsConfig {
    /// Access key (also accepts `access_key_id` in YAML).
    #[serde(alias = "access_key_id", default = "default_access_key")]
    #[garde(length(min = 1))]
    pub access_key: String,

    /// Secret access key (also accepts `secret_access_key` in YAML).
    #[serde(alias = "secret_access_key", default = "default_secret_key")]
    #[garde(length(min = 1))]
    pub secret_key: String,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            access_key: default_access_key(),
            secret_key: default_secret_key(),
        }
    }
}

/// Object and capacity limits.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct LimitsConfig {
    /// Maximum object size in bytes (default 5 GiB).
    #[serde(default = "default_max_object_size")]
    #[garde(range(min = 1))]
    pub max_object_size: u64,

    /// Maximum total bytes stored across all buckets.  0 means unlimited.
    #[serde(default)]
    #[garde(skip)]
    pub max_total_bytes: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_object_size: default_max_object_size(),
            max_total_bytes: 0,
        }
    }
}

/// Snapshot persistence configuration.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct SnapshotConfig {
    /// Persistence mode: `none` or `snapshot`.
    #[serde(default = "default_persistence_none")]
    #[garde(pattern(r"^(none|snapshot)$"))]
    pub mode: String,

    /// File path for the snapshot SQLite database.
    #[serde(default = "default_snapshot_path")]
    #[garde(length(min = 1))]
    pub path: String,

    /// Interval between periodic snapshots in seconds (0 = only on shutdown).
    #[serde(default = "default_snapshot_interval")]
    #[garde(skip)]
    pub interval_seconds: u64,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            mode: default_persistence_none(),
            path: default_snapshot_path(),
            interval_seconds: default_snapshot_interval(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    #[garde(pattern(r"^(trace|debug|info|warn|error)$"))]
    pub level: String,

    /// Log format: text or json.
    #[serde(default = "default_log_format")]
    #[garde(pattern(r"^(text|json)$"))]
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
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ObservabilityConfig {
    /// Enable Prometheus metrics collection.
    #[serde(default = "default_true")]
    #[garde(skip)]
    pub metrics: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self { metrics: true }
    }
}

// -- Defaults ----------------------------------------------------------------

fn default_true() -> bool {
    true
}

fn default_endpoint() -> String {
    "127.0.0.1:9012".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_access_key() -> String {
    "bytevault".to_string()
}

fn default_secret_key() -> String {
    "bytevault-secret".to_string()
}

fn default_max_object_size() -> u64 {
    5_368_709_120 // 5 GiB
}

fn default_persistence_none() -> String {
    "none".to_string()
}

fn default_snapshot_path() -> String {
    "./data/bytevault.snap".to_string()
}

fn default_snapshot_interval() -> u64 {
    300
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

// -- Loader ------------------------------------------------------------------

/// Load, parse and validate configuration from a YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<StoreConfig> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    parse_config(&contents)
}

/// Parse and validate configuration from a YAML string.
pub fn parse_config(contents: &str) -> anyhow::Result<StoreConfig> {
    let config: StoreConfig = serde_yaml::from_str(contents)?;
    config
        .validate()
        .map_err(|report| anyhow::anyhow!("invalid configuration: {report}"))?;
    Ok(config)
}

/// Initialize the global tracing subscriber from the logging config.
///
/// Honors `RUST_LOG` when set.  Safe to call once per process; returns an
/// error if a subscriber is already installed.
pub fn init_tracing(cfg: &LoggingConfig) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cfg.level.clone()));

    if cfg.format == "json" {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .try_init()
            .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))?;
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .try_init()
            .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))?;
    }
    Ok(())
}
