//! Configuration module for graphsync.
//!
//! Typed configuration structs mapping to the YAML configuration file,
//! with loading, defaults and validation.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for graphsync.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sync: SyncConfig,
    pub remote: RemoteConfig,
    pub crypto: CryptoConfig,
    pub logging: LoggingConfig,
}

/// Local scanning and transfer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Upper bound on transfers running at the same time.
    pub max_concurrent_transfers: usize,
    /// Glob patterns (relative to the graph root) skipped by full scans.
    pub ignore_patterns: Vec<String>,
    /// Suffix of the temporary file a download is written to before the rename.
    pub temp_suffix: String,
    /// Directory, relative to the graph root, receiving historical versions.
    pub version_files_dir: String,
}

/// Backend endpoints and HTTP behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub environment: Environment,
    pub prod_url: String,
    pub dev_url: String,
    /// HTTPS proxy applied to requests issued after it is set.
    pub proxy: Option<String>,
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub user_agent: String,
}

/// Key-derivation cost for passphrase envelopes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    pub kdf_memory_kib: u32,
    pub kdf_iterations: u32,
    pub kdf_parallelism: u32,
    /// Envelopes demanding more memory than this are refused on decrypt.
    pub max_kdf_memory_kib: u32,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Output format: `pretty` or `json`.
    pub format: String,
}

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

/// Backend deployment a session talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Prod,
    Dev,
}

impl FromStr for Environment {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "prod" | "production" | "product" => Ok(Environment::Prod),
            "dev" | "development" | "develop" => Ok(Environment::Dev),
            other => Err(DomainError::InvalidArgument(format!(
                "unknown environment: {other}"
            ))),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Prod => write!(f, "prod"),
            Environment::Dev => write!(f, "dev"),
        }
    }
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/graphsync/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("graphsync")
            .join("config.yaml")
    }
}

impl RemoteConfig {
    /// Base URL for the given environment.
    pub fn base_url(&self, env: Environment) -> &str {
        match env {
            Environment::Prod => &self.prod_url,
            Environment::Dev => &self.dev_url,
        }
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_concurrent_transfers: 8,
            ignore_patterns: vec![
                ".*".to_string(),
                "**/.*".to_string(),
                "logseq/bak/**".to_string(),
                "logseq/version-files/**".to_string(),
            ],
            temp_suffix: ".gstmp".to_string(),
            version_files_dir: "logseq/version-files".to_string(),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Prod,
            prod_url: "https://api.logseq.com/file-sync/".to_string(),
            dev_url: "https://api-dev.logseq.com/file-sync/".to_string(),
            proxy: None,
            timeout_secs: 30,
            connect_timeout_secs: 15,
            max_retries: 5,
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
            user_agent: format!("graphsync/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            kdf_memory_kib: 19_456,
            kdf_iterations: 2,
            kdf_parallelism: 1,
            max_kdf_memory_kib: 1_048_576,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"sync.max_concurrent_transfers"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Valid values for `logging.format`.
const VALID_LOG_FORMATS: &[&str] = &["pretty", "json"];

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let mut push = |field: &str, message: String| {
            errors.push(ValidationError {
                field: field.into(),
                message,
            })
        };

        // --- sync ---
        if self.sync.max_concurrent_transfers == 0 {
            push(
                "sync.max_concurrent_transfers",
                "must be greater than 0".into(),
            );
        }
        for pattern in &self.sync.ignore_patterns {
            if let Err(e) = glob::Pattern::new(pattern) {
                push("sync.ignore_patterns", format!("invalid glob {pattern:?}: {e}"));
            }
        }
        if self.sync.temp_suffix.is_empty() || self.sync.temp_suffix.contains('/') {
            push(
                "sync.temp_suffix",
                "must be non-empty and contain no '/'".into(),
            );
        }

        // --- remote ---
        for (field, url) in [
            ("remote.prod_url", &self.remote.prod_url),
            ("remote.dev_url", &self.remote.dev_url),
        ] {
            if url::Url::parse(url).is_err() {
                push(field, format!("not a valid URL: {url}"));
            }
        }
        if let Some(proxy) = &self.remote.proxy {
            if url::Url::parse(proxy).is_err() {
                push("remote.proxy", format!("not a valid URL: {proxy}"));
            }
        }
        if self.remote.timeout_secs == 0 {
            push("remote.timeout_secs", "must be greater than 0".into());
        }
        if self.remote.connect_timeout_secs == 0 {
            push("remote.connect_timeout_secs", "must be greater than 0".into());
        }
        if self.remote.base_delay_ms > self.remote.max_delay_ms {
            push(
                "remote.base_delay_ms",
                format!(
                    "must not exceed remote.max_delay_ms ({})",
                    self.remote.max_delay_ms
                ),
            );
        }

        // --- crypto ---
        let min_memory = 8 * self.crypto.kdf_parallelism;
        if self.crypto.kdf_parallelism == 0 {
            push("crypto.kdf_parallelism", "must be greater than 0".into());
        }
        if self.crypto.kdf_iterations == 0 {
            push("crypto.kdf_iterations", "must be greater than 0".into());
        }
        if self.crypto.kdf_memory_kib < min_memory {
            push(
                "crypto.kdf_memory_kib",
                format!("must be at least {min_memory} (8 KiB per lane)"),
            );
        }
        if self.crypto.kdf_memory_kib > self.crypto.max_kdf_memory_kib {
            push(
                "crypto.kdf_memory_kib",
                "must not exceed crypto.max_kdf_memory_kib".into(),
            );
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            push(
                "logging.level",
                format!(
                    "invalid level '{}'; expected one of: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            );
        }
        if !VALID_LOG_FORMATS.contains(&self.logging.format.as_str()) {
            push(
                "logging.format",
                format!(
                    "invalid format '{}'; expected one of: {}",
                    self.logging.format,
                    VALID_LOG_FORMATS.join(", ")
                ),
            );
        }

        errors
    }
}
