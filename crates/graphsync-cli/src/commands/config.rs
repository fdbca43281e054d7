//! Config command - View and manage graphsync configuration
//!
//! Provides the `graphsync config` CLI command which:
//! 1. Shows the effective configuration (YAML or JSON)
//! 2. Sets individual configuration values via dot-notation keys
//! 3. Validates the configuration file and reports errors

use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use graphsync_core::config::{Config, Environment};
use tracing::info;

use super::load_config;
use crate::output::{Output, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (e.g., "remote.environment")
        key: String,
        /// New value
        value: String,
    },
    /// Validate configuration file
    Validate,
}

impl ConfigCommand {
    /// Execute the config command
    pub async fn execute(&self, format: OutputFormat, config_path: &Path) -> Result<()> {
        match self {
            ConfigCommand::Show => self.execute_show(format, config_path),
            ConfigCommand::Set { key, value } => self.execute_set(key, value, format, config_path),
            ConfigCommand::Validate => self.execute_validate(format, config_path),
        }
    }

    fn execute_show(&self, format: OutputFormat, config_path: &Path) -> Result<()> {
        let out = Output::new(format);
        let config = load_config(config_path)?;

        info!(config_path = %config_path.display(), "Showing configuration");

        if format.is_json() {
            let json = serde_json::to_value(&config)
                .context("Failed to serialize configuration to JSON")?;
            out.json(&json);
        } else {
            out.success(&format!("Configuration ({})", config_path.display()));
            out.info("");

            let yaml = serde_yaml::to_string(&config)
                .context("Failed to serialize configuration to YAML")?;
            for line in yaml.lines() {
                out.info(line);
            }
        }
        Ok(())
    }

    fn execute_set(&self, key: &str, value: &str, format: OutputFormat, config_path: &Path) -> Result<()> {
        let out = Output::new(format);
        let mut config = load_config(config_path)?;

        info!(key = %key, value = %value, "Setting configuration value");

        if let Err(e) = apply_config_value(&mut config, key, value) {
            if format.is_json() {
                out.json(&serde_json::json!({
                    "success": false,
                    "key": key,
                    "value": value,
                    "error": e.to_string(),
                }));
            } else {
                out.error(&format!("Failed to set '{}': {}", key, e));
                out.info("");
                out.info("Supported keys:");
                for (name, help) in SUPPORTED_KEYS {
                    out.info(&format!("  {name:<32} - {help}"));
                }
            }
            bail!("invalid configuration key or value");
        }

        let errors = config.validate();
        if !errors.is_empty() {
            let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
            if format.is_json() {
                out.json(&serde_json::json!({
                    "success": false,
                    "key": key,
                    "value": value,
                    "errors": messages,
                }));
            } else {
                out.error(&format!("Invalid value for '{}': {}", key, messages.join("; ")));
            }
            bail!("configuration would be invalid");
        }

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create configuration directory")?;
        }
        let yaml = serde_yaml::to_string(&config).context("Failed to serialize configuration")?;
        std::fs::write(config_path, yaml).context("Failed to write configuration file")?;

        if format.is_json() {
            out.json(&serde_json::json!({
                "success": true,
                "key": key,
                "value": value,
                "config_path": config_path.display().to_string(),
            }));
        } else {
            out.success(&format!("Set {} = {}", key, value));
            out.info(&format!("Saved to {}", config_path.display()));
        }
        Ok(())
    }

    fn execute_validate(&self, format: OutputFormat, config_path: &Path) -> Result<()> {
        let out = Output::new(format);

        if !config_path.exists() {
            if format.is_json() {
                out.json(&serde_json::json!({
                    "valid": true,
                    "config_path": config_path.display().to_string(),
                    "errors": [],
                    "defaults": true,
                }));
            } else {
                out.info(&format!(
                    "Configuration file not found at {}",
                    config_path.display()
                ));
                out.info("Using default configuration.");
            }
            return Ok(());
        }

        let config = match Config::load(config_path) {
            Ok(cfg) => cfg,
            Err(e) => {
                if format.is_json() {
                    out.json(&serde_json::json!({
                        "valid": false,
                        "config_path": config_path.display().to_string(),
                        "errors": [format!("Failed to parse configuration: {e:#}")],
                    }));
                } else {
                    out.error(&format!("Failed to parse configuration: {e:#}"));
                    out.info(&format!("File: {}", config_path.display()));
                }
                bail!("configuration file could not be parsed");
            }
        };

        info!(config_path = %config_path.display(), "Validating configuration");
        let errors = config.validate();

        if format.is_json() {
            let error_strings: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            out.json(&serde_json::json!({
                "valid": errors.is_empty(),
                "config_path": config_path.display().to_string(),
                "errors": error_strings,
            }));
        } else if errors.is_empty() {
            out.success("Configuration is valid");
            out.info(&format!("File: {}", config_path.display()));
        } else {
            out.error(&format!(
                "Configuration has {} error{}:",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" }
            ));
            out.info(&format!("File: {}", config_path.display()));
            out.info("");
            for error in &errors {
                out.info(&format!("  {} - {}", error.field, error.message));
            }
        }

        if !errors.is_empty() {
            bail!("configuration is invalid");
        }
        Ok(())
    }
}

const SUPPORTED_KEYS: &[(&str, &str)] = &[
    ("sync.max_concurrent_transfers", "Transfers running at once"),
    ("sync.temp_suffix", "Suffix for in-progress downloads"),
    ("sync.version_files_dir", "Where historical versions are written"),
    ("remote.environment", "prod|dev"),
    ("remote.proxy", "HTTPS proxy URL, empty to clear"),
    ("remote.timeout_secs", "Request timeout"),
    ("remote.max_retries", "Retries for transient failures"),
    ("crypto.kdf_memory_kib", "Argon2 memory cost for new envelopes"),
    ("crypto.kdf_iterations", "Argon2 time cost for new envelopes"),
    ("logging.level", "trace|debug|info|warn|error"),
    ("logging.format", "pretty|json"),
];

/// Apply a dot-notation key/value pair to a Config struct
fn apply_config_value(config: &mut Config, key: &str, value: &str) -> Result<()> {
    match key {
        "sync.max_concurrent_transfers" => {
            config.sync.max_concurrent_transfers = value.parse().context("expected a positive integer")?
        }
        "sync.temp_suffix" => config.sync.temp_suffix = value.to_string(),
        "sync.version_files_dir" => config.sync.version_files_dir = value.to_string(),
        "remote.environment" => {
            config.remote.environment = value.parse::<Environment>()?;
        }
        "remote.proxy" => {
            config.remote.proxy = if value.is_empty() {
                None
            } else {
                Some(value.to_string())
            }
        }
        "remote.timeout_secs" => {
            config.remote.timeout_secs = value.parse().context("expected a number of seconds")?
        }
        "remote.max_retries" => {
            config.remote.max_retries = value.parse().context("expected a non-negative integer")?
        }
        "crypto.kdf_memory_kib" => {
            config.crypto.kdf_memory_kib = value.parse().context("expected a size in KiB")?
        }
        "crypto.kdf_iterations" => {
            config.crypto.kdf_iterations = value.parse().context("expected a positive integer")?
        }
        "logging.level" => config.logging.level = value.to_string(),
        "logging.format" => config.logging.format = value.to_string(),
        _ => bail!("unknown configuration key '{key}'"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_apply_environment() {
        let mut config = Config::default();
        apply_config_value(&mut config, "remote.environment", "development").unwrap();
        assert_eq!(config.remote.environment, Environment::Dev);
        assert!(apply_config_value(&mut config, "remote.environment", "staging").is_err());
    }

    #[test]
    fn test_apply_proxy_and_clear() {
        let mut config = Config::default();
        apply_config_value(&mut config, "remote.proxy", "https://proxy:3128").unwrap();
        assert_eq!(config.remote.proxy.as_deref(), Some("https://proxy:3128"));
        apply_config_value(&mut config, "remote.proxy", "").unwrap();
        assert!(config.remote.proxy.is_none());
    }

    #[test]
    fn test_apply_numeric_values() {
        let mut config = Config::default();
        apply_config_value(&mut config, "sync.max_concurrent_transfers", "3").unwrap();
        apply_config_value(&mut config, "crypto.kdf_memory_kib", "65536").unwrap();
        assert_eq!(config.sync.max_concurrent_transfers, 3);
        assert_eq!(config.crypto.kdf_memory_kib, 65536);
        assert!(apply_config_value(&mut config, "remote.max_retries", "-1").is_err());
    }

    #[test]
    fn test_apply_unknown_key_fails() {
        let mut config = Config::default();
        assert!(apply_config_value(&mut config, "auth.app_id", "x").is_err());
    }

    #[tokio::test]
    async fn test_set_writes_file_that_loads_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("graphsync").join("config.yaml");

        ConfigCommand::Set {
            key: "logging.level".to_string(),
            value: "debug".to_string(),
        }
        .execute(OutputFormat::Json, &path)
        .await
        .unwrap();

        assert_eq!(Config::load(&path).unwrap().logging.level, "debug");
    }

    #[tokio::test]
    async fn test_set_rejects_invalid_result() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");

        let result = ConfigCommand::Set {
            key: "sync.max_concurrent_transfers".to_string(),
            value: "0".to_string(),
        }
        .execute(OutputFormat::Json, &path)
        .await;

        assert!(result.is_err());
        assert!(!path.exists());
    }
}
