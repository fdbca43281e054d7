//! Keygen command - create a graph keypair
//!
//! Prints both keys, or seals the secret key into a passphrase-protected
//! key file when `--protect` is given.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use graphsync_api::keygen;
use graphsync_crypto::ContentCrypto;
use tracing::info;

use super::{load_config, read_env_secret, PASSPHRASE_ENV};
use crate::output::{Output, OutputFormat};

#[derive(Debug, Args)]
pub struct KeygenCommand {
    /// Write the secret key to this file, sealed under a passphrase
    #[arg(long)]
    pub protect: Option<PathBuf>,

    /// Environment variable holding the passphrase for --protect
    #[arg(long, default_value = PASSPHRASE_ENV)]
    pub passphrase_env: String,
}

impl KeygenCommand {
    pub async fn execute(&self, format: OutputFormat, config_path: &Path) -> Result<()> {
        let out = Output::new(format);
        let pair = keygen()?;

        let Some(key_file) = &self.protect else {
            if format.is_json() {
                out.json(&serde_json::to_value(&pair)?);
            } else {
                out.success("Generated graph keypair");
                out.field("Public key", &pair.public_key);
                out.field("Secret key", &pair.secret_key);
                out.warn("Store the secret key safely; it cannot be recovered");
            }
            return Ok(());
        };

        let config = load_config(config_path)?;
        let passphrase = read_env_secret(&self.passphrase_env, "key file passphrase")?;
        let sealed = ContentCrypto::from_config(&config.crypto)
            .encrypt_with_passphrase(&passphrase, pair.secret_key.as_bytes())?;

        write_new(key_file, &sealed)?;
        info!(key_file = %key_file.display(), "Wrote protected secret key");

        if format.is_json() {
            out.json(&serde_json::json!({
                "publicKey": pair.public_key,
                "keyFile": key_file.display().to_string(),
            }));
        } else {
            out.success("Generated graph keypair");
            out.field("Public key", &pair.public_key);
            out.field("Key file", &key_file.display().to_string());
        }
        Ok(())
    }
}

/// Create `path` with `data`, refusing to replace an existing file
fn write_new(path: &Path, data: &[u8]) -> Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    file.write_all(data)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    file.sync_all()?;
    Ok(())
}
