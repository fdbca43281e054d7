//! Encrypt and decrypt commands - passphrase envelopes for single files

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use super::{describe_crypto_error, open_context, read_env_secret, PASSPHRASE_ENV};
use crate::output::{Output, OutputFormat};

/// Arguments shared by both directions
#[derive(Debug, Args)]
pub struct EnvelopeArgs {
    /// File to read
    pub input: PathBuf,

    /// File to write
    #[arg(short, long)]
    pub output: PathBuf,

    /// Environment variable holding the passphrase
    #[arg(long, default_value = PASSPHRASE_ENV)]
    pub passphrase_env: String,
}

#[derive(Debug, Args)]
pub struct EncryptCommand {
    #[command(flatten)]
    pub args: EnvelopeArgs,
}

#[derive(Debug, Args)]
pub struct DecryptCommand {
    #[command(flatten)]
    pub args: EnvelopeArgs,
}

impl EncryptCommand {
    pub async fn execute(&self, format: OutputFormat, config_path: &Path) -> Result<()> {
        let ctx = open_context(config_path)?;
        let passphrase = read_env_secret(&self.args.passphrase_env, "passphrase")?;
        let plain = read_input(&self.args.input).await?;

        let sealed = ctx.encrypt_with_passphrase(&passphrase, &plain)?;
        write_output(&self.args.output, &sealed).await?;

        report(format, "Encrypted", &self.args, plain.len(), sealed.len());
        Ok(())
    }
}

impl DecryptCommand {
    pub async fn execute(&self, format: OutputFormat, config_path: &Path) -> Result<()> {
        let ctx = open_context(config_path)?;
        let passphrase = read_env_secret(&self.args.passphrase_env, "passphrase")?;
        let sealed = read_input(&self.args.input).await?;

        let plain = match ctx.decrypt_with_passphrase(&passphrase, &sealed) {
            Ok(plain) => plain,
            Err(graphsync_core::domain::SyncError::Crypto(e)) => {
                return Err(describe_crypto_error(e))
                    .with_context(|| format!("Cannot decrypt {}", self.args.input.display()))
            }
            Err(e) => return Err(e.into()),
        };
        write_output(&self.args.output, &plain).await?;

        report(format, "Decrypted", &self.args, sealed.len(), plain.len());
        Ok(())
    }
}

async fn read_input(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}

async fn write_output(path: &Path, data: &[u8]) -> Result<()> {
    tokio::fs::write(path, data)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}

fn report(format: OutputFormat, verb: &str, args: &EnvelopeArgs, read: usize, written: usize) {
    info!(input = %args.input.display(), output = %args.output.display(), read, written, "{verb}");

    let out = Output::new(format);
    if format.is_json() {
        out.json(&serde_json::json!({
            "success": true,
            "input": args.input.display().to_string(),
            "output": args.output.display().to_string(),
            "bytesRead": read,
            "bytesWritten": written,
        }));
    } else {
        out.success(&format!(
            "{verb} {} -> {}",
            args.input.display(),
            args.output.display()
        ));
    }
}
