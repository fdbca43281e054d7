//! Decrypt-graph command - turn a downloaded copy of the remote store back
//! into a readable graph
//!
//! Every file named `e.<hex>` under the input directory is a remote object:
//! its name decrypts to the root-relative path and its body to the file
//! content. Anything else is ignored. Files that fail to decrypt are
//! reported and skipped; the rest are still written.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Args;
use graphsync_core::domain::{EncodedPath, RelativePath};
use graphsync_crypto::{ContentCrypto, EncryptionContext};
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use super::{load_config, load_secret_key, PASSPHRASE_ENV};
use crate::output::{Output, OutputFormat};

#[derive(Debug, Args)]
pub struct DecryptGraphCommand {
    /// Directory holding the downloaded remote objects
    pub input: PathBuf,

    /// Directory to write the decrypted graph into
    pub output: PathBuf,

    /// Secret key file, plain or passphrase-protected
    #[arg(long)]
    pub key_file: PathBuf,

    /// Environment variable holding the key file passphrase
    #[arg(long, default_value = PASSPHRASE_ENV)]
    pub passphrase_env: String,
}

/// What a decryption pass did
#[derive(Debug, Default)]
pub struct TreeSummary {
    pub decrypted: Vec<RelativePath>,
    /// Objects that could not be decrypted, with the reason
    pub skipped: Vec<(PathBuf, String)>,
}

impl DecryptGraphCommand {
    pub async fn execute(&self, format: OutputFormat, config_path: &Path) -> Result<()> {
        let out = Output::new(format);
        if !self.input.is_dir() {
            bail!("{} is not a directory", self.input.display());
        }

        let config = load_config(config_path)?;
        let secret = load_secret_key(
            &self.key_file,
            &ContentCrypto::from_config(&config.crypto),
            &self.passphrase_env,
        )?;
        let crypto = EncryptionContext::from_secret(&secret);

        let input = self.input.clone();
        let output = self.output.clone();
        let summary = tokio::task::spawn_blocking(move || decrypt_tree(&crypto, &input, &output))
            .await
            .context("Decryption task failed")??;

        if format.is_json() {
            out.json(&serde_json::json!({
                "success": summary.skipped.is_empty(),
                "output": self.output.display().to_string(),
                "decrypted": summary.decrypted,
                "skipped": summary
                    .skipped
                    .iter()
                    .map(|(path, reason)| serde_json::json!({
                        "file": path.display().to_string(),
                        "reason": reason,
                    }))
                    .collect::<Vec<_>>(),
            }));
        } else {
            for (path, reason) in &summary.skipped {
                out.warn(&format!("{}: {reason}", path.display()));
            }
            out.success(&format!(
                "Decrypted {} file(s) into {}",
                summary.decrypted.len(),
                self.output.display()
            ));
        }

        if !summary.skipped.is_empty() {
            bail!("{} file(s) could not be decrypted", summary.skipped.len());
        }
        Ok(())
    }
}

/// Decrypt every remote object under `input` into `output`
///
/// # Errors
/// Only for failures to walk `input` or write into `output`; undecryptable
/// objects land in [`TreeSummary::skipped`]
#[instrument(skip(crypto), fields(input = %input.display(), output = %output.display()))]
pub fn decrypt_tree(crypto: &EncryptionContext, input: &Path, output: &Path) -> Result<TreeSummary> {
    let mut summary = TreeSummary::default();

    for entry in WalkDir::new(input).follow_links(false) {
        let entry = entry.context("Failed to walk input directory")?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().filter(|n| n.starts_with("e.")) else {
            debug!(file = %entry.path().display(), "Not a remote object, ignored");
            continue;
        };

        let path = match decrypt_object(crypto, name, entry.path()) {
            Ok((path, plain)) => {
                let target = path.to_fs_path(output);
                if let Some(parent) = target.parent() {
                    std::fs::create_dir_all(parent)
                        .with_context(|| format!("Failed to create {}", parent.display()))?;
                }
                std::fs::write(&target, plain)
                    .with_context(|| format!("Failed to write {}", target.display()))?;
                path
            }
            Err(e) => {
                warn!(file = %entry.path().display(), error = %e, "Skipping object");
                summary.skipped.push((entry.path().to_path_buf(), format!("{e:#}")));
                continue;
            }
        };
        debug!(path = %path, "Decrypted");
        summary.decrypted.push(path);
    }

    summary.decrypted.sort();
    info!(
        decrypted = summary.decrypted.len(),
        skipped = summary.skipped.len(),
        "Graph decryption finished"
    );
    Ok(summary)
}

fn decrypt_object(crypto: &EncryptionContext, name: &str, file: &Path) -> Result<(RelativePath, Vec<u8>)> {
    let encoded = EncodedPath::new(name)?;
    let path = crypto.decode_path(&encoded).context("name does not decrypt")?;
    let body = std::fs::read(file)?;
    let plain = crypto.open_content(&body).context("content does not decrypt")?;
    Ok((path, plain))
}
