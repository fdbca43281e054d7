//! Subcommands and the helpers they share

pub mod canonicalize;
pub mod config;
pub mod decrypt_graph;
pub mod envelope;
pub mod keygen;
pub mod meta;
pub mod names;
pub mod sync;

use std::path::Path;

use anyhow::{bail, Context, Result};
use graphsync_api::SyncContext;
use graphsync_core::config::Config;
use graphsync_crypto::{is_envelope, ContentCrypto, CryptoError, SecretKey};
use tracing::debug;

/// Environment variable holding the passphrase unless overridden
pub const PASSPHRASE_ENV: &str = "GRAPHSYNC_PASSPHRASE";

/// Environment variable holding the remote access token unless overridden
pub const TOKEN_ENV: &str = "GRAPHSYNC_TOKEN";

/// Load the configuration file, falling back to defaults when it is absent
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        debug!(config_path = %path.display(), "No configuration file, using defaults");
        return Ok(Config::default());
    }
    Config::load(path)
}

/// Build a context from the configuration at `path`
pub fn open_context(path: &Path) -> Result<SyncContext> {
    SyncContext::new(load_config(path)?)
}

/// Read a non-empty secret from the environment
pub fn read_env_secret(var: &str, what: &str) -> Result<String> {
    let value = std::env::var(var).with_context(|| format!("Set {var} to the {what}"))?;
    if value.is_empty() {
        bail!("{var} is empty");
    }
    Ok(value)
}

/// Load a graph secret key from a file
///
/// The file holds either the key text or a passphrase envelope of it, in
/// which case the passphrase is read from `passphrase_env`.
pub fn load_secret_key(path: &Path, crypto: &ContentCrypto, passphrase_env: &str) -> Result<SecretKey> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read key file {}", path.display()))?;

    let text = if is_envelope(&bytes) {
        let passphrase = read_env_secret(passphrase_env, "key file passphrase")?;
        let plain = crypto
            .decrypt_with_passphrase(&passphrase, &bytes)
            .map_err(describe_crypto_error)?;
        String::from_utf8(plain).context("Key file does not contain a secret key")?
    } else {
        String::from_utf8(bytes).context("Key file does not contain a secret key")?
    };

    Ok(SecretKey::parse(text.trim())?)
}

/// Turn an envelope failure into something a user can act on
pub fn describe_crypto_error(error: CryptoError) -> anyhow::Error {
    match error {
        CryptoError::WrongPassphrase => anyhow::anyhow!("Wrong passphrase"),
        CryptoError::CorruptData(detail) => {
            anyhow::anyhow!("Data is damaged or was not produced by graphsync: {detail}")
        }
        other => other.into(),
    }
}
