//! Per-graph encryption context.
//!
//! Built once from the graph's keypair when a session is configured and
//! replaced wholesale when the keys change. Anything cached against a
//! context (encoded names in particular) must be dropped with it.

use graphsync_core::domain::{EncodedPath, RelativePath};

use crate::envelope::ContentCrypto;
use crate::fname::FilenameCodec;
use crate::keys::{PublicKey, SecretKey, SymmetricKey};
use crate::{CryptoError, Result};

const CONTENT_KEY_LABEL: &str = "graphsync content key v1";

/// Active key material for one graph
#[derive(Debug, Clone)]
pub struct EncryptionContext {
    format_version: u8,
    public: PublicKey,
    names: FilenameCodec,
    content_key: SymmetricKey,
    crypto: ContentCrypto,
}

impl EncryptionContext {
    pub const FORMAT_VERSION: u8 = 1;

    /// Build a context from a secret key and the public key it must match
    ///
    /// # Errors
    /// `InvalidKey` when the public key does not belong to the secret key
    pub fn from_keys(secret: &SecretKey, public: &PublicKey) -> Result<Self> {
        if secret.public_key() != *public {
            return Err(CryptoError::InvalidKey(
                "public key does not match secret key".to_string(),
            ));
        }
        Ok(Self::from_secret(secret))
    }

    pub fn from_secret(secret: &SecretKey) -> Self {
        Self {
            format_version: Self::FORMAT_VERSION,
            public: secret.public_key(),
            names: FilenameCodec::from_secret(secret),
            content_key: secret.derive(CONTENT_KEY_LABEL),
            crypto: ContentCrypto::default(),
        }
    }

    /// Parse both keys from their text forms
    ///
    /// # Errors
    /// `InvalidKey` on malformed or mismatched keys
    pub fn from_text(secret: &str, public: &str) -> Result<Self> {
        Self::from_keys(&SecretKey::parse(secret)?, &PublicKey::parse(public)?)
    }

    #[must_use]
    pub fn format_version(&self) -> u8 {
        self.format_version
    }

    #[must_use]
    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    #[must_use]
    pub fn names(&self) -> &FilenameCodec {
        &self.names
    }

    /// # Errors
    /// See [`FilenameCodec::encode`]
    pub fn encode_path(&self, path: &RelativePath) -> Result<EncodedPath> {
        self.names.encode(path)
    }

    /// # Errors
    /// See [`FilenameCodec::decode`]
    pub fn decode_path(&self, encoded: &EncodedPath) -> Result<RelativePath> {
        self.names.decode(encoded)
    }

    /// Encrypt file content for upload
    ///
    /// Always wraps, even when the bytes already look like an envelope, so
    /// [`open_content`](Self::open_content) hands back exactly what was sealed.
    ///
    /// # Errors
    /// `RandomnessUnavailable` if the CSPRNG fails
    pub fn seal_content(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        self.crypto.encrypt_with_key(&self.content_key, plaintext)
    }

    /// Decrypt downloaded content
    ///
    /// # Errors
    /// `WrongPassphrase` when sealed under another graph's key, `CorruptData`
    /// for damaged bodies
    pub fn open_content(&self, envelope: &[u8]) -> Result<Vec<u8>> {
        self.crypto.decrypt_with_key(&self.content_key, envelope)
    }
}
