//! Key material and the key manager.
//!
//! Graph keys are X25519 keypairs. The secret key is the root from which
//! the filename key and the content key are derived; the public key is
//! published so other devices can check they hold the matching secret.
//!
//! Text encodings:
//! - secret: `GRAPHSYNC-SECRET-KEY-1` followed by 64 uppercase hex digits
//! - public: `gspub1` followed by 64 lowercase hex digits

use std::fmt;

use sha2::{Digest, Sha256};
use x25519_dalek::StaticSecret;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{fill_random, CryptoError, Result};

const SECRET_PREFIX: &str = "GRAPHSYNC-SECRET-KEY-1";
const PUBLIC_PREFIX: &str = "gspub1";

/// 32 bytes of symmetric key material, wiped on drop
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey([u8; 32]);

impl SymmetricKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Derive an independent key for `label` from this one
    #[must_use]
    pub fn derive(&self, label: &str) -> SymmetricKey {
        derive_labeled(label, &[&self.0])
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SymmetricKey(***)")
    }
}

/// SHA-256 over a domain label and the given parts
pub(crate) fn derive_labeled(label: &str, parts: &[&[u8]]) -> SymmetricKey {
    let mut hasher = Sha256::new();
    hasher.update(label.as_bytes());
    hasher.update([0u8]);
    for part in parts {
        hasher.update(part);
    }
    SymmetricKey(hasher.finalize().into())
}

/// Graph secret key
#[derive(Clone)]
pub struct SecretKey(StaticSecret);

impl SecretKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(StaticSecret::from(bytes))
    }

    /// Parse the `GRAPHSYNC-SECRET-KEY-1...` text form
    ///
    /// # Errors
    /// Returns `CryptoError::InvalidKey` on a wrong prefix, length or digit
    pub fn parse(text: &str) -> Result<Self> {
        let body = text
            .trim()
            .strip_prefix(SECRET_PREFIX)
            .ok_or_else(|| CryptoError::InvalidKey("missing secret key prefix".to_string()))?;
        let mut bytes = decode_key_hex(body)?;
        let key = Self::from_bytes(bytes);
        bytes.zeroize();
        Ok(key)
    }

    #[must_use]
    pub fn to_text(&self) -> String {
        let mut bytes = self.0.to_bytes();
        let text = format!("{SECRET_PREFIX}{}", hex::encode_upper(bytes));
        bytes.zeroize();
        text
    }

    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        PublicKey(x25519_dalek::PublicKey::from(&self.0))
    }

    /// Root material for a derived key, never the raw secret
    pub(crate) fn derive(&self, label: &str) -> SymmetricKey {
        let mut bytes = self.0.to_bytes();
        let key = derive_labeled(label, &[&bytes]);
        bytes.zeroize();
        key
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(***)")
    }
}

/// Graph public key
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PublicKey(x25519_dalek::PublicKey);

impl PublicKey {
    /// Parse the `gspub1...` text form
    ///
    /// # Errors
    /// Returns `CryptoError::InvalidKey` on a wrong prefix, length or digit
    pub fn parse(text: &str) -> Result<Self> {
        let body = text
            .trim()
            .strip_prefix(PUBLIC_PREFIX)
            .ok_or_else(|| CryptoError::InvalidKey("missing public key prefix".to_string()))?;
        let bytes = decode_key_hex(body)?;
        Ok(Self(x25519_dalek::PublicKey::from(bytes)))
    }

    #[must_use]
    pub fn to_text(&self) -> String {
        format!("{PUBLIC_PREFIX}{}", hex::encode(self.0.as_bytes()))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_text())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

fn decode_key_hex(body: &str) -> Result<[u8; 32]> {
    if body.len() != 64 {
        return Err(CryptoError::InvalidKey(format!(
            "expected 64 hex digits, got {}",
            body.len()
        )));
    }
    let mut out = [0u8; 32];
    hex::decode_to_slice(body, &mut out)
        .map_err(|e| CryptoError::InvalidKey(format!("invalid hex: {e}")))?;
    Ok(out)
}

/// A freshly generated secret/public pair
#[derive(Debug, Clone)]
pub struct Keypair {
    pub secret: SecretKey,
    pub public: PublicKey,
}

/// Generates key material from the platform CSPRNG
pub struct KeyManager;

impl KeyManager {
    /// Generate a new graph keypair
    ///
    /// # Errors
    /// Returns `CryptoError::RandomnessUnavailable` when the OS source fails;
    /// callers should treat that as fatal rather than retry.
    pub fn generate() -> Result<Keypair> {
        let mut bytes = [0u8; 32];
        fill_random(&mut bytes)?;
        let secret = SecretKey::from_bytes(bytes);
        bytes.zeroize();
        let public = secret.public_key();
        tracing::debug!(public = %public, "Generated graph keypair");
        Ok(Keypair { secret, public })
    }
}
