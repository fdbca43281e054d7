//! Key generation and standalone encryption helpers

use graphsync_core::domain::SyncError;
use graphsync_crypto::{FilenameCodec, KeyManager, SecretKey};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::context::SyncContext;

/// A keypair in its text forms
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeypairText {
    pub secret_key: String,
    pub public_key: String,
}

/// Generate a new graph keypair
///
/// # Errors
/// `Crypto(RandomnessUnavailable)` when the OS randomness source fails
pub fn keygen() -> Result<KeypairText, SyncError> {
    let pair = KeyManager::generate()?;
    Ok(KeypairText {
        secret_key: pair.secret.to_text(),
        public_key: pair.public.to_text(),
    })
}

/// Encrypt names with the filename key derived from `secret_key`
///
/// # Errors
/// `Crypto` for a malformed key or an empty name
pub fn encrypt_fnames<S: AsRef<str>>(secret_key: &str, names: &[S]) -> Result<Vec<String>, SyncError> {
    let codec = FilenameCodec::from_secret(&SecretKey::parse(secret_key)?);
    Ok(codec.encrypt_names(names)?)
}

/// Reverse [`encrypt_fnames`]
///
/// # Errors
/// `Crypto(CorruptData)` for any name that was not produced under this key
pub fn decrypt_fnames<S: AsRef<str>>(secret_key: &str, encoded: &[S]) -> Result<Vec<String>, SyncError> {
    let codec = FilenameCodec::from_secret(&SecretKey::parse(secret_key)?);
    Ok(codec.decrypt_names(encoded)?)
}

impl SyncContext {
    /// Seal `data` under a passphrase with the configured KDF cost
    ///
    /// # Errors
    /// `Crypto(InvalidInput)` for an empty passphrase
    #[instrument(skip_all, fields(bytes = data.len()))]
    pub fn encrypt_with_passphrase(&self, passphrase: &str, data: &[u8]) -> Result<Vec<u8>, SyncError> {
        Ok(self.crypto.encrypt_with_passphrase(passphrase, data)?)
    }

    /// Open a passphrase envelope
    ///
    /// # Errors
    /// `Crypto(WrongPassphrase)` and `Crypto(CorruptData)` are distinct so
    /// callers can tell a typo from damaged data
    #[instrument(skip_all, fields(bytes = envelope.len()))]
    pub fn decrypt_with_passphrase(&self, passphrase: &str, envelope: &[u8]) -> Result<Vec<u8>, SyncError> {
        let plaintext = self.crypto.decrypt_with_passphrase(passphrase, envelope)?;
        debug!(bytes = plaintext.len(), "Envelope opened");
        Ok(plaintext)
    }
}

#[cfg(test)]
mod tests {
    use graphsync_core::domain::CryptoError;

    use super::*;

    #[test]
    fn test_keygen_text_forms_parse() {
        let pair = keygen().unwrap();
        assert!(pair.secret_key.starts_with("GRAPHSYNC-SECRET-KEY-1"));
        assert!(pair.public_key.starts_with("gspub1"));
        assert!(graphsync_crypto::EncryptionContext::from_text(&pair.secret_key, &pair.public_key).is_ok());
    }

    #[test]
    fn test_fnames_round_trip_in_order() {
        let pair = keygen().unwrap();
        let names = ["pages/a.md", "journals/2024_01_01.md", "pages/caf\u{e9}.md"];

        let encoded = encrypt_fnames(&pair.secret_key, &names).unwrap();
        assert!(encoded.iter().all(|e| e.starts_with("e.")));
        assert_eq!(decrypt_fnames(&pair.secret_key, &encoded).unwrap(), names);
    }

    #[test]
    fn test_fnames_under_other_key_fail() {
        let a = keygen().unwrap();
        let b = keygen().unwrap();
        let encoded = encrypt_fnames(&a.secret_key, &["a.md"]).unwrap();

        assert!(matches!(
            decrypt_fnames(&b.secret_key, &encoded),
            Err(SyncError::Crypto(CryptoError::CorruptData(_)))
        ));
    }

    #[test]
    fn test_malformed_key_is_rejected() {
        assert!(matches!(
            encrypt_fnames("not a key", &["a.md"]),
            Err(SyncError::Crypto(CryptoError::InvalidKey(_)))
        ));
    }
}
