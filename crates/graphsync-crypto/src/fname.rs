//! Deterministic whole-path filename encryption.
//!
//! The entire relative path is sealed as one unit so the server never sees
//! directory structure. Renaming a directory therefore means re-encoding
//! every path below it.
//!
//! Encoding: `e.` + hex(nonce || ciphertext || tag). The nonce is synthetic,
//! a keyed hash of the NFC-normalized path, which makes the output stable
//! for a given key while distinct paths still get distinct nonces.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Nonce,
};
use graphsync_core::domain::{EncodedPath, RelativePath};
use unicode_normalization::UnicodeNormalization;

use crate::keys::{derive_labeled, SecretKey, SymmetricKey};
use crate::{CryptoError, Result};

const NAME_KEY_LABEL: &str = "graphsync filename key v1";
const NONCE_KEY_LABEL: &str = "graphsync filename nonce v1";
const AAD: &[u8] = b"graphsync-fname-v1";
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Reversible, keyed transform between relative paths and server names
#[derive(Clone)]
pub struct FilenameCodec {
    cipher_key: SymmetricKey,
    nonce_key: SymmetricKey,
}

impl std::fmt::Debug for FilenameCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FilenameCodec(***)")
    }
}

impl FilenameCodec {
    pub fn new(key: &SymmetricKey) -> Self {
        Self {
            cipher_key: key.derive(NAME_KEY_LABEL),
            nonce_key: key.derive(NONCE_KEY_LABEL),
        }
    }

    /// Codec for a graph, keyed from its secret key
    pub fn from_secret(secret: &SecretKey) -> Self {
        Self::new(&secret.derive(NAME_KEY_LABEL))
    }

    /// Encrypt one name
    ///
    /// # Errors
    /// `InvalidInput` for an empty name
    pub fn encrypt_name(&self, name: &str) -> Result<EncodedPath> {
        if name.is_empty() {
            return Err(CryptoError::InvalidInput(
                "filename must not be empty".to_string(),
            ));
        }
        let normalized: String = name.nfc().collect();
        let nonce = self.synthetic_nonce(&normalized);

        let cipher = ChaCha20Poly1305::new(self.cipher_key.as_bytes().into());
        let ciphertext = cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: normalized.as_bytes(),
                    aad: AAD,
                },
            )
            .map_err(|_| CryptoError::InvalidInput("filename too long".to_string()))?;

        let mut raw = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        raw.extend_from_slice(&nonce);
        raw.extend_from_slice(&ciphertext);

        EncodedPath::new(format!("{}{}", EncodedPath::PREFIX, hex::encode(raw)))
            .map_err(|e| CryptoError::InvalidInput(e.to_string()))
    }

    /// Decrypt one name produced by [`FilenameCodec::encrypt_name`]
    ///
    /// # Errors
    /// `CorruptData` when the input is not a well-formed name sealed under this key
    pub fn decrypt_name(&self, encoded: &str) -> Result<String> {
        let body = encoded.strip_prefix(EncodedPath::PREFIX).ok_or_else(|| {
            CryptoError::CorruptData(format!("missing '{}' prefix", EncodedPath::PREFIX))
        })?;
        let raw = hex::decode(body)
            .map_err(|e| CryptoError::CorruptData(format!("invalid hex in filename: {e}")))?;
        if raw.len() <= NONCE_LEN + TAG_LEN {
            return Err(CryptoError::CorruptData(
                "encrypted filename too short".to_string(),
            ));
        }
        let (nonce, ciphertext) = raw.split_at(NONCE_LEN);

        let cipher = ChaCha20Poly1305::new(self.cipher_key.as_bytes().into());
        let plaintext = cipher
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: ciphertext,
                    aad: AAD,
                },
            )
            .map_err(|_| {
                CryptoError::CorruptData("filename does not decrypt under this key".to_string())
            })?;
        let name = String::from_utf8(plaintext)
            .map_err(|_| CryptoError::CorruptData("decrypted filename is not UTF-8".to_string()))?;

        // a valid tag with a foreign nonce means the name was not produced by this codec
        if self.synthetic_nonce(&name)[..] != *nonce {
            return Err(CryptoError::CorruptData(
                "filename nonce does not match its content".to_string(),
            ));
        }

        Ok(name.nfc().collect())
    }

    /// Encrypt a graph path
    ///
    /// # Errors
    /// Never fails for a valid `RelativePath`; the `Result` mirrors `encrypt_name`
    pub fn encode(&self, path: &RelativePath) -> Result<EncodedPath> {
        self.encrypt_name(path.as_str())
    }

    /// Decrypt a server name back to a graph path
    ///
    /// # Errors
    /// `CorruptData` if the name does not decrypt or is not a valid relative path
    pub fn decode(&self, encoded: &EncodedPath) -> Result<RelativePath> {
        let name = self.decrypt_name(encoded.as_str())?;
        RelativePath::new(name).map_err(|e| CryptoError::CorruptData(e.to_string()))
    }

    /// Batch form of [`FilenameCodec::encrypt_name`], order preserving
    ///
    /// # Errors
    /// Fails on the first invalid name
    pub fn encrypt_names<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<String>> {
        names
            .iter()
            .map(|n| self.encrypt_name(n.as_ref()).map(String::from))
            .collect()
    }

    /// Batch form of [`FilenameCodec::decrypt_name`], order preserving
    ///
    /// # Errors
    /// Fails on the first name that does not decrypt
    pub fn decrypt_names<S: AsRef<str>>(&self, encoded: &[S]) -> Result<Vec<String>> {
        encoded
            .iter()
            .map(|n| self.decrypt_name(n.as_ref()))
            .collect()
    }

    fn synthetic_nonce(&self, normalized: &str) -> [u8; NONCE_LEN] {
        let digest = derive_labeled(
            NONCE_KEY_LABEL,
            &[self.nonce_key.as_bytes(), normalized.as_bytes()],
        );
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&digest.as_bytes()[..NONCE_LEN]);
        nonce
    }
}
