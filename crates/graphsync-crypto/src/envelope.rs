//! Self-describing encrypted envelopes.
//!
//! Layout (integers little-endian):
//!
//! ```text
//! magic "GSENV" | version u8 | mode u8 | [m_cost u32 | t_cost u32 | p_cost u32] |
//! salt [16] | nonce [12] | key check [16] | ChaCha20-Poly1305 ciphertext + tag
//! ```
//!
//! The KDF costs are present only in passphrase mode. The whole header is
//! bound as associated data. The key check is a truncated hash of the
//! derived key: a mismatch means the wrong passphrase, while a matching
//! check followed by a failed seal means the ciphertext was damaged.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Nonce,
};
use graphsync_core::config::CryptoConfig;

use crate::kdf::{derive_key, KdfParams};
use crate::keys::{derive_labeled, SymmetricKey};
use crate::{fill_random, CryptoError, Result};

const MAGIC: &[u8; 5] = b"GSENV";
const VERSION: u8 = 1;
const MODE_PASSPHRASE: u8 = 1;
const MODE_KEY: u8 = 2;
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const CHECK_LEN: usize = 16;
const TAG_LEN: usize = 16;

const CHECK_LABEL: &str = "graphsync envelope key check v1";
const SUBKEY_LABEL: &str = "graphsync envelope subkey v1";

/// True if `data` starts with the envelope magic
#[must_use]
pub fn is_envelope(data: &[u8]) -> bool {
    data.starts_with(MAGIC)
}

/// Passphrase and key based content encryption
#[derive(Debug, Clone)]
pub struct ContentCrypto {
    params: KdfParams,
    max_m_cost: u32,
}

impl Default for ContentCrypto {
    fn default() -> Self {
        Self::from_config(&CryptoConfig::default())
    }
}

impl ContentCrypto {
    pub fn new(params: KdfParams, max_m_cost: u32) -> Self {
        Self { params, max_m_cost }
    }

    pub fn from_config(cfg: &CryptoConfig) -> Self {
        Self::new(KdfParams::from(cfg), cfg.max_kdf_memory_kib)
    }

    /// Seal `plaintext` under a key stretched from `passphrase`
    ///
    /// # Errors
    /// `InvalidInput` for an empty passphrase, `RandomnessUnavailable` if the
    /// CSPRNG fails
    pub fn encrypt_with_passphrase(&self, passphrase: &str, plaintext: &[u8]) -> Result<Vec<u8>> {
        if passphrase.is_empty() {
            return Err(CryptoError::InvalidInput(
                "passphrase must not be empty".to_string(),
            ));
        }
        self.params.validate(self.max_m_cost)?;

        let mut salt = [0u8; SALT_LEN];
        fill_random(&mut salt)?;
        let key = derive_key(passphrase.as_bytes(), &salt, &self.params)?;

        let mut header = header_prefix(MODE_PASSPHRASE);
        header.extend_from_slice(&self.params.m_cost.to_le_bytes());
        header.extend_from_slice(&self.params.t_cost.to_le_bytes());
        header.extend_from_slice(&self.params.p_cost.to_le_bytes());
        seal(header, &salt, &key, plaintext)
    }

    /// Open an envelope produced by [`ContentCrypto::encrypt_with_passphrase`]
    ///
    /// # Errors
    /// `WrongPassphrase` when the key check fails, `CorruptData` for malformed
    /// or tampered envelopes, `UnsupportedVersion` for unknown format versions
    pub fn decrypt_with_passphrase(&self, passphrase: &str, envelope: &[u8]) -> Result<Vec<u8>> {
        let mut reader = Reader::new(envelope)?;
        let mode = reader.mode()?;
        if mode != MODE_PASSPHRASE {
            return Err(CryptoError::InvalidInput(
                "envelope is sealed with a graph key, not a passphrase".to_string(),
            ));
        }
        let params = KdfParams {
            m_cost: reader.u32()?,
            t_cost: reader.u32()?,
            p_cost: reader.u32()?,
        };
        params.validate(self.max_m_cost)?;
        let salt = reader.take(SALT_LEN)?;
        let key = derive_key(passphrase.as_bytes(), salt, &params)?;
        open(reader, &key)
    }

    /// Seal `plaintext` under a per-envelope subkey of `key`
    ///
    /// # Errors
    /// `RandomnessUnavailable` if the CSPRNG fails
    pub fn encrypt_with_key(&self, key: &SymmetricKey, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut salt = [0u8; SALT_LEN];
        fill_random(&mut salt)?;
        let subkey = derive_labeled(SUBKEY_LABEL, &[key.as_bytes(), &salt]);
        seal(header_prefix(MODE_KEY), &salt, &subkey, plaintext)
    }

    /// Open an envelope produced by [`ContentCrypto::encrypt_with_key`]
    ///
    /// # Errors
    /// Same classes as [`ContentCrypto::decrypt_with_passphrase`]
    pub fn decrypt_with_key(&self, key: &SymmetricKey, envelope: &[u8]) -> Result<Vec<u8>> {
        let mut reader = Reader::new(envelope)?;
        let mode = reader.mode()?;
        if mode != MODE_KEY {
            return Err(CryptoError::InvalidInput(
                "envelope is sealed with a passphrase, not a graph key".to_string(),
            ));
        }
        let salt = reader.take(SALT_LEN)?;
        let subkey = derive_labeled(SUBKEY_LABEL, &[key.as_bytes(), salt]);
        open(reader, &subkey)
    }
}

fn header_prefix(mode: u8) -> Vec<u8> {
    let mut header = Vec::with_capacity(64);
    header.extend_from_slice(MAGIC);
    header.push(VERSION);
    header.push(mode);
    header
}

fn key_check(key: &SymmetricKey) -> [u8; CHECK_LEN] {
    let digest = derive_labeled(CHECK_LABEL, &[key.as_bytes()]);
    let mut check = [0u8; CHECK_LEN];
    check.copy_from_slice(&digest.as_bytes()[..CHECK_LEN]);
    check
}

fn seal(mut header: Vec<u8>, salt: &[u8], key: &SymmetricKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    let mut nonce = [0u8; NONCE_LEN];
    fill_random(&mut nonce)?;

    header.extend_from_slice(salt);
    header.extend_from_slice(&nonce);
    header.extend_from_slice(&key_check(key));

    let cipher = ChaCha20Poly1305::new(key.as_bytes().into());
    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad: &header,
            },
        )
        .map_err(|_| CryptoError::InvalidInput("plaintext too large to seal".to_string()))?;

    header.extend_from_slice(&ciphertext);
    Ok(header)
}

fn open(mut reader: Reader<'_>, key: &SymmetricKey) -> Result<Vec<u8>> {
    let nonce = reader.take(NONCE_LEN)?;
    let check = reader.take(CHECK_LEN)?;
    let header_len = reader.pos;

    if check != key_check(key) {
        return Err(CryptoError::WrongPassphrase);
    }

    let ciphertext = reader.rest();
    if ciphertext.len() < TAG_LEN {
        return Err(CryptoError::CorruptData(
            "ciphertext shorter than authentication tag".to_string(),
        ));
    }

    let cipher = ChaCha20Poly1305::new(key.as_bytes().into());
    cipher
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad: &reader.data[..header_len],
            },
        )
        .map_err(|_| CryptoError::CorruptData("authentication tag mismatch".to_string()))
}

/// Bounds-checked cursor over an envelope
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    /// Checks the magic and version, leaving the cursor on the mode byte
    fn new(data: &'a [u8]) -> Result<Self> {
        if !is_envelope(data) {
            return Err(CryptoError::CorruptData(
                "not a graphsync envelope".to_string(),
            ));
        }
        let mut reader = Self {
            data,
            pos: MAGIC.len(),
        };
        let version = reader.take(1)?[0];
        if version != VERSION {
            return Err(CryptoError::UnsupportedVersion(version));
        }
        Ok(reader)
    }

    fn mode(&mut self) -> Result<u8> {
        match self.take(1)?[0] {
            m @ (MODE_PASSPHRASE | MODE_KEY) => Ok(m),
            other => Err(CryptoError::CorruptData(format!(
                "unknown envelope mode {other}"
            ))),
        }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| CryptoError::CorruptData("envelope truncated".to_string()))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u32(&mut self) -> Result<u32> {
        let bytes = self.take(4)?;
        let mut buf = [0u8; 4];
        buf.copy_from_slice(bytes);
        Ok(u32::from_le_bytes(buf))
    }

    fn rest(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }
}
