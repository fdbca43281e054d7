//! graphsync crypto - keyed, reversible transforms for everything that
//! leaves the machine
//!
//! - [`envelope`] - passphrase or key sealed content envelopes (Argon2id + ChaCha20-Poly1305)
//! - [`fname`] - deterministic whole-path filename encryption
//! - [`keys`] - X25519 key generation and text encodings
//! - [`context`] - per-graph [`EncryptionContext`] bundling the derived keys
//!
//! Failures use [`graphsync_core::domain::CryptoError`] so that callers can
//! tell a wrong passphrase from damaged data.

pub mod context;
pub mod envelope;
pub mod fname;
pub mod kdf;
pub mod keys;

pub use context::EncryptionContext;
pub use envelope::{is_envelope, ContentCrypto};
pub use fname::FilenameCodec;
pub use graphsync_core::domain::CryptoError;
pub use kdf::KdfParams;
pub use keys::{KeyManager, Keypair, PublicKey, SecretKey, SymmetricKey};

/// Result type for crypto operations
pub type Result<T> = std::result::Result<T, CryptoError>;

/// Fill `buf` from the operating system's CSPRNG
///
/// # Errors
/// Returns `CryptoError::RandomnessUnavailable` if the source fails
pub(crate) fn fill_random(buf: &mut [u8]) -> Result<()> {
    use rand::RngCore;

    rand::rngs::OsRng
        .try_fill_bytes(buf)
        .map_err(|_| CryptoError::RandomnessUnavailable)
}
