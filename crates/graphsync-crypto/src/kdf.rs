//! Argon2id key derivation for passphrase envelopes.
//!
//! Uses Argon2id v0x13 with a 32-byte output. The cost parameters travel
//! inside each envelope, so a decrypting side only needs an upper bound on
//! how much memory it is willing to spend.

use argon2::{Algorithm, Argon2, Params, Version};
use graphsync_core::config::CryptoConfig;

use crate::keys::SymmetricKey;
use crate::{CryptoError, Result};

/// Argon2id cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    /// Memory cost in KiB
    pub m_cost: u32,
    /// Number of iterations
    pub t_cost: u32,
    /// Number of lanes
    pub p_cost: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            m_cost: 19_456,
            t_cost: 2,
            p_cost: 1,
        }
    }
}

impl From<&CryptoConfig> for KdfParams {
    fn from(cfg: &CryptoConfig) -> Self {
        Self {
            m_cost: cfg.kdf_memory_kib,
            t_cost: cfg.kdf_iterations,
            p_cost: cfg.kdf_parallelism,
        }
    }
}

impl KdfParams {
    /// Smallest parameters Argon2 accepts; only meant for tests
    pub const MINIMAL: KdfParams = KdfParams {
        m_cost: 8,
        t_cost: 1,
        p_cost: 1,
    };

    /// Check the parameters are usable and within `max_m_cost`
    ///
    /// # Errors
    /// Returns `CryptoError::CorruptData` for zero, undersized or oversized costs
    pub fn validate(&self, max_m_cost: u32) -> Result<()> {
        if self.p_cost == 0 || self.t_cost == 0 {
            return Err(CryptoError::CorruptData(
                "KDF time and parallelism must be at least 1".to_string(),
            ));
        }
        if self.m_cost < 8 * self.p_cost {
            return Err(CryptoError::CorruptData(format!(
                "KDF memory {} KiB below minimum for {} lanes",
                self.m_cost, self.p_cost
            )));
        }
        if self.m_cost > max_m_cost {
            return Err(CryptoError::CorruptData(format!(
                "KDF memory {} KiB exceeds limit of {} KiB",
                self.m_cost, max_m_cost
            )));
        }
        Ok(())
    }
}

/// Stretch a passphrase into a 32-byte key
///
/// # Errors
/// Returns `CryptoError::InvalidInput` if Argon2 rejects the inputs
pub fn derive_key(passphrase: &[u8], salt: &[u8], params: &KdfParams) -> Result<SymmetricKey> {
    let argon_params = Params::new(params.m_cost, params.t_cost, params.p_cost, Some(32))
        .map_err(|e| CryptoError::InvalidInput(format!("Invalid KDF parameters: {e}")))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);

    let mut out = [0u8; 32];
    argon2
        .hash_password_into(passphrase, salt, &mut out)
        .map_err(|e| CryptoError::InvalidInput(format!("Key derivation failed: {e}")))?;

    Ok(SymmetricKey::from_bytes(out))
}
