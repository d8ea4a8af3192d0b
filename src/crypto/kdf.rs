//! Password and key derivation.
//!
//! Password keys come from Argon2id (default) or scrypt with a fresh random
//! salt per envelope. Sub-keys of high-entropy material use HKDF-SHA256.

use argon2::{Algorithm, Argon2, Version};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::debug;
use zeroize::Zeroizing;

use crate::core::errors::WalletError;
use crate::security::secret::SecretKey32;

pub const SALT_LEN: usize = 32;

// upper bounds accepted when parsing parameters from untrusted envelopes
const ARGON2_MAX_M_COST_KIB: u32 = 1 << 20;
const ARGON2_MAX_T_COST: u32 = 64;
const ARGON2_MAX_P_COST: u32 = 16;
const SCRYPT_MAX_LOG_N: u8 = 20;
const SCRYPT_MAX_R: u32 = 32;
const SCRYPT_MAX_P: u32 = 16;

/// Password KDF and its cost parameters. Stored in every password envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KdfParams {
    Argon2id { m_cost_kib: u32, t_cost: u32, p_cost: u32 },
    Scrypt { log_n: u8, r: u32, p: u32 },
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::argon2id_default()
    }
}

impl KdfParams {
    /// Argon2id, m=19456 KiB, t=2, p=1.
    pub fn argon2id_default() -> Self {
        KdfParams::Argon2id { m_cost_kib: 19_456, t_cost: 2, p_cost: 1 }
    }

    /// scrypt, N=2^15, r=8, p=1.
    pub fn scrypt_default() -> Self {
        KdfParams::Scrypt { log_n: 15, r: 8, p: 1 }
    }

    pub fn name(&self) -> &'static str {
        match self {
            KdfParams::Argon2id { .. } => "argon2id",
            KdfParams::Scrypt { .. } => "scrypt",
        }
    }

    /// Rejects cost parameters outside the supported range.
    pub fn validate(&self) -> Result<(), WalletError> {
        let ok = match *self {
            KdfParams::Argon2id { m_cost_kib, t_cost, p_cost } => {
                (1..=ARGON2_MAX_P_COST).contains(&p_cost)
                    && (1..=ARGON2_MAX_T_COST).contains(&t_cost)
                    && m_cost_kib >= 8 * p_cost
                    && m_cost_kib <= ARGON2_MAX_M_COST_KIB
            }
            KdfParams::Scrypt { log_n, r, p } => {
                (1..=SCRYPT_MAX_LOG_N).contains(&log_n)
                    && (1..=SCRYPT_MAX_R).contains(&r)
                    && (1..=SCRYPT_MAX_P).contains(&p)
            }
        };
        if ok {
            Ok(())
        } else {
            Err(WalletError::InvalidParameters(format!("{} parameters out of range", self.name())))
        }
    }
}

/// Fresh random salt from the OS generator.
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Stretches `password` into a 256-bit key.
pub fn derive_password_key(password: &[u8], salt: &[u8], params: &KdfParams) -> Result<SecretKey32, WalletError> {
    params.validate()?;
    let mut key = Zeroizing::new([0u8; 32]);
    match *params {
        KdfParams::Argon2id { m_cost_kib, t_cost, p_cost } => {
            debug!(m_cost_kib, t_cost, p_cost, "deriving key with argon2id");
            let argon_params = argon2::Params::new(m_cost_kib, t_cost, p_cost, Some(32))
                .map_err(|e| WalletError::InvalidParameters(format!("argon2 params: {}", e)))?;
            Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params)
                .hash_password_into(password, salt, &mut key[..])
                .map_err(|e| WalletError::InvalidParameters(format!("argon2: {}", e)))?;
        }
        KdfParams::Scrypt { log_n, r, p } => {
            debug!(log_n, r, p, "deriving key with scrypt");
            let scrypt_params = scrypt::Params::new(log_n, r, p, 32)
                .map_err(|e| WalletError::InvalidParameters(format!("scrypt params: {}", e)))?;
            scrypt::scrypt(password, salt, &scrypt_params, &mut key[..])
                .map_err(|e| WalletError::InvalidParameters(format!("scrypt: {}", e)))?;
        }
    }
    Ok(key)
}

/// HKDF-SHA256 expand of high-entropy input keying material.
pub fn hkdf_sha256(ikm: &[u8], salt: Option<&[u8]>, info: &[u8]) -> Result<SecretKey32, WalletError> {
    let hk = Hkdf::<Sha256>::new(salt, ikm);
    let mut okm = Zeroizing::new([0u8; 32]);
    hk.expand(info, &mut okm[..])
        .map_err(|_| WalletError::InvalidParameters("hkdf output length".into()))?;
    Ok(okm)
}
