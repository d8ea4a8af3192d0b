//! Authenticated encryption of secret payloads.
//!
//! AES-256-GCM with a fresh 96-bit nonce per seal and a detached 128-bit tag.
//! Password envelopes carry their KDF parameters and a per-envelope salt so
//! they open without outside context. Key and plaintext are always
//! independent inputs.
//!
//! Wire form: `version (1 byte) || bincode(body)`.

use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce, Tag};
use bincode::Options;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::core::errors::WalletError;
use crate::crypto::kdf::{derive_password_key, generate_salt, KdfParams, SALT_LEN};
use crate::security::secret::SecretVec;

pub const ENVELOPE_VERSION: u8 = 1;
pub const ALG_AES_256_GCM: u8 = 1;
pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

/// Largest payload accepted when parsing an envelope.
pub const MAX_CIPHERTEXT_LEN: usize = 16 * 1024 * 1024;

/// Sealed secret. Fields are public for inspection; only `open_*` yields plaintext.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct EncryptedEnvelope {
    pub version: u8,
    pub algorithm: u8,
    /// `None` when sealed under a raw key.
    #[zeroize(skip)]
    pub kdf: Option<KdfParams>,
    pub salt: Vec<u8>,
    pub nonce: [u8; NONCE_LEN],
    pub ciphertext: Vec<u8>,
    pub tag: [u8; TAG_LEN],
}

impl std::fmt::Debug for EncryptedEnvelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedEnvelope")
            .field("version", &self.version)
            .field("algorithm", &self.algorithm)
            .field("kdf", &self.kdf)
            .field("ciphertext_len", &self.ciphertext.len())
            .finish_non_exhaustive()
    }
}

#[derive(Serialize, Deserialize)]
struct EnvelopeBody {
    algorithm: u8,
    kdf: Option<KdfParams>,
    salt: Vec<u8>,
    nonce: [u8; NONCE_LEN],
    ciphertext: Vec<u8>,
    tag: [u8; TAG_LEN],
}

pub(crate) fn bincode_options(limit: u64) -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_limit(limit)
        .reject_trailing_bytes()
}

impl EncryptedEnvelope {
    /// Shape checks shared by the parser and by record validation.
    pub fn validate(&self) -> Result<(), WalletError> {
        if self.version != ENVELOPE_VERSION {
            return Err(WalletError::UnsupportedAlgorithmVersion(self.version));
        }
        if self.algorithm != ALG_AES_256_GCM {
            return Err(WalletError::UnsupportedAlgorithmVersion(self.algorithm));
        }
        match &self.kdf {
            Some(params) => {
                params
                    .validate()
                    .map_err(|_| WalletError::MalformedEnvelope("kdf parameters out of range".into()))?;
                if self.salt.len() != SALT_LEN {
                    return Err(WalletError::MalformedEnvelope("salt length".into()));
                }
            }
            None if !self.salt.is_empty() => {
                return Err(WalletError::MalformedEnvelope("unexpected salt".into()));
            }
            None => {}
        }
        if self.ciphertext.len() > MAX_CIPHERTEXT_LEN {
            return Err(WalletError::MalformedEnvelope("ciphertext too large".into()));
        }
        Ok(())
    }

    pub fn is_password_sealed(&self) -> bool {
        self.kdf.is_some()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, WalletError> {
        let body = EnvelopeBody {
            algorithm: self.algorithm,
            kdf: self.kdf,
            salt: self.salt.clone(),
            nonce: self.nonce,
            ciphertext: self.ciphertext.clone(),
            tag: self.tag,
        };
        let encoded = bincode_options(MAX_CIPHERTEXT_LEN as u64 * 2)
            .serialize(&body)
            .map_err(|e| WalletError::MalformedEnvelope(e.to_string()))?;
        let mut out = Vec::with_capacity(1 + encoded.len());
        out.push(self.version);
        out.extend_from_slice(&encoded);
        Ok(out)
    }

    /// Strict parse: known version, bounded size, no trailing bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WalletError> {
        let (&version, rest) = bytes
            .split_first()
            .ok_or_else(|| WalletError::MalformedEnvelope("empty envelope".into()))?;
        if version != ENVELOPE_VERSION {
            return Err(WalletError::UnsupportedAlgorithmVersion(version));
        }
        let body: EnvelopeBody = bincode_options(MAX_CIPHERTEXT_LEN as u64 * 2)
            .deserialize(rest)
            .map_err(|e| WalletError::MalformedEnvelope(e.to_string()))?;
        let env = EncryptedEnvelope {
            version,
            algorithm: body.algorithm,
            kdf: body.kdf,
            salt: body.salt,
            nonce: body.nonce,
            ciphertext: body.ciphertext,
            tag: body.tag,
        };
        env.validate()?;
        Ok(env)
    }
}

fn encrypt(
    key: &[u8; 32],
    plaintext: &[u8],
    aad: &[u8],
    kdf: Option<KdfParams>,
    salt: Vec<u8>,
) -> Result<EncryptedEnvelope, WalletError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| WalletError::InvalidParameters("key length".into()))?;
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let mut buf = Zeroizing::new(plaintext.to_vec());
    let tag = cipher
        .encrypt_in_place_detached(Nonce::from_slice(&nonce), aad, buf.as_mut_slice())
        .map_err(|_| WalletError::InvalidParameters("payload too large".into()))?;
    let mut tag_bytes = [0u8; TAG_LEN];
    tag_bytes.copy_from_slice(&tag);

    Ok(EncryptedEnvelope {
        version: ENVELOPE_VERSION,
        algorithm: ALG_AES_256_GCM,
        kdf,
        salt,
        nonce,
        ciphertext: buf.to_vec(),
        tag: tag_bytes,
    })
}

fn decrypt(key: &[u8; 32], envelope: &EncryptedEnvelope, aad: &[u8]) -> Result<SecretVec, WalletError> {
    envelope.validate().map_err(|_| WalletError::AuthenticationFailed)?;
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| WalletError::AuthenticationFailed)?;
    let mut buf = Zeroizing::new(envelope.ciphertext.clone());
    cipher
        .decrypt_in_place_detached(
            Nonce::from_slice(&envelope.nonce),
            aad,
            buf.as_mut_slice(),
            Tag::from_slice(&envelope.tag),
        )
        .map_err(|_| WalletError::AuthenticationFailed)?;
    Ok(buf)
}

/// Seals `plaintext` under a raw 256-bit key.
pub fn seal_with_key(plaintext: &[u8], key: &[u8; 32], aad: &[u8]) -> Result<EncryptedEnvelope, WalletError> {
    encrypt(key, plaintext, aad, None, Vec::new())
}

/// Opens a raw-key envelope. Any mismatch is `AuthenticationFailed`.
pub fn open_with_key(envelope: &EncryptedEnvelope, key: &[u8; 32], aad: &[u8]) -> Result<SecretVec, WalletError> {
    if envelope.is_password_sealed() {
        return Err(WalletError::AuthenticationFailed);
    }
    decrypt(key, envelope, aad)
}

/// Seals `plaintext` under a key stretched from `password` with a fresh salt.
pub fn seal_with_password(
    plaintext: &[u8],
    password: &[u8],
    aad: &[u8],
    params: &KdfParams,
) -> Result<EncryptedEnvelope, WalletError> {
    let salt = generate_salt();
    let key = derive_password_key(password, &salt, params)?;
    encrypt(&key, plaintext, aad, Some(*params), salt.to_vec())
}

/// Opens a password envelope using the parameters it carries.
pub fn open_with_password(envelope: &EncryptedEnvelope, password: &[u8], aad: &[u8]) -> Result<SecretVec, WalletError> {
    let params = envelope.kdf.ok_or(WalletError::AuthenticationFailed)?;
    envelope.validate().map_err(|_| WalletError::AuthenticationFailed)?;
    let key = derive_password_key(password, &envelope.salt, &params).map_err(|_| WalletError::AuthenticationFailed)?;
    decrypt(&key, envelope, aad)
}
