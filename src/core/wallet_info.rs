// src/core/wallet_info.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::bip44::DerivationPath;
use crate::core::domain::Chain;
use crate::core::errors::WalletError;
use crate::core::validation::{validate_address, validate_display_name, validate_path_component};
use crate::crypto::envelope::EncryptedEnvelope;

/// Domain tag for the AAD binding a sealed private key to its record.
const SECRET_AAD_DOMAIN: &[u8] = b"WKC-SECRET-V1";

pub const MAX_EXTENSIONS: usize = 64;
pub const MAX_EXTENSION_LEN: usize = 64 * 1024;

/// Last known balance. Informational only, never used for signing decisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceCache {
    /// Decimal string in the chain's smallest unit (wei, satoshi, lamport).
    pub amount: String,
    pub updated_at: DateTime<Utc>,
}

impl BalanceCache {
    pub fn new(amount: impl Into<String>, updated_at: DateTime<Utc>) -> Result<Self, WalletError> {
        let cache = Self { amount: amount.into(), updated_at };
        cache.validate()?;
        Ok(cache)
    }

    pub fn validate(&self) -> Result<(), WalletError> {
        // 78 digits covers u256
        if self.amount.is_empty() || self.amount.len() > 78 || !self.amount.bytes().all(|b| b.is_ascii_digit()) {
            return Err(WalletError::InvalidParameters("balance must be a decimal integer string".into()));
        }
        Ok(())
    }
}

/// Persisted wallet: public metadata plus the password-sealed private key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletRecord {
    pub id: String,
    pub display_name: String,
    pub chain: Chain,
    pub address: String,
    /// `None` for raw private-key imports.
    pub derivation_path: Option<DerivationPath>,
    pub is_imported: bool,
    pub created_at: DateTime<Utc>,
    pub balance_cache: Option<BalanceCache>,
    pub secret: EncryptedEnvelope,
    /// Opaque forward-compatible fields, carried untouched.
    pub extensions: BTreeMap<String, Vec<u8>>,
    /// HMAC over the encoded record. Filled by the codec; not part of the body.
    #[serde(skip)]
    pub integrity_tag: [u8; 32],
}

impl WalletRecord {
    /// AAD for the sealed private key: binds it to this record's identity.
    pub fn secret_aad(&self) -> Vec<u8> {
        secret_aad(&self.id, self.chain, &self.address)
    }

    /// Public view used in listings and backup headers.
    pub fn metadata(&self) -> WalletMetadata {
        WalletMetadata {
            id: self.id.clone(),
            display_name: self.display_name.clone(),
            chain: self.chain,
            address: self.address.clone(),
            derivation_path: self.derivation_path.clone(),
            is_imported: self.is_imported,
            created_at: self.created_at,
        }
    }

    /// Semantic checks applied after every decode.
    pub fn validate(&self) -> Result<(), WalletError> {
        let malformed = |msg: &str| WalletError::MalformedRecord(msg.to_string());

        validate_path_component(&self.id).map_err(|_| malformed("invalid id"))?;
        validate_display_name(&self.display_name).map_err(|_| malformed("invalid display name"))?;
        validate_address(self.chain, &self.address).map_err(|_| malformed("address does not match chain"))?;

        match &self.derivation_path {
            Some(path) => path
                .check_curve(self.chain.curve())
                .map_err(|_| malformed("derivation path does not match chain"))?,
            None if !self.is_imported => return Err(malformed("derived wallet without a path")),
            None => {}
        }

        self.secret.validate().map_err(|e| WalletError::MalformedRecord(e.to_string()))?;
        if !self.secret.is_password_sealed() {
            return Err(malformed("secret must be password sealed"));
        }

        if let Some(cache) = &self.balance_cache {
            cache.validate().map_err(|_| malformed("invalid balance cache"))?;
        }

        if self.extensions.len() > MAX_EXTENSIONS {
            return Err(malformed("too many extensions"));
        }
        for (name, value) in &self.extensions {
            validate_path_component(name).map_err(|_| malformed("invalid extension name"))?;
            if value.len() > MAX_EXTENSION_LEN {
                return Err(malformed("extension too large"));
            }
        }
        Ok(())
    }
}

pub(crate) fn secret_aad(id: &str, chain: Chain, address: &str) -> Vec<u8> {
    let mut out = SECRET_AAD_DOMAIN.to_vec();
    for field in [id.as_bytes(), chain.as_str().as_bytes(), address.as_bytes()] {
        out.extend_from_slice(&(field.len() as u32).to_be_bytes());
        out.extend_from_slice(field);
    }
    out
}

/// Non-secret wallet description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletMetadata {
    pub id: String,
    pub display_name: String,
    pub chain: Chain,
    pub address: String,
    pub derivation_path: Option<DerivationPath>,
    pub is_imported: bool,
    pub created_at: DateTime<Utc>,
}
