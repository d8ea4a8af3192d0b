//! Signer registry: signer id -> secp256k1 verification key.

use secp256k1::PublicKey;
use std::collections::BTreeMap;

use crate::core::errors::WalletError;
use crate::core::validation::validate_path_component;

#[derive(Debug, Clone, Default)]
pub struct SignerRegistry {
    signers: BTreeMap<String, PublicKey>,
}

impl SignerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers or replaces the key for `signer_id`.
    pub fn register(&mut self, signer_id: &str, pubkey: PublicKey) -> Result<(), WalletError> {
        validate_path_component(signer_id)
            .map_err(|_| WalletError::InvalidParameters("signer id must match [A-Za-z0-9_-]{1,64}".into()))?;
        self.signers.insert(signer_id.to_string(), pubkey);
        Ok(())
    }

    pub fn get(&self, signer_id: &str) -> Result<&PublicKey, WalletError> {
        self.signers
            .get(signer_id)
            .ok_or_else(|| WalletError::UnknownSigner(signer_id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.signers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signers.is_empty()
    }
}
