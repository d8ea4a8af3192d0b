// filepath: src/core/wallet/create.rs
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::debug;
use uuid::Uuid;

use crate::core::errors::WalletError;
use crate::core::key_manager::ChainKey;
use crate::core::validation::{validate_display_name, validate_path_component};
use crate::core::wallet_info::{secret_aad, WalletRecord};
use crate::crypto::envelope::seal_with_password;
use crate::crypto::kdf::KdfParams;

/// Fresh wallet id: 32 lowercase hex chars, always a valid path component.
pub fn new_wallet_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Seals `key` under `password` and wraps it in a new record.
///
/// The integrity tag is left zeroed; the record codec fills it.
pub fn seal_chain_key(
    id: &str,
    display_name: &str,
    key: &ChainKey,
    is_imported: bool,
    password: &[u8],
    params: &KdfParams,
    created_at: DateTime<Utc>,
) -> Result<WalletRecord, WalletError> {
    validate_path_component(id)?;
    validate_display_name(display_name)?;
    if password.is_empty() {
        return Err(WalletError::InvalidParameters("password must not be empty".into()));
    }

    let aad = secret_aad(id, key.chain(), key.address());
    let secret = seal_with_password(key.private_key(), password, &aad, params)?;
    debug!(wallet_id = id, chain = %key.chain(), kdf = params.name(), "sealed chain key");

    let record = WalletRecord {
        id: id.to_string(),
        display_name: display_name.trim().to_string(),
        chain: key.chain(),
        address: key.address().to_string(),
        derivation_path: key.path().cloned(),
        is_imported,
        created_at,
        balance_cache: None,
        secret,
        extensions: BTreeMap::new(),
        integrity_tag: [0u8; 32],
    };
    record.validate()?;
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::Chain;
    use crate::core::key_manager::KeyDerivationEngine;

    const FAST: KdfParams = KdfParams::Argon2id { m_cost_kib: 64, t_cost: 1, p_cost: 1 };

    #[test]
    fn test_wallet_id_shape() {
        let id = new_wallet_id();
        assert_eq!(id.len(), 32);
        assert!(validate_path_component(&id).is_ok());
        assert_ne!(id, new_wallet_id());
    }

    #[test]
    fn test_seal_rejects_empty_password() {
        let mut one = [0u8; 32];
        one[31] = 1;
        let key = KeyDerivationEngine::default().key_from_private_bytes(Chain::Ethereum, &one).unwrap();
        let err = seal_chain_key("w1", "main", &key, true, b"", &FAST, Utc::now()).unwrap_err();
        assert!(matches!(err, WalletError::InvalidParameters(_)));
    }

    #[test]
    fn test_sealed_record_hides_key() {
        let mut one = [0u8; 32];
        one[31] = 1;
        let key = KeyDerivationEngine::default().key_from_private_bytes(Chain::Bitcoin, &one).unwrap();
        let record = seal_chain_key("w1", " cold ", &key, true, b"pw", &FAST, Utc::now()).unwrap();
        assert_eq!(record.display_name, "cold");
        assert_eq!(record.address, "1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH");
        assert!(record.derivation_path.is_none());
        assert_ne!(record.secret.ciphertext.as_slice(), &one[..]);
    }
}
