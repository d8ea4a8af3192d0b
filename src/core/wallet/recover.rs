// filepath: src/core/wallet/recover.rs
use tracing::warn;

use crate::core::errors::WalletError;
use crate::core::key_manager::{ChainKey, KeyDerivationEngine};
use crate::core::wallet_info::WalletRecord;
use crate::crypto::envelope::open_with_password;
use crate::security::redaction::short_id;

/// Opens the record's sealed key and rebuilds the chain key.
///
/// A wrong password is `AuthenticationFailed`. A key that opens but does
/// not reproduce the stored address is `IntegrityCheckFailed`.
pub fn unlock_record(
    engine: &KeyDerivationEngine,
    record: &WalletRecord,
    password: &[u8],
) -> Result<ChainKey, WalletError> {
    let plaintext = open_with_password(&record.secret, password, &record.secret_aad())?;
    let key = engine.key_from_stored(record.chain, record.derivation_path.clone(), &plaintext)?;
    if key.address() != record.address {
        warn!(wallet_id = %record.id, address = %short_id(&record.address), "unsealed key does not match record address");
        return Err(WalletError::IntegrityCheckFailed);
    }
    Ok(key)
}
