//! `KeyVault`: the front-end API over derivation, sealing, storage,
//! backups and approvals.
//!
//! Passwords arrive as `SecretString` and are exposed only for the duration
//! of a KDF call. Nothing here performs network I/O.

use chrono::Utc;
use parking_lot::Mutex;
use secp256k1::{ecdsa::Signature, PublicKey};
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::core::config::VaultConfig;
use crate::core::domain::{Chain, Curve};
use crate::core::errors::WalletError;
use crate::core::key_management::{generate_mnemonic, seed_from_mnemonic, MnemonicPhrase};
use crate::core::key_manager::{ChainKey, KeyDerivationEngine};
use crate::core::validation::{validate_display_name, validate_path_component};
use crate::core::wallet::{new_wallet_id, seal_chain_key, unlock_record};
use crate::core::wallet_info::{BalanceCache, WalletMetadata, WalletRecord};
use crate::crypto::kdf::KdfParams;
use crate::crypto::multisig::{ApprovalRequest, ApprovalStatus, ApprovalWorkflow, Clock, Operation, SystemClock};
use crate::security::redaction::short_id;
use crate::storage::archive::{self, ArchiveHeader, RestoreReport};
use crate::storage::{atomic_write, WalletStore};

/// Key material for `import_wallet`.
pub enum ImportSource {
    Mnemonic { phrase: SecretString, passphrase: SecretString },
    /// 32-byte private key, hex with optional `0x`. Solana also accepts the
    /// 64-byte `secret || public` keypair form.
    PrivateKeyHex(SecretString),
}

impl fmt::Debug for ImportSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportSource::Mnemonic { .. } => f.write_str("ImportSource::Mnemonic([REDACTED])"),
            ImportSource::PrivateKeyHex(_) => f.write_str("ImportSource::PrivateKeyHex([REDACTED])"),
        }
    }
}

/// Result of `create_wallet`. The phrase is shown to the user once and
/// never stored.
#[derive(Debug)]
pub struct CreatedWallet {
    pub wallet: WalletMetadata,
    pub mnemonic: MnemonicPhrase,
}

pub struct KeyVault {
    config: VaultConfig,
    engine: KeyDerivationEngine,
    store: WalletStore,
    kdf: KdfParams,
    approvals: Mutex<ApprovalWorkflow>,
}

impl fmt::Debug for KeyVault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyVault")
            .field("root", &self.store.root())
            .field("kdf", &self.kdf.name())
            .field("path_table", &self.engine.path_table().version())
            .finish_non_exhaustive()
    }
}

fn password_bytes(password: &SecretString) -> Result<&[u8], WalletError> {
    let bytes = password.expose_secret().as_bytes();
    if bytes.is_empty() {
        return Err(WalletError::InvalidParameters("password must not be empty".into()));
    }
    Ok(bytes)
}

impl KeyVault {
    pub fn open(config: VaultConfig) -> Result<Self, WalletError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Same as `open` with an injected approval clock.
    pub fn with_clock(config: VaultConfig, clock: Arc<dyn Clock>) -> Result<Self, WalletError> {
        config.validate()?;
        let engine = KeyDerivationEngine::new(config.derivation.path_table()?);
        let kdf = config.kdf.params()?;
        let policy = config.approval.policy()?;
        let store = WalletStore::open(&config.storage.root)?;
        info!(root = %config.storage.root.display(), kdf = kdf.name(), "key vault opened");
        Ok(Self { config, engine, store, kdf, approvals: Mutex::new(ApprovalWorkflow::new(policy, clock)) })
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    pub fn engine(&self) -> &KeyDerivationEngine {
        &self.engine
    }

    pub fn store(&self) -> &WalletStore {
        &self.store
    }

    fn persist_new(
        &self,
        agent_id: &str,
        display_name: &str,
        key: &ChainKey,
        is_imported: bool,
        password: &SecretString,
    ) -> Result<WalletRecord, WalletError> {
        validate_path_component(agent_id)?;
        if let Some(existing) = self.store.find_by_address(agent_id, key.chain(), key.address())? {
            return Err(WalletError::AlreadyExists(format!("{} wallet {}", key.chain(), existing.id)));
        }
        let id = new_wallet_id();
        let mut record =
            seal_chain_key(&id, display_name, key, is_imported, password_bytes(password)?, &self.kdf, Utc::now())?;
        self.store.insert(agent_id, &mut record)?;
        Ok(record)
    }

    /// Generates a fresh mnemonic and stores the chain key derived from it.
    pub fn create_wallet(
        &self,
        agent_id: &str,
        display_name: &str,
        chain: Chain,
        word_count: usize,
        password: &SecretString,
    ) -> Result<CreatedWallet, WalletError> {
        validate_display_name(display_name)?;
        password_bytes(password)?;
        let mnemonic = generate_mnemonic(word_count)?;
        let seed = seed_from_mnemonic(mnemonic.as_str(), "")?;
        let key = self.engine.derive_for_chain(&seed, chain)?;
        let record = self.persist_new(agent_id, display_name, &key, false, password)?;
        info!(agent_id, wallet_id = %record.id, chain = %chain, address = %short_id(&record.address), "wallet created");
        Ok(CreatedWallet { wallet: record.metadata(), mnemonic })
    }

    pub fn import_wallet(
        &self,
        agent_id: &str,
        display_name: &str,
        chain: Chain,
        source: &ImportSource,
        password: &SecretString,
    ) -> Result<WalletMetadata, WalletError> {
        validate_display_name(display_name)?;
        password_bytes(password)?;
        let key = match source {
            ImportSource::Mnemonic { phrase, passphrase } => {
                let seed = seed_from_mnemonic(phrase.expose_secret(), passphrase.expose_secret())?;
                self.engine.derive_for_chain(&seed, chain)?
            }
            ImportSource::PrivateKeyHex(hex_key) => self.key_from_hex(chain, hex_key)?,
        };
        let record = self.persist_new(agent_id, display_name, &key, true, password)?;
        info!(agent_id, wallet_id = %record.id, chain = %chain, address = %short_id(&record.address), "wallet imported");
        Ok(record.metadata())
    }

    fn key_from_hex(&self, chain: Chain, hex_key: &SecretString) -> Result<ChainKey, WalletError> {
        let text = hex_key.expose_secret().trim();
        let text = text.strip_prefix("0x").unwrap_or(text);
        let bytes = Zeroizing::new(
            hex::decode(text).map_err(|_| WalletError::InvalidParameters("private key is not valid hex".into()))?,
        );
        match (chain.curve(), bytes.len()) {
            (_, 32) => self.engine.key_from_private_bytes(chain, &bytes),
            (Curve::Ed25519, 64) => {
                let key = self.engine.key_from_private_bytes(chain, &bytes[..32])?;
                if key.public_key() != &bytes[32..] {
                    return Err(WalletError::InvalidParameters("keypair public half does not match".into()));
                }
                Ok(key)
            }
            _ => Err(WalletError::InvalidParameters("private key must be 32 bytes".into())),
        }
    }

    pub fn list_wallets(&self, agent_id: &str) -> Result<Vec<WalletMetadata>, WalletError> {
        Ok(self.store.list(agent_id)?.iter().map(WalletRecord::metadata).collect())
    }

    pub fn get_wallet(&self, agent_id: &str, wallet_id: &str) -> Result<WalletRecord, WalletError> {
        self.store.load(agent_id, wallet_id)
    }

    pub fn rename_wallet(&self, agent_id: &str, wallet_id: &str, display_name: &str) -> Result<WalletMetadata, WalletError> {
        validate_display_name(display_name)?;
        let mut record = self.store.load(agent_id, wallet_id)?;
        record.display_name = display_name.trim().to_string();
        self.store.save(agent_id, &mut record)?;
        info!(agent_id, wallet_id, "wallet renamed");
        Ok(record.metadata())
    }

    /// Replaces the cached balance (decimal string in the chain's smallest unit).
    pub fn refresh_balance_cache(&self, agent_id: &str, wallet_id: &str, amount: &str) -> Result<BalanceCache, WalletError> {
        let cache = BalanceCache::new(amount, Utc::now())?;
        let mut record = self.store.load(agent_id, wallet_id)?;
        record.balance_cache = Some(cache.clone());
        self.store.save(agent_id, &mut record)?;
        Ok(cache)
    }

    pub fn delete_wallet(&self, agent_id: &str, wallet_id: &str) -> Result<(), WalletError> {
        self.store.delete(agent_id, wallet_id)
    }

    /// Opens the sealed key for a signing collaborator.
    pub fn unlock_chain_key(&self, agent_id: &str, wallet_id: &str, password: &SecretString) -> Result<ChainKey, WalletError> {
        let record = self.store.load(agent_id, wallet_id)?;
        let key = unlock_record(&self.engine, &record, password.expose_secret().as_bytes());
        if key.is_err() {
            warn!(agent_id, wallet_id, "wallet unlock failed");
        }
        key
    }

    /// Archives the agent's wallets (all, or the given ids) under `password`.
    pub fn export_backup(
        &self,
        agent_id: &str,
        wallet_ids: Option<&[String]>,
        password: &SecretString,
    ) -> Result<Vec<u8>, WalletError> {
        let records = match wallet_ids {
            None => self.store.list(agent_id)?,
            Some(ids) => ids.iter().map(|id| self.store.load(agent_id, id)).collect::<Result<Vec<_>, _>>()?,
        };
        let bytes = archive::create(&records, password_bytes(password)?, &self.kdf, Utc::now())?;
        info!(agent_id, wallets = records.len(), bytes = bytes.len(), "backup exported");
        Ok(bytes)
    }

    /// Exports and writes the archive to `path` atomically. An existing file
    /// at `path` is replaced only once the new archive is fully on disk.
    pub fn export_backup_to(
        &self,
        agent_id: &str,
        wallet_ids: Option<&[String]>,
        password: &SecretString,
        path: &Path,
    ) -> Result<usize, WalletError> {
        let bytes = self.export_backup(agent_id, wallet_ids, password)?;
        atomic_write(path, &bytes)?;
        info!(agent_id, path = %path.display(), "backup written");
        Ok(bytes.len())
    }

    pub fn preview_backup(&self, bytes: &[u8]) -> Result<ArchiveHeader, WalletError> {
        archive::read_metadata(bytes)
    }

    pub fn restore_backup(&self, agent_id: &str, bytes: &[u8], password: &SecretString) -> Result<RestoreReport, WalletError> {
        self.store.restore_backup(agent_id, bytes, password.expose_secret().as_bytes())
    }

    /// Explicit overwrite of local wallets from a backup.
    pub fn overwrite_from_backup(
        &self,
        agent_id: &str,
        bytes: &[u8],
        password: &SecretString,
        wallet_ids: &[String],
    ) -> Result<RestoreReport, WalletError> {
        self.store.overwrite_from_backup(agent_id, bytes, password.expose_secret().as_bytes(), wallet_ids)
    }

    /// Registers a compressed or uncompressed secp256k1 signer key.
    pub fn register_signer(&self, signer_id: &str, public_key: &[u8]) -> Result<(), WalletError> {
        let pubkey = PublicKey::from_slice(public_key)
            .map_err(|_| WalletError::InvalidParameters("invalid signer public key".into()))?;
        self.approvals.lock().register_signer(signer_id, pubkey)
    }

    pub fn create_approval(&self, operation: Operation, required_approvals: u8) -> Result<ApprovalRequest, WalletError> {
        self.approvals.lock().create_request(operation, required_approvals)
    }

    pub fn approve(&self, request_id: &str, signer_id: &str, signature: &Signature) -> Result<ApprovalStatus, WalletError> {
        self.approvals.lock().submit_approval(request_id, signer_id, signature)
    }

    pub fn reject(&self, request_id: &str, signer_id: &str, signature: &Signature) -> Result<ApprovalStatus, WalletError> {
        self.approvals.lock().submit_rejection(request_id, signer_id, signature)
    }

    pub fn approval_status(&self, request_id: &str) -> Result<ApprovalStatus, WalletError> {
        self.approvals.lock().status(request_id)
    }

    pub fn approval_request(&self, request_id: &str) -> Result<ApprovalRequest, WalletError> {
        self.approvals.lock().get(request_id)
    }

    pub fn expire_approvals(&self) -> Vec<String> {
        self.approvals.lock().expire_due()
    }

    /// Drops finished approval requests older than the configured retention.
    pub fn prune_approvals(&self) -> Vec<String> {
        self.approvals.lock().prune_terminal()
    }

    /// Requests currently held by the workflow, pending or finished.
    pub fn approval_count(&self) -> usize {
        self.approvals.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::KdfConfig;
    use crate::crypto::multisig::OperationKind;

    fn secret(s: &str) -> SecretString {
        SecretString::new(s.to_string())
    }

    fn vault(dir: &std::path::Path) -> KeyVault {
        let mut config = VaultConfig::default();
        config.storage.root = dir.to_path_buf();
        config.kdf = KdfConfig { argon2_m_cost_kib: 64, argon2_t_cost: 1, ..KdfConfig::default() };
        KeyVault::open(config).unwrap()
    }

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_vault_is_send_sync() {
        assert_send_sync::<KeyVault>();
    }

    #[test]
    fn test_create_then_unlock() {
        let dir = tempfile::tempdir().unwrap();
        let vault = vault(dir.path());
        let created = vault.create_wallet("agent", "main", Chain::Ethereum, 12, &secret("pw")).unwrap();
        assert_eq!(created.mnemonic.word_count(), 12);

        let key = vault.unlock_chain_key("agent", &created.wallet.id, &secret("pw")).unwrap();
        assert_eq!(key.address(), created.wallet.address);
        assert_eq!(key.path().unwrap().to_string(), "m/44'/60'/0'/0/0");

        assert_eq!(
            vault.unlock_chain_key("agent", &created.wallet.id, &secret("bad")).unwrap_err(),
            WalletError::AuthenticationFailed
        );
    }

    #[test]
    fn test_duplicate_import_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let vault = vault(dir.path());
        let source = ImportSource::PrivateKeyHex(secret(
            "0x0000000000000000000000000000000000000000000000000000000000000001",
        ));
        let meta = vault.import_wallet("agent", "one", Chain::Ethereum, &source, &secret("pw")).unwrap();
        assert!(meta.is_imported);
        assert!(meta.derivation_path.is_none());
        assert!(matches!(
            vault.import_wallet("agent", "again", Chain::Ethereum, &source, &secret("pw")),
            Err(WalletError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_rejects_empty_password_and_bad_hex() {
        let dir = tempfile::tempdir().unwrap();
        let vault = vault(dir.path());
        assert!(matches!(
            vault.create_wallet("agent", "main", Chain::Bitcoin, 12, &secret("")),
            Err(WalletError::InvalidParameters(_))
        ));
        let source = ImportSource::PrivateKeyHex(secret("zz"));
        assert!(matches!(
            vault.import_wallet("agent", "x", Chain::Bitcoin, &source, &secret("pw")),
            Err(WalletError::InvalidParameters(_))
        ));
        assert!(!format!("{:?}", source).contains("zz"));
    }

    #[test]
    fn test_rename_and_balance() {
        let dir = tempfile::tempdir().unwrap();
        let vault = vault(dir.path());
        let created = vault.create_wallet("agent", "main", Chain::Solana, 12, &secret("pw")).unwrap();
        let id = created.wallet.id.clone();

        assert_eq!(vault.rename_wallet("agent", &id, "savings").unwrap().display_name, "savings");
        vault.refresh_balance_cache("agent", &id, "42").unwrap();
        assert!(vault.refresh_balance_cache("agent", &id, "-1").is_err());

        let record = vault.get_wallet("agent", &id).unwrap();
        assert_eq!(record.display_name, "savings");
        assert_eq!(record.balance_cache.unwrap().amount, "42");
        // still unlocks after re-encoding
        assert!(vault.unlock_chain_key("agent", &id, &secret("pw")).is_ok());
    }

    #[test]
    fn test_approvals_through_vault() {
        let dir = tempfile::tempdir().unwrap();
        let vault = vault(dir.path());
        let engine = KeyDerivationEngine::default();
        let keys: Vec<ChainKey> = (1u8..=2)
            .map(|i| {
                let mut b = [0u8; 32];
                b[31] = i;
                engine.key_from_private_bytes(Chain::Ethereum, &b).unwrap()
            })
            .collect();
        vault.register_signer("a", keys[0].public_key()).unwrap();
        vault.register_signer("b", keys[1].public_key()).unwrap();

        let request = vault
            .create_approval(Operation::new(OperationKind::WalletExport, "agent", "all"), 2)
            .unwrap();
        assert_eq!(
            vault.approve(&request.id, "a", &request.sign_approval(&keys[0]).unwrap()).unwrap(),
            ApprovalStatus::Pending
        );
        assert_eq!(
            vault.approve(&request.id, "b", &request.sign_approval(&keys[1]).unwrap()).unwrap(),
            ApprovalStatus::Approved
        );
        assert_eq!(vault.approval_status(&request.id).unwrap(), ApprovalStatus::Approved);
        assert!(vault.expire_approvals().is_empty());
    }
}
