//! File-backed wallet store.
//!
//! Layout under the root:
//! - `device.key`
//! - `agents/<agent_id>/wallets/<wallet_id>.wkr`
//!
//! Ids are checked against the path allow-list before any join.

pub mod archive;
pub mod codec;
pub mod device_key;

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::core::domain::Chain;
use crate::core::errors::WalletError;
use crate::core::validation::validate_path_component;
use crate::core::wallet_info::WalletRecord;

pub use archive::{ArchiveHeader, RestoreReport};
pub use codec::WalletRecordCodec;

pub const RECORD_EXTENSION: &str = "wkr";

#[derive(Debug)]
pub struct WalletStore {
    root: PathBuf,
    codec: WalletRecordCodec,
}

impl WalletStore {
    /// Opens (or initializes) a store rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, WalletError> {
        let root = root.as_ref().to_path_buf();
        let device_key = device_key::load_or_create(&root)?;
        let codec = WalletRecordCodec::from_device_key(&device_key)?;
        debug!(root = %root.display(), "opened wallet store");
        Ok(Self { root, codec })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn wallets_dir(&self, agent_id: &str) -> Result<PathBuf, WalletError> {
        validate_path_component(agent_id)?;
        Ok(self.root.join("agents").join(agent_id).join("wallets"))
    }

    fn record_path(&self, agent_id: &str, wallet_id: &str) -> Result<PathBuf, WalletError> {
        let dir = self.wallets_dir(agent_id)?;
        validate_path_component(wallet_id)?;
        Ok(dir.join(format!("{}.{}", wallet_id, RECORD_EXTENSION)))
    }

    pub fn exists(&self, agent_id: &str, wallet_id: &str) -> Result<bool, WalletError> {
        Ok(self.record_path(agent_id, wallet_id)?.exists())
    }

    /// Writes a new record; fails with `AlreadyExists` if the id is taken,
    /// including by a file that appears while the record is being written.
    pub fn insert(&self, agent_id: &str, record: &mut WalletRecord) -> Result<(), WalletError> {
        let path = self.record_path(agent_id, &record.id)?;
        self.codec.seal(record)?;
        let bytes = self.codec.encode(record)?;
        write_file(&path, &bytes, WriteMode::CreateNew).map_err(|e| match e {
            WalletError::AlreadyExists(_) => WalletError::AlreadyExists(record.id.clone()),
            other => other,
        })?;
        debug!(agent_id, wallet_id = %record.id, "inserted wallet record");
        Ok(())
    }

    /// Encodes and atomically writes `record`, refreshing its integrity tag.
    pub fn save(&self, agent_id: &str, record: &mut WalletRecord) -> Result<(), WalletError> {
        let path = self.record_path(agent_id, &record.id)?;
        self.codec.seal(record)?;
        let bytes = self.codec.encode(record)?;
        atomic_write(&path, &bytes)?;
        debug!(agent_id, wallet_id = %record.id, "saved wallet record");
        Ok(())
    }

    pub fn load(&self, agent_id: &str, wallet_id: &str) -> Result<WalletRecord, WalletError> {
        let path = self.record_path(agent_id, wallet_id)?;
        let bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(WalletError::NotFound(format!("wallet {}", wallet_id)))
            }
            Err(e) => return Err(WalletError::storage("read wallet record", e)),
        };
        let record = self.codec.decode(&bytes)?;
        if record.id != wallet_id {
            warn!(agent_id, wallet_id, "record id does not match its file name");
            return Err(WalletError::IntegrityCheckFailed);
        }
        Ok(record)
    }

    /// All readable records for the agent, oldest first. Unreadable or
    /// tampered files are skipped with a warning.
    pub fn list(&self, agent_id: &str) -> Result<Vec<WalletRecord>, WalletError> {
        let dir = self.wallets_dir(agent_id)?;
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(WalletError::storage("list wallets", e)),
        };

        let mut records = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| WalletError::storage("list wallets", e))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if validate_path_component(id).is_err() {
                continue;
            }
            match self.load(agent_id, id) {
                Ok(record) => records.push(record),
                Err(e) => warn!(agent_id, wallet_id = id, error = e.kind(), "skipping unreadable wallet record"),
            }
        }
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(records)
    }

    pub fn find_by_address(&self, agent_id: &str, chain: Chain, address: &str) -> Result<Option<WalletRecord>, WalletError> {
        Ok(self
            .list(agent_id)?
            .into_iter()
            .find(|r| r.chain == chain && r.address == address))
    }

    /// Overwrites the record file with zeros, syncs, then unlinks it.
    pub fn delete(&self, agent_id: &str, wallet_id: &str) -> Result<(), WalletError> {
        let path = self.record_path(agent_id, wallet_id)?;
        if !path.exists() {
            return Err(WalletError::NotFound(format!("wallet {}", wallet_id)));
        }
        secure_delete(&path)?;
        info!(agent_id, wallet_id, "deleted wallet record");
        Ok(())
    }

    /// Restores an archive, skipping wallets already present (same chain and
    /// address, or same id).
    pub fn restore_backup(&self, agent_id: &str, bytes: &[u8], password: &[u8]) -> Result<RestoreReport, WalletError> {
        validate_path_component(agent_id)?;
        let incoming = archive::restore(bytes, password)?;
        let mut known: Vec<(String, Chain, String)> = self
            .list(agent_id)?
            .into_iter()
            .map(|r| (r.id.clone(), r.chain, r.address.clone()))
            .collect();

        let mut report = RestoreReport::default();
        for mut record in incoming {
            let duplicate = known
                .iter()
                .any(|(id, chain, address)| *id == record.id || (*chain == record.chain && *address == record.address));
            if duplicate || self.exists(agent_id, &record.id)? {
                report.skipped.push(record.id.clone());
                continue;
            }
            self.insert(agent_id, &mut record)?;
            known.push((record.id.clone(), record.chain, record.address.clone()));
            report.restored.push(record.id.clone());
        }
        info!(agent_id, restored = report.restored.len(), skipped = report.skipped.len(), "restored backup");
        Ok(report)
    }

    /// Writes the selected archived wallets, replacing any local wallet with
    /// the same chain and address. Every id must be present in the archive.
    pub fn overwrite_from_backup(
        &self,
        agent_id: &str,
        bytes: &[u8],
        password: &[u8],
        wallet_ids: &[String],
    ) -> Result<RestoreReport, WalletError> {
        validate_path_component(agent_id)?;
        let incoming = archive::restore(bytes, password)?;
        if let Some(missing) = wallet_ids.iter().find(|id| !incoming.iter().any(|r| &r.id == *id)) {
            return Err(WalletError::NotFound(format!("wallet {} in backup", missing)));
        }
        let existing = self.list(agent_id)?;

        let mut report = RestoreReport::default();
        for mut record in incoming {
            if !wallet_ids.contains(&record.id) {
                report.skipped.push(record.id.clone());
                continue;
            }
            for local in existing
                .iter()
                .filter(|e| e.chain == record.chain && e.address == record.address && e.id != record.id)
            {
                self.delete(agent_id, &local.id)?;
            }
            self.save(agent_id, &mut record)?;
            report.restored.push(record.id.clone());
        }
        warn!(agent_id, overwritten = report.restored.len(), "overwrote wallets from backup");
        Ok(report)
    }
}

/// Temp file in the target directory, fsync, then rename over the target.
/// Readers see either the old contents or the new ones, never a prefix.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), WalletError> {
    write_file(path, bytes, WriteMode::Replace)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteMode {
    Replace,
    CreateNew,
}

fn write_file(path: &Path, bytes: &[u8], mode: WriteMode) -> Result<(), WalletError> {
    let parent = match path.parent() {
        Some(p) if p.as_os_str().is_empty() => Path::new("."),
        Some(p) => p,
        None => return Err(WalletError::StorageError("path has no parent directory".into())),
    };
    fs::create_dir_all(parent).map_err(|e| WalletError::storage("create directory", e))?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(|e| WalletError::storage("create temp file", e))?;
    device_key::restrict_permissions(tmp.as_file())?;
    tmp.write_all(bytes).map_err(|e| WalletError::storage("write temp file", e))?;
    tmp.as_file().sync_all().map_err(|e| WalletError::storage("sync temp file", e))?;
    match mode {
        WriteMode::Replace => {
            tmp.persist(path).map_err(|e| WalletError::storage("persist file", e.error))?;
        }
        WriteMode::CreateNew => match tmp.persist_noclobber(path) {
            Ok(_) => {}
            Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(WalletError::AlreadyExists(path.display().to_string()));
            }
            Err(e) => return Err(WalletError::storage("persist new file", e.error)),
        },
    }
    Ok(())
}

fn secure_delete(path: &Path) -> Result<(), WalletError> {
    {
        let mut file = OpenOptions::new()
            .write(true)
            .open(path)
            .map_err(|e| WalletError::storage("open for delete", e))?;
        let len = file.metadata().map_err(|e| WalletError::storage("stat for delete", e))?.len() as usize;
        let zeros = [0u8; 4096];
        let mut remaining = len;
        while remaining > 0 {
            let n = remaining.min(zeros.len());
            file.write_all(&zeros[..n]).map_err(|e| WalletError::storage("overwrite for delete", e))?;
            remaining -= n;
        }
        file.sync_all().map_err(|e| WalletError::storage("sync for delete", e))?;
    }
    fs::remove_file(path).map_err(|e| WalletError::storage("remove file", e))
}
