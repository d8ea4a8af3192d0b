//! Per-installation device key, the root of record integrity keys.

use rand::rngs::OsRng;
use rand::RngCore;
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::info;

use crate::core::errors::WalletError;
use crate::security::secret::{secret_key32, SecretKey32};

pub const DEVICE_KEY_FILE: &str = "device.key";

/// Loads `<root>/device.key`, creating it (mode 0600) on first use.
pub fn load_or_create(root: &Path) -> Result<SecretKey32, WalletError> {
    let path = root.join(DEVICE_KEY_FILE);
    if path.exists() {
        return read_key(&path);
    }

    fs::create_dir_all(root).map_err(|e| WalletError::storage("create storage root", e))?;
    let mut key = SecretKey32::new([0u8; 32]);
    OsRng.fill_bytes(&mut key[..]);

    let mut tmp = tempfile::NamedTempFile::new_in(root).map_err(|e| WalletError::storage("create device key", e))?;
    restrict_permissions(tmp.as_file())?;
    tmp.write_all(&key[..]).map_err(|e| WalletError::storage("write device key", e))?;
    tmp.as_file().sync_all().map_err(|e| WalletError::storage("sync device key", e))?;

    match tmp.persist_noclobber(&path) {
        Ok(_) => {
            info!(root = %root.display(), "created device key");
            Ok(key)
        }
        // another process won the race; use its key
        Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => read_key(&path),
        Err(e) => Err(WalletError::storage("persist device key", e.error)),
    }
}

fn read_key(path: &Path) -> Result<SecretKey32, WalletError> {
    let bytes = zeroize::Zeroizing::new(fs::read(path).map_err(|e| WalletError::storage("read device key", e))?);
    secret_key32(&bytes).ok_or_else(|| WalletError::StorageError("device key has wrong length".into()))
}

#[cfg(unix)]
pub(crate) fn restrict_permissions(file: &fs::File) -> Result<(), WalletError> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(0o600))
        .map_err(|e| WalletError::storage("set permissions", e))
}

#[cfg(not(unix))]
pub(crate) fn restrict_permissions(_file: &fs::File) -> Result<(), WalletError> {
    Ok(())
}
