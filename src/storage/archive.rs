//! Encrypted backup archives.
//!
//! `b"WKBA" || version (1) || header_len (u32 BE) || bincode header || outer envelope`
//!
//! The header is readable without the password so a backup can be previewed.
//! Every byte before the outer envelope is its AEAD associated data, so a
//! modified header fails at restore time. The outer envelope carries each
//! wallet's already sealed secret; plaintext keys never enter an archive.

use bincode::Options;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use zeroize::Zeroizing;

use crate::core::errors::WalletError;
use crate::core::wallet_info::{BalanceCache, WalletMetadata, WalletRecord};
use crate::crypto::envelope::{bincode_options, open_with_password, seal_with_password, EncryptedEnvelope};
use crate::crypto::kdf::KdfParams;

pub const ARCHIVE_MAGIC: &[u8; 4] = b"WKBA";
pub const ARCHIVE_VERSION: u8 = 1;
pub const MAX_HEADER_LEN: usize = 4 * 1024 * 1024;
pub const MAX_PAYLOAD_LEN: usize = 64 * 1024 * 1024;

const PREFIX_LEN: usize = 4 + 1 + 4;

/// Plaintext archive header, also the preview returned by `read_metadata`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveHeader {
    pub created_at: DateTime<Utc>,
    pub tool_version: String,
    pub wallets: Vec<WalletMetadata>,
}

#[derive(Serialize, Deserialize)]
struct ArchivedSecret {
    secret: EncryptedEnvelope,
    balance_cache: Option<BalanceCache>,
    extensions: BTreeMap<String, Vec<u8>>,
}

/// Outcome of restoring an archive into a store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RestoreReport {
    pub restored: Vec<String>,
    pub skipped: Vec<String>,
}

struct ParsedArchive<'a> {
    header: ArchiveHeader,
    /// Authenticated as AAD of the outer envelope.
    prefix: &'a [u8],
    outer: &'a [u8],
}

fn corrupt(msg: &str) -> WalletError {
    WalletError::CorruptArchive(msg.to_string())
}

fn parse(bytes: &[u8]) -> Result<ParsedArchive<'_>, WalletError> {
    if bytes.len() < PREFIX_LEN {
        return Err(corrupt("truncated archive"));
    }
    if &bytes[..4] != ARCHIVE_MAGIC {
        return Err(corrupt("bad magic"));
    }
    if bytes[4] != ARCHIVE_VERSION {
        return Err(WalletError::UnsupportedVersion(bytes[4]));
    }
    let mut len_bytes = [0u8; 4];
    len_bytes.copy_from_slice(&bytes[5..PREFIX_LEN]);
    let header_len = u32::from_be_bytes(len_bytes) as usize;
    if header_len > MAX_HEADER_LEN || bytes.len() < PREFIX_LEN + header_len {
        return Err(corrupt("header length"));
    }
    let (prefix, outer) = bytes.split_at(PREFIX_LEN + header_len);
    let header: ArchiveHeader = bincode_options(MAX_HEADER_LEN as u64)
        .deserialize(&prefix[PREFIX_LEN..])
        .map_err(|_| corrupt("unreadable header"))?;
    Ok(ParsedArchive { header, prefix, outer })
}

/// Builds an archive of `records` sealed under `password`.
pub fn create(
    records: &[WalletRecord],
    password: &[u8],
    params: &KdfParams,
    created_at: DateTime<Utc>,
) -> Result<Vec<u8>, WalletError> {
    if password.is_empty() {
        return Err(WalletError::InvalidParameters("backup password must not be empty".into()));
    }
    let mut ids = BTreeSet::new();
    for record in records {
        record.validate()?;
        if !ids.insert(record.id.as_str()) {
            return Err(WalletError::InvalidParameters(format!("duplicate wallet id {}", record.id)));
        }
    }

    let header = ArchiveHeader {
        created_at,
        tool_version: env!("CARGO_PKG_VERSION").to_string(),
        wallets: records.iter().map(WalletRecord::metadata).collect(),
    };
    let header_bytes = bincode_options(MAX_HEADER_LEN as u64)
        .serialize(&header)
        .map_err(|e| WalletError::InvalidParameters(e.to_string()))?;
    let header_len = u32::try_from(header_bytes.len())
        .map_err(|_| WalletError::InvalidParameters("too many wallets".into()))?;

    let mut out = Vec::with_capacity(PREFIX_LEN + header_bytes.len());
    out.extend_from_slice(ARCHIVE_MAGIC);
    out.push(ARCHIVE_VERSION);
    out.extend_from_slice(&header_len.to_be_bytes());
    out.extend_from_slice(&header_bytes);

    let secrets: Vec<ArchivedSecret> = records
        .iter()
        .map(|r| ArchivedSecret {
            secret: r.secret.clone(),
            balance_cache: r.balance_cache.clone(),
            extensions: r.extensions.clone(),
        })
        .collect();
    let payload = Zeroizing::new(
        bincode_options(MAX_PAYLOAD_LEN as u64)
            .serialize(&secrets)
            .map_err(|e| WalletError::InvalidParameters(e.to_string()))?,
    );

    let outer = seal_with_password(&payload, password, &out, params)?;
    out.extend_from_slice(&outer.to_bytes()?);
    Ok(out)
}

/// Reads the plaintext header without the password.
pub fn read_metadata(bytes: &[u8]) -> Result<ArchiveHeader, WalletError> {
    Ok(parse(bytes)?.header)
}

/// Opens the archive and rebuilds its records, in header order.
///
/// Restored records carry a zero integrity tag until a store re-encodes them.
pub fn restore(bytes: &[u8], password: &[u8]) -> Result<Vec<WalletRecord>, WalletError> {
    let parsed = parse(bytes)?;
    let outer = EncryptedEnvelope::from_bytes(parsed.outer).map_err(|_| corrupt("unreadable envelope"))?;
    if !outer.is_password_sealed() {
        return Err(corrupt("outer envelope is not password sealed"));
    }
    let payload = open_with_password(&outer, password, parsed.prefix).map_err(|_| WalletError::WrongPassword)?;

    let secrets: Vec<ArchivedSecret> = bincode_options(MAX_PAYLOAD_LEN as u64)
        .deserialize(&payload)
        .map_err(|_| corrupt("unreadable payload"))?;
    if secrets.len() != parsed.header.wallets.len() {
        return Err(corrupt("wallet count mismatch"));
    }

    let mut ids = BTreeSet::new();
    let mut records = Vec::with_capacity(secrets.len());
    for (meta, archived) in parsed.header.wallets.into_iter().zip(secrets) {
        if !ids.insert(meta.id.clone()) {
            return Err(corrupt("duplicate wallet id"));
        }
        let ArchivedSecret { secret, balance_cache, extensions } = archived;
        let record = WalletRecord {
            id: meta.id,
            display_name: meta.display_name,
            chain: meta.chain,
            address: meta.address,
            derivation_path: meta.derivation_path,
            is_imported: meta.is_imported,
            created_at: meta.created_at,
            balance_cache,
            secret,
            extensions,
            integrity_tag: [0u8; 32],
        };
        record.validate().map_err(|e| WalletError::CorruptArchive(e.to_string()))?;
        records.push(record);
    }
    Ok(records)
}
