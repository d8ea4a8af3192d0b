//! Binary wallet record format.
//!
//! `b"WKRC" || version (1) || body_len (u32 BE) || bincode body || HMAC-SHA256 (32)`
//!
//! The tag covers the header and the whole body (all public fields and the
//! sealed secret) under an integrity key derived from the device key. It is
//! verified in constant time before the body is parsed.

use bincode::Options;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;

use crate::core::errors::WalletError;
use crate::core::wallet_info::WalletRecord;
use crate::crypto::envelope::bincode_options;
use crate::crypto::kdf::hkdf_sha256;
use crate::security::secret::SecretKey32;

type HmacSha256 = Hmac<Sha256>;

pub const RECORD_MAGIC: &[u8; 4] = b"WKRC";
pub const RECORD_VERSION: u8 = 1;
pub const INTEGRITY_TAG_LEN: usize = 32;
pub const MAX_RECORD_BODY_LEN: usize = 1024 * 1024;

const HEADER_LEN: usize = 4 + 1 + 4;
const INTEGRITY_INFO: &[u8] = b"wallet-record-integrity-v1";

pub struct WalletRecordCodec {
    integrity_key: SecretKey32,
}

impl fmt::Debug for WalletRecordCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletRecordCodec").field("integrity_key", &"[REDACTED]").finish()
    }
}

impl WalletRecordCodec {
    pub fn new(integrity_key: SecretKey32) -> Self {
        Self { integrity_key }
    }

    /// Derives the integrity key from the device key with HKDF-SHA256.
    pub fn from_device_key(device_key: &[u8; 32]) -> Result<Self, WalletError> {
        Ok(Self::new(hkdf_sha256(device_key, None, INTEGRITY_INFO)?))
    }

    fn mac(&self) -> Result<HmacSha256, WalletError> {
        <HmacSha256 as Mac>::new_from_slice(&self.integrity_key[..])
            .map_err(|_| WalletError::InvalidParameters("integrity key".into()))
    }

    fn frame(&self, record: &WalletRecord) -> Result<(Vec<u8>, [u8; INTEGRITY_TAG_LEN]), WalletError> {
        let body = bincode_options(MAX_RECORD_BODY_LEN as u64)
            .serialize(record)
            .map_err(|e| WalletError::MalformedRecord(e.to_string()))?;
        let body_len = u32::try_from(body.len()).map_err(|_| WalletError::MalformedRecord("body too large".into()))?;

        let mut out = Vec::with_capacity(HEADER_LEN + body.len() + INTEGRITY_TAG_LEN);
        out.extend_from_slice(RECORD_MAGIC);
        out.push(RECORD_VERSION);
        out.extend_from_slice(&body_len.to_be_bytes());
        out.extend_from_slice(&body);

        let mut mac = self.mac()?;
        mac.update(&out);
        let mut tag = [0u8; INTEGRITY_TAG_LEN];
        tag.copy_from_slice(&mac.finalize().into_bytes());
        Ok((out, tag))
    }

    /// Tag the record would carry once encoded.
    pub fn compute_tag(&self, record: &WalletRecord) -> Result<[u8; INTEGRITY_TAG_LEN], WalletError> {
        Ok(self.frame(record)?.1)
    }

    /// Stores the current tag in `record.integrity_tag`.
    pub fn seal(&self, record: &mut WalletRecord) -> Result<(), WalletError> {
        record.integrity_tag = self.compute_tag(record)?;
        Ok(())
    }

    pub fn encode(&self, record: &WalletRecord) -> Result<Vec<u8>, WalletError> {
        record.validate()?;
        let (mut out, tag) = self.frame(record)?;
        out.extend_from_slice(&tag);
        Ok(out)
    }

    /// Shape checks, then tag verification, then strict parse, then
    /// semantic validation. Nothing is parsed from an unauthenticated body.
    pub fn decode(&self, bytes: &[u8]) -> Result<WalletRecord, WalletError> {
        if bytes.len() < HEADER_LEN + INTEGRITY_TAG_LEN {
            return Err(WalletError::MalformedRecord("truncated record".into()));
        }
        if &bytes[..4] != RECORD_MAGIC {
            return Err(WalletError::MalformedRecord("bad magic".into()));
        }
        if bytes[4] != RECORD_VERSION {
            return Err(WalletError::UnsupportedVersion(bytes[4]));
        }
        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&bytes[5..HEADER_LEN]);
        let body_len = u32::from_be_bytes(len_bytes) as usize;
        if body_len > MAX_RECORD_BODY_LEN {
            return Err(WalletError::MalformedRecord("body too large".into()));
        }
        if bytes.len() != HEADER_LEN + body_len + INTEGRITY_TAG_LEN {
            return Err(WalletError::MalformedRecord("length mismatch".into()));
        }

        let (signed, tag) = bytes.split_at(HEADER_LEN + body_len);
        let mut mac = self.mac()?;
        mac.update(signed);
        mac.verify_slice(tag).map_err(|_| WalletError::IntegrityCheckFailed)?;

        let mut record: WalletRecord = bincode_options(MAX_RECORD_BODY_LEN as u64)
            .deserialize(&signed[HEADER_LEN..])
            .map_err(|e| WalletError::MalformedRecord(e.to_string()))?;
        record.integrity_tag.copy_from_slice(tag);
        record.validate()?;
        Ok(record)
    }
}
