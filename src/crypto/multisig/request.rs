//! Approval requests and their canonical signing payloads.

use chrono::{DateTime, Utc};
use secp256k1::{ecdsa::Signature, Message, PublicKey, Secp256k1};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

use crate::core::domain::Curve;
use crate::core::errors::WalletError;
use crate::core::key_manager::ChainKey;
use crate::security::secret::ScopedSecretKey;

const PAYLOAD_DOMAIN: &[u8] = b"WKC-APPROVAL-V1";
const ID_DOMAIN: &[u8] = b"WKC-APPROVAL-ID-V1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Transfer,
    Upgrade,
    ConfigChange,
    WalletExport,
    WalletDelete,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Transfer => "transfer",
            OperationKind::Upgrade => "upgrade",
            OperationKind::ConfigChange => "config_change",
            OperationKind::WalletExport => "wallet_export",
            OperationKind::WalletDelete => "wallet_delete",
        }
    }
}

/// The sensitive operation a request gates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub kind: OperationKind,
    /// What the operation acts on (wallet id, contract, setting name).
    pub target: String,
    /// Free-form parameters, signed verbatim.
    pub detail: String,
}

impl Operation {
    pub fn new(kind: OperationKind, target: impl Into<String>, detail: impl Into<String>) -> Self {
        Self { kind, target: target.into(), detail: detail.into() }
    }

    /// Length-prefixed encoding; unambiguous for any field contents.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for field in [self.kind.as_str().as_bytes(), self.target.as_bytes(), self.detail.as_bytes()] {
            out.extend_from_slice(&(field.len() as u32).to_be_bytes());
            out.extend_from_slice(field);
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
}

impl ApprovalStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ApprovalStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
            ApprovalStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a signature attests to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    fn tag(&self) -> u8 {
        match self {
            Decision::Approve => b'A',
            Decision::Reject => b'R',
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApprovalRequest {
    pub id: String,
    pub operation: Operation,
    pub required_approvals: u8,
    /// signer id -> verified signature
    pub(crate) approvals: BTreeMap<String, Signature>,
    pub rejected_by: Option<String>,
    pub status: ApprovalStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// When the request left Pending.
    pub finalized_at: Option<DateTime<Utc>>,
}

impl ApprovalRequest {
    pub(crate) fn new(
        operation: Operation,
        required_approvals: u8,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        sequence: u64,
    ) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(ID_DOMAIN);
        hasher.update(operation.canonical_bytes());
        hasher.update([required_approvals]);
        hasher.update(created_at.timestamp_micros().to_be_bytes());
        hasher.update(sequence.to_be_bytes());
        Self {
            id: hex::encode(hasher.finalize()),
            operation,
            required_approvals,
            approvals: BTreeMap::new(),
            rejected_by: None,
            status: ApprovalStatus::Pending,
            created_at,
            expires_at,
            finalized_at: None,
        }
    }

    pub fn approval_count(&self) -> usize {
        self.approvals.len()
    }

    pub fn approvers(&self) -> impl Iterator<Item = &str> {
        self.approvals.keys().map(String::as_str)
    }

    pub fn has_approved(&self, signer_id: &str) -> bool {
        self.approvals.contains_key(signer_id)
    }

    /// Bytes a signer commits to. Binds the decision, the request id, the
    /// operation, the threshold and the validity window.
    pub fn canonical_payload(&self, decision: Decision) -> Vec<u8> {
        let mut out = Vec::with_capacity(128);
        out.extend_from_slice(PAYLOAD_DOMAIN);
        out.push(decision.tag());
        out.extend_from_slice(&(self.id.len() as u32).to_be_bytes());
        out.extend_from_slice(self.id.as_bytes());
        out.extend_from_slice(&self.operation.canonical_bytes());
        out.push(self.required_approvals);
        out.extend_from_slice(&self.created_at.timestamp().to_be_bytes());
        out.extend_from_slice(&self.expires_at.timestamp().to_be_bytes());
        out
    }

    /// SHA-256 of the canonical payload, the ECDSA message.
    pub fn digest(&self, decision: Decision) -> [u8; 32] {
        Sha256::digest(self.canonical_payload(decision)).into()
    }

    pub(crate) fn verify(&self, decision: Decision, pubkey: &PublicKey, signature: &Signature) -> Result<(), WalletError> {
        let message = Message::from_slice(&self.digest(decision)).map_err(|_| WalletError::InvalidSignature)?;
        Secp256k1::verification_only()
            .verify_ecdsa(&message, signature, pubkey)
            .map_err(|_| WalletError::InvalidSignature)
    }

    /// Signs the approval payload with a vault-derived secp256k1 key.
    pub fn sign_approval(&self, key: &ChainKey) -> Result<Signature, WalletError> {
        self.sign(Decision::Approve, key)
    }

    pub fn sign_rejection(&self, key: &ChainKey) -> Result<Signature, WalletError> {
        self.sign(Decision::Reject, key)
    }

    fn sign(&self, decision: Decision, key: &ChainKey) -> Result<Signature, WalletError> {
        if key.chain().curve() != Curve::Secp256k1 {
            return Err(WalletError::InvalidParameters("approval keys must be secp256k1".into()));
        }
        let sk = ScopedSecretKey::from_slice(key.private_key())
            .map_err(|_| WalletError::InvalidParameters("invalid signing key".into()))?;
        let message = Message::from_slice(&self.digest(decision)).map_err(|_| WalletError::DerivationFailed)?;
        Ok(Secp256k1::signing_only().sign_ecdsa(&message, &sk))
    }
}
