//! Approval thresholds and veto rules.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::core::errors::WalletError;

/// Who may move a pending request straight to Rejected.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", content = "signers", rename_all = "snake_case")]
pub enum VetoPolicy {
    /// Any registered signer.
    #[default]
    AnySigner,
    /// Only the listed signer ids.
    Designated(BTreeSet<String>),
    /// Rejections are not accepted; requests can only approve or expire.
    Disabled,
}

impl VetoPolicy {
    pub fn permits(&self, signer_id: &str) -> bool {
        match self {
            VetoPolicy::AnySigner => true,
            VetoPolicy::Designated(ids) => ids.contains(signer_id),
            VetoPolicy::Disabled => false,
        }
    }
}

/// M-of-N threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdPolicy {
    pub required: u8,
    pub total: usize,
}

impl ThresholdPolicy {
    pub fn new(required: u8, total: usize) -> Result<Self, WalletError> {
        if required == 0 {
            return Err(WalletError::InvalidParameters("required approvals must be at least 1".into()));
        }
        if required as usize > total {
            return Err(WalletError::InvalidParameters(format!(
                "required approvals ({}) exceed registered signers ({})",
                required, total
            )));
        }
        Ok(Self { required, total })
    }

    pub fn is_satisfied(&self, approvals: usize) -> bool {
        approvals >= self.required as usize
    }
}

/// Workflow-wide settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalPolicy {
    pub ttl: chrono::Duration,
    pub veto: VetoPolicy,
    /// How long a finished request stays queryable before it is dropped.
    pub retention: chrono::Duration,
}

impl ApprovalPolicy {
    pub fn new(ttl_secs: u64, veto: VetoPolicy) -> Result<Self, WalletError> {
        let secs = i64::try_from(ttl_secs)
            .ok()
            .filter(|s| *s > 0 && *s <= 365 * 24 * 3600)
            .ok_or_else(|| WalletError::InvalidParameters("approval ttl must be 1s..=365d".into()))?;
        Ok(Self { ttl: chrono::Duration::seconds(secs), veto, retention: Self::default_retention() })
    }

    pub fn with_retention_secs(mut self, retention_secs: u64) -> Result<Self, WalletError> {
        let secs = i64::try_from(retention_secs)
            .ok()
            .filter(|s| *s <= 365 * 24 * 3600)
            .ok_or_else(|| WalletError::InvalidParameters("approval retention must be at most 365d".into()))?;
        self.retention = chrono::Duration::seconds(secs);
        Ok(self)
    }

    fn default_retention() -> chrono::Duration {
        chrono::Duration::hours(1)
    }
}

impl Default for ApprovalPolicy {
    fn default() -> Self {
        Self { ttl: chrono::Duration::hours(24), veto: VetoPolicy::AnySigner, retention: Self::default_retention() }
    }
}
