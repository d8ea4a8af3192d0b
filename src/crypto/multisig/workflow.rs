//! N-of-M approval state machine.
//!
//! `Pending -> {Approved, Rejected, Expired}`; terminal states never change.
//! Expiry is applied lazily on access and in bulk by [`ApprovalWorkflow::expire_due`].
//! Finished requests are kept for the policy retention window, then dropped.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use secp256k1::{ecdsa::Signature, PublicKey};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::config::SignerRegistry;
use super::policy::{ApprovalPolicy, ThresholdPolicy};
use super::request::{ApprovalRequest, ApprovalStatus, Decision, Operation};
use crate::core::errors::WalletError;
use crate::security::redaction::short_id;

/// Time source. Injected so expiry is testable.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(start) }
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

pub struct ApprovalWorkflow {
    registry: SignerRegistry,
    policy: ApprovalPolicy,
    clock: Arc<dyn Clock>,
    requests: HashMap<String, ApprovalRequest>,
    sequence: u64,
}

impl ApprovalWorkflow {
    pub fn new(policy: ApprovalPolicy, clock: Arc<dyn Clock>) -> Self {
        Self { registry: SignerRegistry::new(), policy, clock, requests: HashMap::new(), sequence: 0 }
    }

    pub fn policy(&self) -> &ApprovalPolicy {
        &self.policy
    }

    pub fn register_signer(&mut self, signer_id: &str, pubkey: PublicKey) -> Result<(), WalletError> {
        self.registry.register(signer_id, pubkey)?;
        info!(signer = signer_id, "registered approval signer");
        Ok(())
    }

    /// Number of requests held, pending or finished.
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Opens a Pending request that expires after the policy TTL.
    pub fn create_request(&mut self, operation: Operation, required_approvals: u8) -> Result<ApprovalRequest, WalletError> {
        ThresholdPolicy::new(required_approvals, self.registry.len())?;
        self.prune_terminal();
        let created_at = self.clock.now();
        let expires_at = created_at + self.policy.ttl;
        self.sequence += 1;
        let request = ApprovalRequest::new(operation, required_approvals, created_at, expires_at, self.sequence);
        info!(
            id = %short_id(&request.id),
            kind = request.operation.kind.as_str(),
            required = required_approvals,
            "approval request created"
        );
        self.requests.insert(request.id.clone(), request.clone());
        Ok(request)
    }

    /// Records a verified approval. Re-submitting from the same signer is a no-op.
    pub fn submit_approval(
        &mut self,
        request_id: &str,
        signer_id: &str,
        signature: &Signature,
    ) -> Result<ApprovalStatus, WalletError> {
        let now = self.clock.now();
        let request = Self::pending_mut(&mut self.requests, request_id, now)?;
        let pubkey = self.registry.get(signer_id)?;
        request.verify(Decision::Approve, pubkey, signature)?;

        if request.has_approved(signer_id) {
            return Ok(request.status);
        }
        request.approvals.insert(signer_id.to_string(), *signature);

        if request.approval_count() >= usize::from(request.required_approvals) {
            request.status = ApprovalStatus::Approved;
            request.finalized_at = Some(now);
            info!(id = %short_id(request_id), approvals = request.approval_count(), "approval request approved");
        } else {
            info!(
                id = %short_id(request_id),
                approvals = request.approval_count(),
                required = request.required_approvals,
                "approval recorded"
            );
        }
        Ok(request.status)
    }

    /// Vetoes a pending request, if the policy allows this signer to.
    pub fn submit_rejection(
        &mut self,
        request_id: &str,
        signer_id: &str,
        signature: &Signature,
    ) -> Result<ApprovalStatus, WalletError> {
        let now = self.clock.now();
        let request = Self::pending_mut(&mut self.requests, request_id, now)?;
        let pubkey = self.registry.get(signer_id)?;
        if !self.policy.veto.permits(signer_id) {
            return Err(WalletError::VetoNotPermitted(signer_id.to_string()));
        }
        request.verify(Decision::Reject, pubkey, signature)?;

        request.status = ApprovalStatus::Rejected;
        request.finalized_at = Some(now);
        request.rejected_by = Some(signer_id.to_string());
        info!(id = %short_id(request_id), signer = signer_id, "approval request rejected");
        Ok(request.status)
    }

    /// Current state of a request, with expiry applied.
    pub fn get(&mut self, request_id: &str) -> Result<ApprovalRequest, WalletError> {
        let now = self.clock.now();
        let request = self
            .requests
            .get_mut(request_id)
            .ok_or_else(|| WalletError::NotFound(format!("approval request {}", short_id(request_id))))?;
        Self::apply_expiry(request, now);
        Ok(request.clone())
    }

    pub fn status(&mut self, request_id: &str) -> Result<ApprovalStatus, WalletError> {
        Ok(self.get(request_id)?.status)
    }

    /// Moves every overdue Pending request to Expired and returns their ids.
    pub fn expire_due(&mut self) -> Vec<String> {
        let now = self.clock.now();
        let mut expired: Vec<String> = self
            .requests
            .values_mut()
            .filter_map(|r| Self::apply_expiry(r, now).then(|| r.id.clone()))
            .collect();
        expired.sort();
        expired
    }

    /// Drops requests that finished more than the retention window ago and
    /// returns their ids. Pending requests are never dropped.
    pub fn prune_terminal(&mut self) -> Vec<String> {
        let now = self.clock.now();
        for request in self.requests.values_mut() {
            Self::apply_expiry(request, now);
        }
        let retention = self.policy.retention;
        let mut pruned = Vec::new();
        self.requests.retain(|id, r| {
            let keep = match r.finalized_at {
                Some(at) if r.status.is_terminal() => now - at < retention,
                _ => true,
            };
            if !keep {
                pruned.push(id.clone());
            }
            keep
        });
        if !pruned.is_empty() {
            debug!(pruned = pruned.len(), remaining = self.requests.len(), "pruned finished approval requests");
        }
        pruned.sort();
        pruned
    }

    fn apply_expiry(request: &mut ApprovalRequest, now: DateTime<Utc>) -> bool {
        if request.status == ApprovalStatus::Pending && now > request.expires_at {
            request.status = ApprovalStatus::Expired;
            request.finalized_at = Some(now);
            info!(id = %short_id(&request.id), "approval request expired");
            return true;
        }
        false
    }

    fn pending_mut<'a>(
        requests: &'a mut HashMap<String, ApprovalRequest>,
        request_id: &str,
        now: DateTime<Utc>,
    ) -> Result<&'a mut ApprovalRequest, WalletError> {
        let request = requests
            .get_mut(request_id)
            .ok_or_else(|| WalletError::NotFound(format!("approval request {}", short_id(request_id))))?;
        Self::apply_expiry(request, now);
        if request.status.is_terminal() {
            return Err(WalletError::RequestAlreadyTerminal {
                id: request_id.to_string(),
                status: request.status.to_string(),
            });
        }
        Ok(request)
    }
}
