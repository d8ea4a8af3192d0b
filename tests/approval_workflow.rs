// Approval workflow driven through the vault with vault-derived signer keys.

use chrono::TimeZone;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use wallet_keyvault::core::config::{KdfConfig, VaultConfig};
use wallet_keyvault::core::domain::Chain;
use wallet_keyvault::core::key_manager::ChainKey;
use wallet_keyvault::crypto::multisig::{ApprovalStatus, ManualClock, Operation, OperationKind, VetoPolicy};
use wallet_keyvault::{KeyVault, WalletError};

struct Fixture {
    _dir: tempfile::TempDir,
    vault: KeyVault,
    clock: Arc<ManualClock>,
    keys: Vec<(&'static str, ChainKey)>,
}

fn fixture(veto: VetoPolicy) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let mut config = VaultConfig::default();
    config.storage.root = dir.path().to_path_buf();
    config.kdf = KdfConfig { argon2_m_cost_kib: 64, argon2_t_cost: 1, ..KdfConfig::default() };
    config.approval.default_ttl_secs = 600;
    config.approval.veto = veto;

    let clock = Arc::new(ManualClock::new(chrono::Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()));
    let vault = KeyVault::with_clock(config, clock.clone()).unwrap();

    let mut keys = Vec::new();
    for (name, byte) in [("alice", 0x11u8), ("bob", 0x22), ("carol", 0x33)] {
        let key = vault.engine().key_from_private_bytes(Chain::Ethereum, &[byte; 32]).unwrap();
        vault.register_signer(name, key.public_key()).unwrap();
        keys.push((name, key));
    }
    Fixture { _dir: dir, vault, clock, keys }
}

impl Fixture {
    fn key(&self, name: &str) -> &ChainKey {
        &self.keys.iter().find(|(n, _)| *n == name).unwrap().1
    }
}

fn transfer() -> Operation {
    Operation::new(OperationKind::Transfer, "wallet-7", "to=0x9858EfFD232B4033E47d90003D41EC34EcaEda94;amount=10")
}

#[test]
fn two_of_three_reaches_approved_then_freezes() {
    let f = fixture(VetoPolicy::AnySigner);
    let req = f.vault.create_approval(transfer(), 2).unwrap();
    assert_eq!(req.status, ApprovalStatus::Pending);
    assert_eq!(req.expires_at - req.created_at, chrono::Duration::seconds(600));

    let sig = req.sign_approval(f.key("alice")).unwrap();
    assert_eq!(f.vault.approve(&req.id, "alice", &sig).unwrap(), ApprovalStatus::Pending);
    assert_eq!(f.vault.approval_request(&req.id).unwrap().approval_count(), 1);

    let sig = req.sign_approval(f.key("bob")).unwrap();
    assert_eq!(f.vault.approve(&req.id, "bob", &sig).unwrap(), ApprovalStatus::Approved);

    let sig = req.sign_approval(f.key("carol")).unwrap();
    assert!(matches!(
        f.vault.approve(&req.id, "carol", &sig),
        Err(WalletError::RequestAlreadyTerminal { .. })
    ));
    let veto = req.sign_rejection(f.key("carol")).unwrap();
    assert!(matches!(
        f.vault.reject(&req.id, "carol", &veto),
        Err(WalletError::RequestAlreadyTerminal { .. })
    ));

    let approvers: Vec<String> = f.vault.approval_request(&req.id).unwrap().approvers().map(String::from).collect();
    assert_eq!(approvers, vec!["alice".to_string(), "bob".to_string()]);
}

#[test]
fn veto_wins_over_partial_approvals() {
    let f = fixture(VetoPolicy::AnySigner);
    let req = f.vault.create_approval(transfer(), 3).unwrap();
    f.vault.approve(&req.id, "alice", &req.sign_approval(f.key("alice")).unwrap()).unwrap();

    let veto = req.sign_rejection(f.key("bob")).unwrap();
    assert_eq!(f.vault.reject(&req.id, "bob", &veto).unwrap(), ApprovalStatus::Rejected);
    assert_eq!(f.vault.approval_request(&req.id).unwrap().rejected_by.as_deref(), Some("bob"));
}

#[test]
fn designated_veto_only() {
    let designated = VetoPolicy::Designated(["carol".to_string()].into_iter().collect());
    let f = fixture(designated);
    let req = f.vault.create_approval(transfer(), 2).unwrap();

    let veto = req.sign_rejection(f.key("alice")).unwrap();
    assert_eq!(f.vault.reject(&req.id, "alice", &veto).unwrap_err(), WalletError::VetoNotPermitted("alice".into()));
    assert_eq!(f.vault.approval_status(&req.id).unwrap(), ApprovalStatus::Pending);

    let veto = req.sign_rejection(f.key("carol")).unwrap();
    assert_eq!(f.vault.reject(&req.id, "carol", &veto).unwrap(), ApprovalStatus::Rejected);
}

#[test]
fn expiry_after_ttl() {
    let f = fixture(VetoPolicy::AnySigner);
    let req = f.vault.create_approval(transfer(), 2).unwrap();
    f.vault.approve(&req.id, "alice", &req.sign_approval(f.key("alice")).unwrap()).unwrap();

    f.clock.advance(chrono::Duration::seconds(601));
    assert_eq!(f.vault.expire_approvals(), vec![req.id.clone()]);
    assert_eq!(f.vault.approval_status(&req.id).unwrap(), ApprovalStatus::Expired);

    let late = req.sign_approval(f.key("bob")).unwrap();
    assert!(matches!(
        f.vault.approve(&req.id, "bob", &late),
        Err(WalletError::RequestAlreadyTerminal { .. })
    ));
}

#[test]
fn signatures_bound_to_request_and_signer() {
    let f = fixture(VetoPolicy::AnySigner);
    let first = f.vault.create_approval(transfer(), 2).unwrap();
    let second = f.vault.create_approval(transfer(), 2).unwrap();
    assert_ne!(first.id, second.id);

    // signature over another request
    let sig = first.sign_approval(f.key("alice")).unwrap();
    assert_eq!(f.vault.approve(&second.id, "alice", &sig).unwrap_err(), WalletError::InvalidSignature);
    // alice's signature claimed by bob
    assert_eq!(f.vault.approve(&first.id, "bob", &sig).unwrap_err(), WalletError::InvalidSignature);
    assert_eq!(
        f.vault.approve(&first.id, "mallory", &sig).unwrap_err(),
        WalletError::UnknownSigner("mallory".into())
    );
    assert!(matches!(f.vault.approval_status("missing"), Err(WalletError::NotFound(_))));
}

#[test]
fn solana_keys_cannot_sign_approvals() {
    let f = fixture(VetoPolicy::AnySigner);
    let req = f.vault.create_approval(transfer(), 1).unwrap();
    let sol = f.vault.engine().key_from_private_bytes(Chain::Solana, &[0x44; 32]).unwrap();
    assert!(matches!(req.sign_approval(&sol), Err(WalletError::InvalidParameters(_))));
    assert!(matches!(f.vault.register_signer("sol", sol.public_key()), Err(WalletError::InvalidParameters(_))));
}

#[test]
fn threshold_bounds() {
    let f = fixture(VetoPolicy::AnySigner);
    assert!(matches!(f.vault.create_approval(transfer(), 0), Err(WalletError::InvalidParameters(_))));
    assert!(matches!(f.vault.create_approval(transfer(), 4), Err(WalletError::InvalidParameters(_))));
}

#[test]
fn finished_requests_do_not_accumulate() {
    let f = fixture(VetoPolicy::AnySigner);
    for _ in 0..5 {
        let req = f.vault.create_approval(transfer(), 1).unwrap();
        let sig = req.sign_approval(f.key("alice")).unwrap();
        assert_eq!(f.vault.approve(&req.id, "alice", &sig).unwrap(), ApprovalStatus::Approved);
    }
    let open = f.vault.create_approval(transfer(), 2).unwrap();
    assert_eq!(f.vault.approval_count(), 6);

    // default retention is one hour; the open request expires at 10 minutes
    f.clock.advance(chrono::Duration::minutes(61));
    assert_eq!(f.vault.prune_approvals().len(), 5);
    assert_eq!(f.vault.approval_count(), 1);
    assert_eq!(f.vault.approval_status(&open.id).unwrap(), ApprovalStatus::Expired);

    f.clock.advance(chrono::Duration::minutes(60));
    assert_eq!(f.vault.prune_approvals(), vec![open.id.clone()]);
    assert_eq!(f.vault.approval_count(), 0);
    assert!(matches!(f.vault.approval_status(&open.id), Err(WalletError::NotFound(_))));
}
