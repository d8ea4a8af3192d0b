// On-disk record format: framing, integrity and forward-compatible fields.

use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use wallet_keyvault::core::domain::Chain;
use wallet_keyvault::core::key_management::seed_from_mnemonic;
use wallet_keyvault::core::key_manager::KeyDerivationEngine;
use wallet_keyvault::core::wallet::{seal_chain_key, unlock_record};
use wallet_keyvault::core::wallet_info::{BalanceCache, WalletRecord};
use wallet_keyvault::crypto::kdf::KdfParams;
use wallet_keyvault::storage::codec::{WalletRecordCodec, RECORD_MAGIC, RECORD_VERSION};
use wallet_keyvault::storage::WalletStore;
use wallet_keyvault::WalletError;

const FAST: KdfParams = KdfParams::Argon2id { m_cost_kib: 64, t_cost: 1, p_cost: 1 };
const ABANDON: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

fn record(chain: Chain) -> WalletRecord {
    let engine = KeyDerivationEngine::default();
    let seed = seed_from_mnemonic(ABANDON, "").unwrap();
    let key = engine.derive_for_chain(&seed, chain).unwrap();
    let created = Utc.with_ymd_and_hms(2025, 3, 14, 9, 26, 53).unwrap();
    seal_chain_key("wallet-01", "Main", &key, false, b"pw", &FAST, created).unwrap()
}

fn codec() -> WalletRecordCodec {
    WalletRecordCodec::from_device_key(&[0x5a; 32]).unwrap()
}

#[test]
fn roundtrip_preserves_every_field() {
    let mut rec = record(Chain::Ethereum);
    rec.balance_cache = Some(BalanceCache::new("1250000000000000000", rec.created_at).unwrap());
    rec.extensions.insert("nonce-hint".into(), vec![0, 1, 2]);
    rec.extensions.insert("label-color".into(), b"teal".to_vec());

    let c = codec();
    let bytes = c.encode(&rec).unwrap();
    assert_eq!(&bytes[..4], RECORD_MAGIC);
    assert_eq!(bytes[4], RECORD_VERSION);

    let decoded = c.decode(&bytes).unwrap();
    assert_eq!(decoded.integrity_tag, c.compute_tag(&rec).unwrap());
    c.seal(&mut rec).unwrap();
    assert_eq!(decoded, rec);

    let key = unlock_record(&KeyDerivationEngine::default(), &decoded, b"pw").unwrap();
    assert_eq!(key.address(), rec.address);
}

#[test]
fn unknown_extensions_survive_decode_and_reencode() {
    // as written by a newer build that knows fields this one does not
    let mut newer = record(Chain::Bitcoin);
    newer.extensions.insert("x-fee-tier".into(), b"priority".to_vec());
    newer.extensions.insert("x_hw_slot".into(), vec![0xff, 0x00, 0x7f]);
    let c = codec();
    let written = c.encode(&newer).unwrap();

    let read = c.decode(&written).unwrap();
    assert_eq!(read.extensions, newer.extensions);
    assert_eq!(c.encode(&read).unwrap(), written);
}

#[test]
fn store_updates_keep_unknown_extensions() {
    let dir = tempfile::tempdir().unwrap();
    let store = WalletStore::open(dir.path()).unwrap();
    let mut rec = record(Chain::Ethereum);
    rec.extensions.insert("x-fee-tier".into(), b"economy".to_vec());
    store.insert("agent", &mut rec).unwrap();

    let mut loaded = store.load("agent", &rec.id).unwrap();
    loaded.display_name = "Renamed".into();
    store.save("agent", &mut loaded).unwrap();

    let reloaded = store.load("agent", &rec.id).unwrap();
    assert_eq!(reloaded.display_name, "Renamed");
    assert_eq!(reloaded.extensions, rec.extensions);
}

#[test]
fn metadata_edit_breaks_integrity() {
    let c = codec();
    let bytes = c.encode(&record(Chain::Bitcoin)).unwrap();

    // flip the last byte of the display name "Main" inside the body
    let pos = bytes.windows(4).position(|w| w == b"Main").unwrap() + 3;
    let mut tampered = bytes.clone();
    tampered[pos] = b'X';
    assert_eq!(c.decode(&tampered).unwrap_err(), WalletError::IntegrityCheckFailed);
}

#[test]
fn other_device_key_rejected() {
    let bytes = codec().encode(&record(Chain::Solana)).unwrap();
    let other = WalletRecordCodec::from_device_key(&[0x5b; 32]).unwrap();
    assert_eq!(other.decode(&bytes).unwrap_err(), WalletError::IntegrityCheckFailed);
}

#[test]
fn framing_errors() {
    let c = codec();
    let bytes = c.encode(&record(Chain::Ethereum)).unwrap();

    assert!(matches!(c.decode(&bytes[..10]), Err(WalletError::MalformedRecord(_))));

    let mut magic = bytes.clone();
    magic[0] = b'X';
    assert!(matches!(c.decode(&magic), Err(WalletError::MalformedRecord(_))));

    let mut version = bytes.clone();
    version[4] = 2;
    assert_eq!(c.decode(&version).unwrap_err(), WalletError::UnsupportedVersion(2));

    let mut longer = bytes.clone();
    longer.push(0);
    assert!(matches!(c.decode(&longer), Err(WalletError::MalformedRecord(_))));
}

#[test]
fn invalid_records_are_not_encoded() {
    let c = codec();

    let mut bad_cache = record(Chain::Ethereum);
    bad_cache.balance_cache = Some(BalanceCache { amount: "-5".into(), updated_at: bad_cache.created_at });
    assert!(matches!(c.encode(&bad_cache), Err(WalletError::MalformedRecord(_))));

    let mut wrong_chain = record(Chain::Ethereum);
    wrong_chain.chain = Chain::Solana;
    assert!(matches!(c.encode(&wrong_chain), Err(WalletError::MalformedRecord(_))));

    let mut bad_ext = record(Chain::Ethereum);
    bad_ext.extensions.insert("../x".into(), vec![]);
    assert!(matches!(c.encode(&bad_ext), Err(WalletError::MalformedRecord(_))));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn any_byte_flip_is_rejected(pos in any::<usize>(), bit in 0u8..8) {
        let c = codec();
        let bytes = c.encode(&record(Chain::Ethereum)).unwrap();
        let i = pos % bytes.len();
        let mut tampered = bytes.clone();
        tampered[i] ^= 1 << bit;
        prop_assert!(c.decode(&tampered).is_err());
    }
}
