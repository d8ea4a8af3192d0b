// Derivation conformance: published vectors and parity with coins-bip32.

use coins_bip32::xkeys::{Parent, XPriv};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use test_case::test_case;
use wallet_keyvault::core::bip44::{ChildIndex, DerivationPath};
use wallet_keyvault::core::domain::Chain;
use wallet_keyvault::core::key_management::{generate_mnemonic, seed_from_mnemonic, Seed};
use wallet_keyvault::core::key_manager::KeyDerivationEngine;
use wallet_keyvault::core::validation::validate_address;
use wallet_keyvault::WalletError;

const ABANDON: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

#[test_case(Chain::Ethereum, "0x9858EfFD232B4033E47d90003D41EC34EcaEda94" ; "ethereum")]
#[test_case(Chain::Bitcoin, "1LqBGSKuX5yYUonjxT5qGfpUsXKYYWeabA" ; "bitcoin")]
fn abandon_mnemonic_addresses(chain: Chain, expected: &str) {
    let seed = seed_from_mnemonic(ABANDON, "").unwrap();
    let key = KeyDerivationEngine::default().derive_for_chain(&seed, chain).unwrap();
    assert_eq!(key.address(), expected);
}

#[test]
fn trezor_passphrase_seed() {
    let seed = seed_from_mnemonic(ABANDON, "TREZOR").unwrap();
    assert_eq!(
        hex::encode(seed.as_bytes()),
        "c55257c360c07c72029aebc1b53c05ed0362ada38ead3e3e9efa3708e53495531f09a6987599d18264c1e1c92f2cf141630c7a3c4ab7c81b2f001698e7463b04"
    );
}

#[test]
fn solana_key_is_deterministic_and_valid() {
    let engine = KeyDerivationEngine::default();
    let seed = seed_from_mnemonic(ABANDON, "").unwrap();
    let a = engine.derive_for_chain(&seed, Chain::Solana).unwrap();
    let b = engine.derive_for_chain(&seed, Chain::Solana).unwrap();
    assert_eq!(a.address(), b.address());
    assert_eq!(a.public_key().len(), 32);
    assert!(validate_address(Chain::Solana, a.address()).is_ok());
    assert_eq!(a.path().unwrap().to_string(), "m/44'/501'/0'/0'");
}

#[test]
fn ed25519_rejects_normal_steps() {
    let seed = seed_from_mnemonic(ABANDON, "").unwrap();
    let path: DerivationPath = "m/44'/501'/0'/0".parse().unwrap();
    let err = KeyDerivationEngine::default().derive(&seed, Chain::Solana, &path).unwrap_err();
    assert!(matches!(err, WalletError::UnsupportedPath(_)));
}

#[test]
fn index_out_of_range_rejected() {
    assert!(matches!(ChildIndex::new(1 << 31, false), Err(WalletError::UnsupportedPath(_))));
    assert!("m/2147483648".parse::<DerivationPath>().is_err());
}

#[test]
fn every_generated_mnemonic_derives_every_chain() {
    let engine = KeyDerivationEngine::default();
    for words in [12, 24] {
        let phrase = generate_mnemonic(words).unwrap();
        let seed = seed_from_mnemonic(phrase.as_str(), "").unwrap();
        for chain in Chain::ALL {
            let key = engine.derive_for_chain(&seed, chain).unwrap();
            assert!(validate_address(chain, key.address()).is_ok());
        }
    }
}

fn reference_private_key(seed: &[u8], path: &[u32]) -> [u8; 32] {
    let mut xprv = XPriv::root_from_seed(seed, None).unwrap();
    for index in path {
        xprv = xprv.derive_child(*index).unwrap();
    }
    let sk: &k256::ecdsa::SigningKey = xprv.as_ref();
    sk.to_bytes().into()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn bip32_matches_reference(
        seed in proptest::collection::vec(any::<u8>(), 16..=64),
        steps in proptest::collection::vec((0u32..(1 << 31), any::<bool>()), 0..5),
    ) {
        let components: Vec<ChildIndex> = steps
            .iter()
            .map(|(i, h)| ChildIndex::new(*i, *h).unwrap())
            .collect();
        let path = DerivationPath::new(components.clone()).unwrap();
        let raw: Vec<u32> = components.iter().map(|c| c.to_bip32()).collect();

        let ours = KeyDerivationEngine::default()
            .derive(&Seed::from_bytes(&seed).unwrap(), Chain::Bitcoin, &path)
            .unwrap();
        prop_assert_eq!(*ours.private_key(), reference_private_key(&seed, &raw));
    }

    #[test]
    fn derivation_is_deterministic(seed in proptest::collection::vec(any::<u8>(), 16..=64)) {
        let engine = KeyDerivationEngine::default();
        let seed = Seed::from_bytes(&seed).unwrap();
        for chain in Chain::ALL {
            let a = engine.derive_for_chain(&seed, chain).unwrap();
            let b = engine.derive_for_chain(&seed, chain).unwrap();
            prop_assert_eq!(a.private_key(), b.private_key());
            prop_assert_eq!(a.address(), b.address());
        }
    }
}
