//! Hierarchical deterministic key derivation.
//!
//! - secp256k1 chains follow BIP-32: `I = HMAC-SHA512(c_par, data || ser32(i))`
//!   where `data` is `0x00 || k_par` for hardened steps and the compressed
//!   parent public key otherwise; `k_i = IL + k_par (mod n)`.
//! - ed25519 chains follow SLIP-0010 and only allow hardened steps.
//!
//! Every intermediate key and chain code is held in a zeroizing buffer, and
//! secp256k1 key objects are wiped when they leave scope.

use hmac::{Hmac, Mac};
use secp256k1::{PublicKey, Scalar, Secp256k1};
use sha2::Sha512;
use std::fmt;
use zeroize::Zeroizing;

use crate::core::address::address_from_public_key;
use crate::core::bip44::{ChildIndex, DerivationPath, PathTable};
use crate::core::domain::{Chain, Curve};
use crate::core::errors::WalletError;
use crate::core::key_management::Seed;
use crate::security::redaction::redact_hex_bytes;
use crate::security::secret::{secret_key32, ScopedSecretKey, SecretKey32};

type HmacSha512 = Hmac<Sha512>;

const BIP32_SEED_KEY: &[u8] = b"Bitcoin seed";
const SLIP10_ED25519_SEED_KEY: &[u8] = b"ed25519 seed";

/// Derived key pair for one chain. The private scalar is cleared on drop.
#[derive(Clone)]
pub struct ChainKey {
    chain: Chain,
    path: Option<DerivationPath>,
    private_key: SecretKey32,
    public_key: Vec<u8>,
    address: String,
}

impl ChainKey {
    pub fn chain(&self) -> Chain {
        self.chain
    }

    /// `None` for keys imported from raw private bytes.
    pub fn path(&self) -> Option<&DerivationPath> {
        self.path.as_ref()
    }

    pub fn private_key(&self) -> &[u8; 32] {
        &self.private_key
    }

    /// Compressed SEC1 point (secp256k1) or raw 32-byte key (ed25519).
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

impl fmt::Debug for ChainKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainKey")
            .field("chain", &self.chain)
            .field("path", &self.path.as_ref().map(ToString::to_string))
            .field("private_key", &redact_hex_bytes(&self.private_key[..]))
            .field("public_key", &hex::encode(&self.public_key))
            .field("address", &self.address)
            .finish()
    }
}

struct ExtendedKey {
    key: SecretKey32,
    chain_code: SecretKey32,
}

impl ExtendedKey {
    fn from_hmac(output: &[u8]) -> Result<Self, WalletError> {
        let key = secret_key32(&output[..32]).ok_or(WalletError::DerivationFailed)?;
        let chain_code = secret_key32(&output[32..]).ok_or(WalletError::DerivationFailed)?;
        Ok(Self { key, chain_code })
    }
}

fn hmac_sha512(key: &[u8], parts: &[&[u8]]) -> Result<Zeroizing<[u8; 64]>, WalletError> {
    let mut mac = <HmacSha512 as Mac>::new_from_slice(key).map_err(|_| WalletError::DerivationFailed)?;
    for part in parts {
        mac.update(part);
    }
    let mut out = Zeroizing::new([0u8; 64]);
    out.copy_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}

/// Derives chain keys from seeds. Holds only the (non-secret) path table.
#[derive(Debug, Clone, Default)]
pub struct KeyDerivationEngine {
    table: PathTable,
}

impl KeyDerivationEngine {
    pub fn new(table: PathTable) -> Self {
        Self { table }
    }

    pub fn path_table(&self) -> &PathTable {
        &self.table
    }

    /// Derives the key at `path` for `chain`. Pure and deterministic.
    pub fn derive(&self, seed: &Seed, chain: Chain, path: &DerivationPath) -> Result<ChainKey, WalletError> {
        path.check_curve(chain.curve())?;
        let private_key = match chain.curve() {
            Curve::Secp256k1 => derive_secp256k1(seed.as_bytes(), path)?,
            Curve::Ed25519 => derive_ed25519(seed.as_bytes(), path)?,
        };
        build_chain_key(chain, Some(path.clone()), private_key)
    }

    /// Derives the key at the chain's canonical path from the table.
    pub fn derive_for_chain(&self, seed: &Seed, chain: Chain) -> Result<ChainKey, WalletError> {
        let path = self.table.path_for(chain)?.clone();
        let key = self.derive(seed, chain, &path)?;
        tracing::debug!(chain = %chain, path = %path, table = self.table.version(), "derived chain key");
        Ok(key)
    }

    /// Wraps an imported raw private key. No derivation path is recorded.
    pub fn key_from_private_bytes(&self, chain: Chain, bytes: &[u8]) -> Result<ChainKey, WalletError> {
        let private_key = secret_key32(bytes)
            .ok_or_else(|| WalletError::InvalidParameters("private key must be 32 bytes".into()))?;
        if chain.curve() == Curve::Secp256k1 {
            ScopedSecretKey::from_slice(&private_key[..])
                .map_err(|_| WalletError::InvalidParameters("private key out of range".into()))?;
        }
        build_chain_key(chain, None, private_key)
    }

    /// Rebuilds a key unsealed from a record, keeping the path it was stored with.
    pub(crate) fn key_from_stored(
        &self,
        chain: Chain,
        path: Option<DerivationPath>,
        bytes: &[u8],
    ) -> Result<ChainKey, WalletError> {
        let private_key = secret_key32(bytes).ok_or(WalletError::IntegrityCheckFailed)?;
        build_chain_key(chain, path, private_key).map_err(|_| WalletError::IntegrityCheckFailed)
    }
}

fn build_chain_key(chain: Chain, path: Option<DerivationPath>, private_key: SecretKey32) -> Result<ChainKey, WalletError> {
    let public_key = match chain.curve() {
        Curve::Secp256k1 => {
            let secp = Secp256k1::signing_only();
            let sk = ScopedSecretKey::from_slice(&private_key[..]).map_err(|_| WalletError::DerivationFailed)?;
            PublicKey::from_secret_key(&secp, &sk).serialize().to_vec()
        }
        Curve::Ed25519 => {
            let signing = ed25519_dalek::SigningKey::from_bytes(&private_key);
            signing.verifying_key().to_bytes().to_vec()
        }
    };
    let address = address_from_public_key(chain, &public_key)?;
    Ok(ChainKey { chain, path, private_key, public_key, address })
}

fn derive_secp256k1(seed: &[u8], path: &DerivationPath) -> Result<SecretKey32, WalletError> {
    let secp = Secp256k1::signing_only();
    let master = hmac_sha512(BIP32_SEED_KEY, &[seed])?;
    let mut node = ExtendedKey::from_hmac(&master[..])?;
    ScopedSecretKey::from_slice(&node.key[..]).map_err(|_| WalletError::DerivationFailed)?;

    for child in path.components() {
        node = bip32_child(&secp, &node, *child)?;
    }
    Ok(node.key)
}

fn bip32_child(
    secp: &Secp256k1<secp256k1::SignOnly>,
    parent: &ExtendedKey,
    child: ChildIndex,
) -> Result<ExtendedKey, WalletError> {
    let parent_sk = ScopedSecretKey::from_slice(&parent.key[..]).map_err(|_| WalletError::DerivationFailed)?;
    let index = child.to_bip32().to_be_bytes();
    let output = if child.is_hardened() {
        hmac_sha512(&parent.chain_code[..], &[&[0u8][..], &parent.key[..], &index[..]])?
    } else {
        let parent_pub = PublicKey::from_secret_key(secp, &parent_sk).serialize();
        hmac_sha512(&parent.chain_code[..], &[&parent_pub[..], &index[..]])?
    };

    let mut il = Zeroizing::new([0u8; 32]);
    il.copy_from_slice(&output[..32]);
    // IL >= n or a zero child key are the (negligible) invalid cases
    let tweak = Scalar::from_be_bytes(*il).map_err(|_| WalletError::DerivationFailed)?;
    let child_sk = ScopedSecretKey::from(parent_sk.add_tweak(&tweak).map_err(|_| WalletError::DerivationFailed)?);

    let key = Zeroizing::new(child_sk.secret_bytes());
    let chain_code = secret_key32(&output[32..]).ok_or(WalletError::DerivationFailed)?;
    Ok(ExtendedKey { key, chain_code })
}

fn derive_ed25519(seed: &[u8], path: &DerivationPath) -> Result<SecretKey32, WalletError> {
    let master = hmac_sha512(SLIP10_ED25519_SEED_KEY, &[seed])?;
    let mut node = ExtendedKey::from_hmac(&master[..])?;
    for child in path.components() {
        if !child.is_hardened() {
            return Err(WalletError::UnsupportedPath("ed25519 supports hardened derivation only".into()));
        }
        let index = child.to_bip32().to_be_bytes();
        let output = hmac_sha512(&node.chain_code[..], &[&[0u8][..], &node.key[..], &index[..]])?;
        node = ExtendedKey::from_hmac(&output[..])?;
    }
    Ok(node.key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::key_management::seed_from_mnemonic;

    const ABANDON: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    fn vector1_seed() -> Seed {
        Seed::from_bytes(&hex::decode("000102030405060708090a0b0c0d0e0f").unwrap()).unwrap()
    }

    fn derive_hex(chain: Chain, path: &str) -> String {
        let engine = KeyDerivationEngine::default();
        let key = engine.derive(&vector1_seed(), chain, &path.parse().unwrap()).unwrap();
        hex::encode(key.private_key())
    }

    #[test]
    fn test_bip32_vector1_master() {
        let engine = KeyDerivationEngine::default();
        let key = engine.derive(&vector1_seed(), Chain::Bitcoin, &"m".parse().unwrap()).unwrap();
        assert_eq!(
            hex::encode(key.private_key()),
            "e8f32e723decf4051aefac8e2c93c9c5b214313817cdb01a1494b917c8436b35"
        );
        assert_eq!(
            hex::encode(key.public_key()),
            "0339a36013301597daef41fbe593a02cc513d0b55527ec2df1050e2e8ff49c85c2"
        );
    }

    #[test]
    fn test_bip32_vector1_mixed_hardening() {
        assert_eq!(
            derive_hex(Chain::Bitcoin, "m/0'/1"),
            "3c6cb8d0f6a264c91ea8b5030fadaa8e538b020f0a387421a12de9319dc93368"
        );
        assert_eq!(
            derive_hex(Chain::Bitcoin, "m/0'/1/2'/2/1000000000"),
            "471b76e389e528d6de6d816857e012c5455051cad6660850e58372a6c3e6e7c8"
        );
    }

    #[test]
    fn test_slip10_ed25519_vector1() {
        assert_eq!(
            derive_hex(Chain::Solana, "m"),
            "2b4be7f19ee27bbf30c667b642d5f4aa69fd169872f8fc3059c08ebae2eb19e7"
        );
        assert_eq!(
            derive_hex(Chain::Solana, "m/0'"),
            "68e0fe46dfb67e368c75379acec591dad19df3cde26e63b93a8e704f1dade7a3"
        );
    }

    #[test]
    fn test_ed25519_rejects_normal_component() {
        let engine = KeyDerivationEngine::default();
        let path: DerivationPath = "m/44'/501'/0'/0".parse().unwrap();
        let res = engine.derive(&vector1_seed(), Chain::Solana, &path);
        assert!(matches!(res, Err(WalletError::UnsupportedPath(_))));
    }

    #[test]
    fn test_abandon_ethereum_address() {
        let engine = KeyDerivationEngine::default();
        let seed = seed_from_mnemonic(ABANDON, "").unwrap();
        let key = engine.derive_for_chain(&seed, Chain::Ethereum).unwrap();
        assert_eq!(key.address(), "0x9858EfFD232B4033E47d90003D41EC34EcaEda94");
        assert_eq!(
            hex::encode(key.private_key()),
            "1ab42cc412b618bdea3a599e3c9bae199ebf030895b039e9db1e30dafb12b727"
        );
    }

    #[test]
    fn test_abandon_bitcoin_address() {
        let engine = KeyDerivationEngine::default();
        let seed = seed_from_mnemonic(ABANDON, "").unwrap();
        let key = engine.derive_for_chain(&seed, Chain::Bitcoin).unwrap();
        assert_eq!(key.address(), "1LqBGSKuX5yYUonjxT5qGfpUsXKYYWeabA");
    }

    #[test]
    fn test_deterministic() {
        let engine = KeyDerivationEngine::default();
        let seed = seed_from_mnemonic(ABANDON, "").unwrap();
        for chain in Chain::ALL {
            let a = engine.derive_for_chain(&seed, chain).unwrap();
            let b = engine.derive_for_chain(&seed, chain).unwrap();
            assert_eq!(a.private_key(), b.private_key());
            assert_eq!(a.address(), b.address());
        }
    }

    #[test]
    fn test_key_from_private_bytes() {
        let engine = KeyDerivationEngine::default();
        let mut one = [0u8; 32];
        one[31] = 1;
        let key = engine.key_from_private_bytes(Chain::Ethereum, &one).unwrap();
        assert_eq!(key.address(), "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf");
        assert!(key.path().is_none());
        assert!(engine.key_from_private_bytes(Chain::Ethereum, &[0u8; 32]).is_err());
        assert!(engine.key_from_private_bytes(Chain::Bitcoin, &[1u8; 31]).is_err());
    }

    #[test]
    fn test_debug_redacts_private_key() {
        let engine = KeyDerivationEngine::default();
        let key = engine.derive_for_chain(&vector1_seed(), Chain::Ethereum).unwrap();
        let dbg = format!("{:?}", key);
        assert!(dbg.contains("<redacted hex len=32>"));
        assert!(!dbg.contains(&hex::encode(key.private_key())));
    }
}
