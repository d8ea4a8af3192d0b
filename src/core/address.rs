//! Address encodings for the supported chains.

use sha3::{Digest, Keccak256};

use crate::core::domain::Chain;
use crate::core::errors::WalletError;

/// Renders the address for `public_key` on `chain`.
///
/// `public_key` is the 33-byte compressed point for secp256k1 chains and the
/// 32-byte ed25519 key for Solana.
pub fn address_from_public_key(chain: Chain, public_key: &[u8]) -> Result<String, WalletError> {
    match chain {
        Chain::Ethereum => ethereum_address(public_key),
        Chain::Bitcoin => bitcoin_p2pkh_address(public_key),
        Chain::Solana => solana_address(public_key),
    }
}

/// Keccak256 of the uncompressed point without its 0x04 prefix, last 20
/// bytes, EIP-55 mixed case.
pub fn ethereum_address(public_key: &[u8]) -> Result<String, WalletError> {
    let pk = secp256k1::PublicKey::from_slice(public_key)
        .map_err(|_| WalletError::InvalidParameters("invalid secp256k1 public key".into()))?;
    let uncompressed = pk.serialize_uncompressed();
    let hash = Keccak256::digest(&uncompressed[1..]);
    Ok(to_checksum_address(&hex::encode(&hash[12..])))
}

/// EIP-55 checksum casing for a 40-hex-digit address (with or without 0x).
pub fn to_checksum_address(address: &str) -> String {
    let addr = address.trim_start_matches("0x").to_lowercase();
    let hash = Keccak256::digest(addr.as_bytes());
    let checksummed: String = addr
        .chars()
        .enumerate()
        .map(|(i, c)| {
            let nibble = (hash[i / 2] >> (4 * (1 - (i % 2)))) & 0x0f;
            if c.is_ascii_alphabetic() && nibble >= 8 {
                c.to_ascii_uppercase()
            } else {
                c
            }
        })
        .collect();
    format!("0x{}", checksummed)
}

/// Legacy P2PKH on Bitcoin mainnet.
pub fn bitcoin_p2pkh_address(public_key: &[u8]) -> Result<String, WalletError> {
    use bitcoin::{Address, Network, PublicKey};

    let pk = PublicKey::from_slice(public_key)
        .map_err(|_| WalletError::InvalidParameters("invalid secp256k1 public key".into()))?;
    Ok(Address::p2pkh(&pk, Network::Bitcoin).to_string())
}

/// Solana addresses are the base58 ed25519 public key.
pub fn solana_address(public_key: &[u8]) -> Result<String, WalletError> {
    if public_key.len() != 32 {
        return Err(WalletError::InvalidParameters("ed25519 public key must be 32 bytes".into()));
    }
    Ok(bs58::encode(public_key).into_string())
}
