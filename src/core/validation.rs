use once_cell::sync::Lazy;
use regex::Regex;
use sha3::{Digest, Keccak256};

use crate::core::domain::Chain;
use crate::core::errors::WalletError;

/// Allow-list for user-supplied identifiers that end up in filesystem paths.
static PATH_COMPONENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("Hardcoded regex should always compile"));

static ETH_ADDRESS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^0x[0-9a-fA-F]{40}$").expect("Hardcoded regex should always compile"));

/// Validates a wallet or agent id before it is joined into a path.
///
/// Separators, `..`, empty strings and anything outside `[A-Za-z0-9_-]`
/// are rejected with `PathValidationFailed`.
pub fn validate_path_component(id: &str) -> Result<(), WalletError> {
    if PATH_COMPONENT.is_match(id) {
        Ok(())
    } else {
        Err(WalletError::PathValidationFailed)
    }
}

/// Display names are free text but bounded and free of control characters.
pub fn validate_display_name(name: &str) -> Result<(), WalletError> {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed.chars().count() > 128 {
        return Err(WalletError::InvalidParameters("display name must be 1..=128 characters".into()));
    }
    if trimmed.chars().any(char::is_control) {
        return Err(WalletError::InvalidParameters("display name contains control characters".into()));
    }
    Ok(())
}

/// Validates an Ethereum address.
pub fn validate_ethereum_address(address: &str) -> Result<(), WalletError> {
    if !ETH_ADDRESS.is_match(address) {
        return Err(WalletError::InvalidParameters("invalid Ethereum address format".into()));
    }
    // EIP-55: if mixed-case, enforce checksum. All-lower or all-upper acceptable for compatibility.
    let body = &address[2..];
    let is_all_lower = !body.chars().any(|c| c.is_ascii_uppercase());
    let is_all_upper = !body.chars().any(|c| c.is_ascii_lowercase());
    if is_all_lower || is_all_upper || is_eip55_checksum_valid(address) {
        Ok(())
    } else {
        Err(WalletError::InvalidParameters("invalid EIP-55 checksum".into()))
    }
}

pub fn is_eip55_checksum_valid(addr: &str) -> bool {
    if addr.len() != 42 || !addr.starts_with("0x") {
        return false;
    }
    let body = &addr[2..];
    let hash = Keccak256::digest(body.to_lowercase().as_bytes());
    for (i, ch) in body.chars().enumerate() {
        let nibble = (hash[i / 2] >> (4 * (1 - (i % 2)))) & 0x0f;
        match ch {
            'a'..='f' if nibble >= 8 => return false,
            'A'..='F' if nibble < 8 => return false,
            _ => {}
        }
    }
    true
}

/// Base58 ed25519 public key (Solana).
pub fn validate_base58_address(address: &str) -> Result<(), WalletError> {
    if address.len() < 32 || address.len() > 44 {
        return Err(WalletError::InvalidParameters("invalid base58 address length".into()));
    }
    match bs58::decode(address).into_vec() {
        Ok(decoded) if decoded.len() == 32 => Ok(()),
        Ok(_) => Err(WalletError::InvalidParameters("invalid base58 address decoded length".into())),
        Err(_) => Err(WalletError::InvalidParameters("invalid base58 address encoding".into())),
    }
}

/// Legacy P2PKH mainnet address: base58check, version byte 0x00.
pub fn validate_bitcoin_address(address: &str) -> Result<(), WalletError> {
    let decoded = bs58::decode(address)
        .with_check(None)
        .into_vec()
        .map_err(|_| WalletError::InvalidParameters("invalid base58check address".into()))?;
    if decoded.len() != 21 || decoded[0] != 0x00 {
        return Err(WalletError::InvalidParameters("not a mainnet P2PKH address".into()));
    }
    Ok(())
}

/// Validates an address for the given chain.
pub fn validate_address(chain: Chain, address: &str) -> Result<(), WalletError> {
    match chain {
        Chain::Ethereum => validate_ethereum_address(address),
        Chain::Bitcoin => validate_bitcoin_address(address),
        Chain::Solana => validate_base58_address(address),
    }
}
