//! BIP-32/BIP-44 derivation paths and the per-chain path table.
//!
//! Path format: `m/44'/coin_type'/account'/change/address_index`.
//! A component is hardened only when marked (`'`, `h` or `H`); the hardened
//! bit is OR-ed into the index at derivation time.
//!
//! Canonical paths (table version 1):
//! - Ethereum: `m/44'/60'/0'/0/0`
//! - Bitcoin: `m/44'/0'/0'/0/0`
//! - Solana: `m/44'/501'/0'/0'` (SLIP-0010, hardened only)

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::core::domain::{Chain, Curve};
use crate::core::errors::WalletError;

/// Hardened index offset (2^31).
pub const HARDENED_OFFSET: u32 = 0x8000_0000;

/// BIP-32 depth is a single byte.
const MAX_DEPTH: usize = 255;

/// Current version of the built-in path table.
pub const PATH_TABLE_VERSION: u32 = 1;

/// One path component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub struct ChildIndex {
    index: u32,
    hardened: bool,
}

impl ChildIndex {
    pub fn new(index: u32, hardened: bool) -> Result<Self, WalletError> {
        if index >= HARDENED_OFFSET {
            return Err(WalletError::UnsupportedPath(format!(
                "index {} out of range (must be < 2^31)",
                index
            )));
        }
        Ok(Self { index, hardened })
    }

    pub fn hardened(index: u32) -> Result<Self, WalletError> {
        Self::new(index, true)
    }

    pub fn normal(index: u32) -> Result<Self, WalletError> {
        Self::new(index, false)
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn is_hardened(&self) -> bool {
        self.hardened
    }

    /// Serialized BIP-32 index (`ser32` input).
    pub fn to_bip32(&self) -> u32 {
        if self.hardened {
            self.index | HARDENED_OFFSET
        } else {
            self.index
        }
    }
}

impl From<u32> for ChildIndex {
    fn from(raw: u32) -> Self {
        Self { index: raw & !HARDENED_OFFSET, hardened: raw & HARDENED_OFFSET != 0 }
    }
}

impl From<ChildIndex> for u32 {
    fn from(c: ChildIndex) -> u32 {
        c.to_bip32()
    }
}

impl fmt::Display for ChildIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hardened {
            write!(f, "{}'", self.index)
        } else {
            write!(f, "{}", self.index)
        }
    }
}

/// Immutable derivation path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<ChildIndex>", into = "Vec<ChildIndex>")]
pub struct DerivationPath {
    components: Vec<ChildIndex>,
}

impl DerivationPath {
    pub fn new(components: Vec<ChildIndex>) -> Result<Self, WalletError> {
        if components.len() > MAX_DEPTH {
            return Err(WalletError::UnsupportedPath(format!(
                "depth {} exceeds {}",
                components.len(),
                MAX_DEPTH
            )));
        }
        Ok(Self { components })
    }

    /// `m/44'/coin'/account'/change/index`
    pub fn bip44(coin_type: u32, account: u32, change: u32, address_index: u32) -> Result<Self, WalletError> {
        Self::new(vec![
            ChildIndex::hardened(44)?,
            ChildIndex::hardened(coin_type)?,
            ChildIndex::hardened(account)?,
            ChildIndex::normal(change)?,
            ChildIndex::normal(address_index)?,
        ])
    }

    /// `m/44'/coin'/account'/change'` as used by ed25519 wallets.
    pub fn bip44_hardened(coin_type: u32, account: u32, change: u32) -> Result<Self, WalletError> {
        Self::new(vec![
            ChildIndex::hardened(44)?,
            ChildIndex::hardened(coin_type)?,
            ChildIndex::hardened(account)?,
            ChildIndex::hardened(change)?,
        ])
    }

    pub fn components(&self) -> &[ChildIndex] {
        &self.components
    }

    pub fn depth(&self) -> usize {
        self.components.len()
    }

    pub fn is_fully_hardened(&self) -> bool {
        self.components.iter().all(ChildIndex::is_hardened)
    }

    /// Checks that the path can be derived on `curve`.
    pub fn check_curve(&self, curve: Curve) -> Result<(), WalletError> {
        if curve == Curve::Ed25519 && !self.is_fully_hardened() {
            return Err(WalletError::UnsupportedPath(format!(
                "{} has non-hardened components; ed25519 supports hardened derivation only",
                self
            )));
        }
        Ok(())
    }
}

impl TryFrom<Vec<ChildIndex>> for DerivationPath {
    type Error = WalletError;

    fn try_from(components: Vec<ChildIndex>) -> Result<Self, Self::Error> {
        Self::new(components)
    }
}

impl From<DerivationPath> for Vec<ChildIndex> {
    fn from(p: DerivationPath) -> Self {
        p.components
    }
}

impl fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("m")?;
        for c in &self.components {
            write!(f, "/{}", c)?;
        }
        Ok(())
    }
}

impl FromStr for DerivationPath {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().split('/');
        if parts.next() != Some("m") {
            return Err(WalletError::UnsupportedPath(format!("path must start with 'm': {}", s)));
        }
        let mut components = Vec::new();
        for part in parts {
            let (digits, hardened) = match part.strip_suffix(['\'', 'h', 'H']) {
                Some(d) => (d, true),
                None => (part, false),
            };
            if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
                return Err(WalletError::UnsupportedPath(format!("bad component '{}'", part)));
            }
            let index: u32 = digits
                .parse()
                .map_err(|_| WalletError::UnsupportedPath(format!("index '{}' out of range", digits)))?;
            components.push(ChildIndex::new(index, hardened)?);
        }
        Self::new(components)
    }
}

/// Versioned mapping from chain to its canonical derivation path.
///
/// The built-in table can be overridden from configuration when a chain's
/// convention changes; every override is checked against the chain's curve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTable {
    version: u32,
    paths: BTreeMap<Chain, DerivationPath>,
}

impl PathTable {
    /// Built-in table, version 1.
    pub fn standard() -> Self {
        // constant indices are in range, so every chain gets an entry
        let paths = Chain::ALL
            .into_iter()
            .filter_map(|chain| Self::canonical(chain).ok().map(|path| (chain, path)))
            .collect();
        Self { version: PATH_TABLE_VERSION, paths }
    }

    /// Account 0, first address: BIP-44 for secp256k1, all-hardened for ed25519.
    fn canonical(chain: Chain) -> Result<DerivationPath, WalletError> {
        match chain.curve() {
            Curve::Secp256k1 => DerivationPath::bip44(chain.coin_type(), 0, 0, 0),
            Curve::Ed25519 => DerivationPath::bip44_hardened(chain.coin_type(), 0, 0),
        }
    }

    /// Replaces the path for one chain and records the table version.
    pub fn with_override(mut self, version: u32, chain: Chain, path: DerivationPath) -> Result<Self, WalletError> {
        path.check_curve(chain.curve())?;
        self.paths.insert(chain, path);
        self.version = version;
        Ok(self)
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn path_for(&self, chain: Chain) -> Result<&DerivationPath, WalletError> {
        self.paths
            .get(&chain)
            .ok_or_else(|| WalletError::UnsupportedPath(format!("no path configured for {}", chain)))
    }
}

impl Default for PathTable {
    fn default() -> Self {
        Self::standard()
    }
}
