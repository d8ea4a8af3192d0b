use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core::errors::WalletError;

/// Chains supported by the vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    /// EVM chains (secp256k1, EIP-55 address)
    Ethereum,
    /// Bitcoin mainnet, legacy P2PKH
    Bitcoin,
    /// Solana (ed25519 via SLIP-0010)
    Solana,
}

/// Elliptic curve used by a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Curve {
    Secp256k1,
    Ed25519,
}

impl Chain {
    pub const ALL: [Chain; 3] = [Chain::Ethereum, Chain::Bitcoin, Chain::Solana];

    pub fn curve(&self) -> Curve {
        match self {
            Chain::Ethereum | Chain::Bitcoin => Curve::Secp256k1,
            Chain::Solana => Curve::Ed25519,
        }
    }

    /// SLIP-44 coin type.
    pub fn coin_type(&self) -> u32 {
        match self {
            Chain::Ethereum => 60,
            Chain::Bitcoin => 0,
            Chain::Solana => 501,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Chain::Ethereum => "ethereum",
            Chain::Bitcoin => "bitcoin",
            Chain::Solana => "solana",
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Chain {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ethereum" | "eth" => Ok(Chain::Ethereum),
            "bitcoin" | "btc" => Ok(Chain::Bitcoin),
            "solana" | "sol" => Ok(Chain::Solana),
            other => Err(WalletError::InvalidParameters(format!("unsupported chain: {}", other))),
        }
    }
}
