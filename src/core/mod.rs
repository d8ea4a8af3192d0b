pub mod address;
pub mod bip44;
pub mod config;
pub mod domain;
pub mod errors;
pub mod key_management;
pub mod key_manager;
pub mod validation;
pub mod wallet;
pub mod wallet_info;

pub use bip44::{ChildIndex, DerivationPath, PathTable};
pub use config::VaultConfig;
pub use domain::{Chain, Curve};
pub use errors::WalletError;
pub use key_management::{generate_mnemonic, seed_from_mnemonic, MnemonicPhrase, Seed};
pub use key_manager::{ChainKey, KeyDerivationEngine};
pub use wallet_info::{BalanceCache, WalletMetadata, WalletRecord};
