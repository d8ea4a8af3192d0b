use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::core::bip44::{DerivationPath, PathTable, PATH_TABLE_VERSION};
use crate::core::domain::Chain;
use crate::core::errors::WalletError;
use crate::crypto::kdf::KdfParams;
use crate::crypto::multisig::{ApprovalPolicy, VetoPolicy};

/// Environment variable that may override the storage root. Never secrets.
pub const HOME_ENV: &str = "KEYVAULT_HOME";

/// Storage configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "StorageConfig::default_root")]
    pub root: PathBuf,
}

impl StorageConfig {
    fn default_root() -> PathBuf {
        PathBuf::from("./data/keyvault")
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { root: Self::default_root() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KdfAlgorithm {
    Argon2id,
    Scrypt,
}

/// Password KDF settings for newly sealed envelopes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfConfig {
    #[serde(default = "KdfConfig::default_algorithm")]
    pub algorithm: KdfAlgorithm,
    #[serde(default = "KdfConfig::default_argon2_m_cost_kib")]
    pub argon2_m_cost_kib: u32,
    #[serde(default = "KdfConfig::default_argon2_t_cost")]
    pub argon2_t_cost: u32,
    #[serde(default = "KdfConfig::default_argon2_p_cost")]
    pub argon2_p_cost: u32,
    #[serde(default = "KdfConfig::default_scrypt_log_n")]
    pub scrypt_log_n: u8,
    #[serde(default = "KdfConfig::default_scrypt_r")]
    pub scrypt_r: u32,
    #[serde(default = "KdfConfig::default_scrypt_p")]
    pub scrypt_p: u32,
}

impl KdfConfig {
    fn default_algorithm() -> KdfAlgorithm { KdfAlgorithm::Argon2id }
    fn default_argon2_m_cost_kib() -> u32 { 19_456 }
    fn default_argon2_t_cost() -> u32 { 2 }
    fn default_argon2_p_cost() -> u32 { 1 }
    fn default_scrypt_log_n() -> u8 { 15 }
    fn default_scrypt_r() -> u32 { 8 }
    fn default_scrypt_p() -> u32 { 1 }

    pub fn params(&self) -> Result<KdfParams, WalletError> {
        let params = match self.algorithm {
            KdfAlgorithm::Argon2id => KdfParams::Argon2id {
                m_cost_kib: self.argon2_m_cost_kib,
                t_cost: self.argon2_t_cost,
                p_cost: self.argon2_p_cost,
            },
            KdfAlgorithm::Scrypt => KdfParams::Scrypt { log_n: self.scrypt_log_n, r: self.scrypt_r, p: self.scrypt_p },
        };
        params.validate().map_err(|e| WalletError::ConfigError(e.to_string()))?;
        Ok(params)
    }
}

impl Default for KdfConfig {
    fn default() -> Self {
        Self {
            algorithm: Self::default_algorithm(),
            argon2_m_cost_kib: Self::default_argon2_m_cost_kib(),
            argon2_t_cost: Self::default_argon2_t_cost(),
            argon2_p_cost: Self::default_argon2_p_cost(),
            scrypt_log_n: Self::default_scrypt_log_n(),
            scrypt_r: Self::default_scrypt_r(),
            scrypt_p: Self::default_scrypt_p(),
        }
    }
}

/// Derivation path table selection and per-chain overrides
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivationConfig {
    #[serde(default = "DerivationConfig::default_table_version")]
    pub table_version: u32,
    /// chain -> path string, e.g. `ethereum = "m/44'/60'/0'/0/0"`
    #[serde(default)]
    pub overrides: BTreeMap<Chain, String>,
}

impl DerivationConfig {
    fn default_table_version() -> u32 {
        PATH_TABLE_VERSION
    }

    pub fn path_table(&self) -> Result<PathTable, WalletError> {
        let mut table = PathTable::standard();
        if self.overrides.is_empty() && self.table_version != PATH_TABLE_VERSION {
            return Err(WalletError::ConfigError(format!(
                "unknown path table version {} without overrides",
                self.table_version
            )));
        }
        for (chain, path) in &self.overrides {
            let parsed: DerivationPath = path
                .parse()
                .map_err(|e: WalletError| WalletError::ConfigError(format!("{}: {}", chain, e)))?;
            table = table
                .with_override(self.table_version, *chain, parsed)
                .map_err(|e| WalletError::ConfigError(format!("{}: {}", chain, e)))?;
        }
        Ok(table)
    }
}

impl Default for DerivationConfig {
    fn default() -> Self {
        Self { table_version: Self::default_table_version(), overrides: BTreeMap::new() }
    }
}

/// Approval workflow settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalConfig {
    #[serde(default = "ApprovalConfig::default_ttl_secs")]
    pub default_ttl_secs: u64,
    #[serde(default)]
    pub veto: VetoPolicy,
    /// Finished requests are dropped this long after they leave Pending.
    #[serde(default = "ApprovalConfig::default_retention_secs")]
    pub terminal_retention_secs: u64,
}

impl ApprovalConfig {
    fn default_ttl_secs() -> u64 {
        24 * 3600
    }

    fn default_retention_secs() -> u64 {
        3600
    }

    pub fn policy(&self) -> Result<ApprovalPolicy, WalletError> {
        ApprovalPolicy::new(self.default_ttl_secs, self.veto.clone())
            .and_then(|p| p.with_retention_secs(self.terminal_retention_secs))
            .map_err(|e| WalletError::ConfigError(e.to_string()))
    }
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: Self::default_ttl_secs(),
            veto: VetoPolicy::default(),
            terminal_retention_secs: Self::default_retention_secs(),
        }
    }
}

/// Vault configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub kdf: KdfConfig,
    #[serde(default)]
    pub derivation: DerivationConfig,
    #[serde(default)]
    pub approval: ApprovalConfig,
}

impl VaultConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, WalletError> {
        let config: VaultConfig = toml::from_str(s).map_err(|e| WalletError::ConfigError(e.message().to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a TOML file, then applies `KEYVAULT_HOME` if set.
    pub fn load(path: &Path) -> Result<Self, WalletError> {
        let text = std::fs::read_to_string(path).map_err(|e| WalletError::storage("read config", e))?;
        let mut config = Self::from_toml_str(&text)?;
        config.apply_env();
        Ok(config)
    }

    /// Defaults plus `KEYVAULT_HOME`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    pub fn apply_env(&mut self) {
        if let Some(home) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
            self.storage.root = PathBuf::from(home);
        }
    }

    /// Checks every section without touching the filesystem.
    pub fn validate(&self) -> Result<(), WalletError> {
        self.kdf.params()?;
        self.derivation.path_table()?;
        self.approval.policy()?;
        Ok(())
    }
}
