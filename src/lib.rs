// src/lib.rs
//! Multi-chain wallet key vault.
//!
//! - `core` - derivation, records, configuration and errors
//! - `crypto` - envelopes, KDFs, Shamir sharing and approvals
//! - `storage` - record codec, backup archives and the file store
//! - `service` - the `KeyVault` front end

pub mod cli;
pub mod core;
pub mod crypto;
pub mod security;
pub mod service;
pub mod storage;

pub use crate::core::errors::{Result, WalletError};
pub use crate::service::KeyVault;
