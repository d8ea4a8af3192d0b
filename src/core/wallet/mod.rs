// filepath: src/core/wallet/mod.rs
pub mod create;
pub mod recover;

pub use create::{new_wallet_id, seal_chain_key};
pub use recover::unlock_record;
