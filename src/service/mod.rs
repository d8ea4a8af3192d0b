pub mod wallet;

pub use wallet::{CreatedWallet, ImportSource, KeyVault};
