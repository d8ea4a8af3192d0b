pub mod envelope;
pub mod kdf;
pub mod multisig;
pub mod shamir;

pub use self::envelope::{open_with_key, open_with_password, seal_with_key, seal_with_password, EncryptedEnvelope};
pub use self::kdf::KdfParams;
pub use self::multisig::ApprovalWorkflow;
pub use self::shamir::{combine, split, SecretShare};
