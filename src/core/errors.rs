//! Error taxonomy shared by every component of the vault.
//!
//! Messages are deliberately coarse: cryptographic failures never say which
//! input was wrong, and I/O failures carry a scrubbed context string only.
//! Raw detail is logged locally through `tracing` at the point of failure.

use thiserror::Error;

use crate::security::error_sanitizer::sanitize_error_message;

/// Custom error type for vault operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WalletError {
    /// AEAD tag did not verify (wrong key, nonce, ciphertext or AAD).
    #[error("authentication failed")]
    AuthenticationFailed,
    /// Record integrity tag mismatch; the record is treated as tampered.
    #[error("integrity check failed")]
    IntegrityCheckFailed,
    /// Outer backup envelope did not authenticate.
    #[error("wrong password or damaged archive")]
    WrongPassword,
    /// Malformed mnemonic, bad checksum or unusable seed length.
    #[error("invalid seed: {0}")]
    InvalidSeed(String),
    /// Derivation path component out of range or not supported by the curve.
    #[error("unsupported derivation path: {0}")]
    UnsupportedPath(String),
    /// Internal derivation failure. Never expected for valid inputs.
    #[error("key derivation failed")]
    DerivationFailed,
    /// Unknown record/archive format version.
    #[error("unsupported format version {0}")]
    UnsupportedVersion(u8),
    /// Unknown envelope algorithm or envelope version.
    #[error("unsupported algorithm version {0}")]
    UnsupportedAlgorithmVersion(u8),
    /// Envelope is missing fields or has impossible lengths.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),
    /// Wallet record bytes do not match the expected shape.
    #[error("malformed record: {0}")]
    MalformedRecord(String),
    /// Backup archive bytes do not match the expected shape.
    #[error("corrupt archive: {0}")]
    CorruptArchive(String),
    /// Approval signature did not verify against the signer key.
    #[error("invalid signature")]
    InvalidSignature,
    /// Signer id is not registered.
    #[error("unknown signer: {0}")]
    UnknownSigner(String),
    /// Approval request already reached a terminal state.
    #[error("request {id} is already {status}")]
    RequestAlreadyTerminal { id: String, status: String },
    /// Signer is not allowed to veto under the configured policy.
    #[error("signer {0} may not reject requests")]
    VetoNotPermitted(String),
    /// Fewer shares than the threshold were supplied.
    #[error("insufficient shares: have {have}, need {need}")]
    InsufficientShares { have: usize, need: usize },
    /// Invalid caller-supplied parameters.
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),
    /// A user-supplied identifier failed the path allow-list.
    #[error("path validation failed")]
    PathValidationFailed,
    /// Requested wallet/request does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// A wallet with the same identity already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),
    /// Storage failure (scrubbed context only).
    #[error("storage error: {0}")]
    StorageError(String),
    /// Configuration errors.
    #[error("configuration error: {0}")]
    ConfigError(String),
}

impl WalletError {
    /// Builds a storage error from an I/O failure. The full error is logged
    /// locally; the returned value only carries the sanitized context.
    pub fn storage(context: &str, err: impl std::fmt::Display) -> Self {
        tracing::warn!(context, error = %sanitize_error_message(&err.to_string()), "storage failure");
        WalletError::StorageError(context.to_string())
    }

    /// Stable taxonomy name for surfacing across the API boundary.
    pub fn kind(&self) -> &'static str {
        match self {
            WalletError::AuthenticationFailed => "AuthenticationFailed",
            WalletError::IntegrityCheckFailed => "IntegrityCheckFailed",
            WalletError::WrongPassword => "WrongPassword",
            WalletError::InvalidSeed(_) => "InvalidSeed",
            WalletError::UnsupportedPath(_) => "UnsupportedPath",
            WalletError::DerivationFailed => "DerivationFailed",
            WalletError::UnsupportedVersion(_) => "UnsupportedVersion",
            WalletError::UnsupportedAlgorithmVersion(_) => "UnsupportedAlgorithmVersion",
            WalletError::MalformedEnvelope(_) => "MalformedEnvelope",
            WalletError::MalformedRecord(_) => "MalformedRecord",
            WalletError::CorruptArchive(_) => "CorruptArchive",
            WalletError::InvalidSignature => "InvalidSignature",
            WalletError::UnknownSigner(_) => "UnknownSigner",
            WalletError::RequestAlreadyTerminal { .. } => "RequestAlreadyTerminal",
            WalletError::VetoNotPermitted(_) => "VetoNotPermitted",
            WalletError::InsufficientShares { .. } => "InsufficientShares",
            WalletError::InvalidParameters(_) => "InvalidParameters",
            WalletError::PathValidationFailed => "PathValidationFailed",
            WalletError::NotFound(_) => "NotFound",
            WalletError::AlreadyExists(_) => "AlreadyExists",
            WalletError::StorageError(_) => "StorageError",
            WalletError::ConfigError(_) => "ConfigError",
        }
    }

    /// Safe, non-sensitive description for a CLI or UI.
    pub fn user_message(&self) -> String {
        sanitize_error_message(&self.to_string())
    }

    /// Errors that indicate tampering or a cryptographic fault.
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            WalletError::AuthenticationFailed
                | WalletError::IntegrityCheckFailed
                | WalletError::DerivationFailed
        )
    }
}

impl From<std::io::Error> for WalletError {
    fn from(err: std::io::Error) -> Self {
        WalletError::storage("i/o failure", err)
    }
}

pub type Result<T, E = WalletError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_does_not_distinguish_auth_failures() {
        assert_eq!(WalletError::AuthenticationFailed.to_string(), "authentication failed");
        assert_eq!(WalletError::WrongPassword.kind(), "WrongPassword");
    }

    #[test]
    fn test_from_io_error_is_scrubbed() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "open /root/secret/wallet.wkr");
        let err: WalletError = io.into();
        assert_eq!(err, WalletError::StorageError("i/o failure".to_string()));
        assert!(!err.user_message().contains("/root"));
    }

    #[test]
    fn test_terminal_error_message() {
        let err = WalletError::RequestAlreadyTerminal {
            id: "abc".into(),
            status: "approved".into(),
        };
        assert_eq!(err.to_string(), "request abc is already approved");
        assert_eq!(err.kind(), "RequestAlreadyTerminal");
    }

    #[test]
    fn test_is_critical() {
        assert!(WalletError::IntegrityCheckFailed.is_critical());
        assert!(!WalletError::NotFound("x".into()).is_critical());
    }
}
