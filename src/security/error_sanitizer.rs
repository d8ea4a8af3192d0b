//! Error message scrubbing.
//!
//! Anything that ends up in an error string or a log line passes through
//! [`sanitize_error_message`] first so key material and local paths never
//! cross the API boundary.

use once_cell::sync::Lazy;
use regex::Regex;

static SENSITIVE_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    vec![
        // extended keys
        (
            Regex::new(r"\b[xt]prv[1-9A-HJ-NP-Za-km-z]{100,}\b").expect("hardcoded regex"),
            "[REDACTED_XPRV]",
        ),
        // 32-byte hex scalars, with or without 0x
        (Regex::new(r"\b(?:0x)?[0-9a-fA-F]{64}\b").expect("hardcoded regex"), "[REDACTED_KEY]"),
        // 12..24 word phrases
        (
            Regex::new(r"\b([a-z]{3,8}\s+){11,23}[a-z]{3,8}\b").expect("hardcoded regex"),
            "[REDACTED_MNEMONIC]",
        ),
        (
            Regex::new(r#"(?i)(password|passphrase)['"]?\s*[:=]\s*['"]?[^\s'"]+"#)
                .expect("hardcoded regex"),
            "$1=[REDACTED]",
        ),
        // local filesystem paths
        (
            Regex::new(r"(?i)[a-z]:\\[^\s]+|(?:/home|/root|/tmp|/var|/Users|/private)/[^\s]*")
                .expect("hardcoded regex"),
            "[REDACTED_PATH]",
        ),
    ]
});

/// Scrubs key material, phrases, passwords and local paths from `message`.
pub fn sanitize_error_message(message: &str) -> String {
    let mut sanitized = message.to_string();
    for (pattern, replacement) in SENSITIVE_PATTERNS.iter() {
        sanitized = pattern.replace_all(&sanitized, *replacement).to_string();
    }
    sanitized
}

/// Generic text for a taxonomy kind, used when even the scrubbed message is
/// too much to show.
pub fn user_friendly_error(kind: &str) -> &'static str {
    match kind {
        "AuthenticationFailed" | "WrongPassword" => "The password is incorrect or the data is damaged",
        "IntegrityCheckFailed" => "The wallet record failed its integrity check and was not loaded",
        "InvalidSeed" => "The recovery phrase is not valid",
        "UnsupportedPath" => "The derivation path is not supported",
        "UnsupportedVersion" | "UnsupportedAlgorithmVersion" => {
            "The file was written by an unsupported version"
        }
        "MalformedEnvelope" | "MalformedRecord" | "CorruptArchive" => "The file is damaged",
        "InvalidSignature" | "UnknownSigner" => "The approval could not be verified",
        "RequestAlreadyTerminal" => "The request is already closed",
        "InsufficientShares" => "Not enough recovery shares were provided",
        "PathValidationFailed" => "The identifier contains forbidden characters",
        "NotFound" => "The wallet does not exist",
        _ => "The operation failed",
    }
}
