// src/security/mod.rs
//! Security helpers: zeroizing buffers, redaction and error scrubbing.

pub mod error_sanitizer;
pub mod redaction;
pub mod secret;

// Secret buffer alias re-export
pub use secret::{SecretKey32, SecretVec};

pub use error_sanitizer::sanitize_error_message;
pub use redaction::{redact_hex_bytes, short_id};
