// Helpers to avoid accidental printing of secrets in logs and Debug output.

/// Placeholder for secret bytes: only the length is shown.
pub fn redact_hex_bytes(bytes: &[u8]) -> String {
    format!("<redacted hex len={}>", bytes.len())
}

/// Shortened form of a public identifier (address, request id) for log lines.
pub fn short_id(s: &str) -> String {
    if s.len() <= 12 {
        return s.to_string();
    }
    format!("{}..{}", &s[..6], &s[s.len() - 4..])
}
