//! Shamir secret sharing over GF(2^8).
//!
//! Each secret byte gets its own random polynomial of degree `threshold - 1`
//! with the byte as constant term; share `x` holds the evaluations at `x`.
//! Any `threshold` shares interpolate back at zero, fewer reveal nothing.
//!
//! The shared bytes are `secret ‖ check`, where `check` is a truncated
//! SHA-256 over the threshold and the secret. It is split like the secret,
//! so it leaks nothing below the threshold, and `combine` refuses any
//! reconstruction whose check does not verify (e.g. shares whose threshold
//! byte was rewritten).
//!
//! Share byte format: `[threshold, index, value...]`.
//!
//! ```rust
//! # use wallet_keyvault::crypto::shamir::{split, combine};
//! let shares = split(b"hello", 3, 5).unwrap();
//! let subset = vec![shares[0].clone(), shares[2].clone(), shares[4].clone()];
//! let recovered = combine(&subset).unwrap();
//! assert_eq!(recovered.as_slice(), b"hello");
//! ```

use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::core::errors::WalletError;
use crate::crypto::envelope::{open_with_password, seal_with_password, EncryptedEnvelope};
use crate::crypto::kdf::KdfParams;
use crate::security::SecretVec;

/// AES reduction polynomial 0x11b, low byte.
const POLY: u8 = 0x1b;

const SHARE_AAD: &[u8] = b"WKC-SHARE-V1";

const CHECK_DOMAIN: &[u8] = b"WKC-SHARE-CHECK-V1";
const CHECK_LEN: usize = 16;

/// One share of a split secret.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretShare {
    pub index: u8,
    pub threshold: u8,
    pub value: SecretVec,
}

impl fmt::Debug for SecretShare {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretShare")
            .field("index", &self.index)
            .field("threshold", &self.threshold)
            .field("value", &format_args!("<{} bytes>", self.value.len()))
            .finish()
    }
}

impl SecretShare {
    pub fn to_bytes(&self) -> SecretVec {
        let mut out = Zeroizing::new(Vec::with_capacity(2 + self.value.len()));
        out.push(self.threshold);
        out.push(self.index);
        out.extend_from_slice(&self.value);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WalletError> {
        if bytes.len() < 3 {
            return Err(WalletError::InvalidParameters("share too short".into()));
        }
        let share = SecretShare {
            threshold: bytes[0],
            index: bytes[1],
            value: Zeroizing::new(bytes[2..].to_vec()),
        };
        if share.threshold == 0 || share.index == 0 {
            return Err(WalletError::InvalidParameters("share index and threshold must be non-zero".into()));
        }
        Ok(share)
    }
}

fn gf_mul(mut a: u8, mut b: u8) -> u8 {
    // constant-time: masks instead of data-dependent branches
    let mut r = 0u8;
    for _ in 0..8 {
        r ^= a & 0u8.wrapping_sub(b & 1);
        let carry = 0u8.wrapping_sub(a >> 7);
        a = (a << 1) ^ (POLY & carry);
        b >>= 1;
    }
    r
}

fn gf_inv(a: u8) -> Result<u8, WalletError> {
    if a == 0 {
        return Err(WalletError::InvalidParameters("zero has no inverse".into()));
    }
    // a^254
    let mut result = 1u8;
    let mut base = a;
    let mut e = 0xfe_u8;
    while e != 0 {
        if e & 1 != 0 {
            result = gf_mul(result, base);
        }
        base = gf_mul(base, base);
        e >>= 1;
    }
    Ok(result)
}

/// Horner evaluation, `coeffs[0]` is the constant term.
fn eval_poly_at(coeffs: &[u8], x: u8) -> u8 {
    coeffs.iter().rev().fold(0u8, |acc, &c| gf_mul(acc, x) ^ c)
}

/// Lagrange basis values at `x` for the nodes `xs`.
fn lagrange_basis(xs: &[u8], x: u8) -> Result<Vec<u8>, WalletError> {
    let mut basis = Vec::with_capacity(xs.len());
    for (j, &xj) in xs.iter().enumerate() {
        let mut num = 1u8;
        let mut den = 1u8;
        for (m, &xm) in xs.iter().enumerate() {
            if m == j {
                continue;
            }
            // subtraction is xor
            num = gf_mul(num, x ^ xm);
            den = gf_mul(den, xj ^ xm);
        }
        basis.push(gf_mul(num, gf_inv(den)?));
    }
    Ok(basis)
}

fn secret_check(threshold: u8, secret: &[u8]) -> [u8; CHECK_LEN] {
    let digest = Sha256::new()
        .chain_update(CHECK_DOMAIN)
        .chain_update([threshold])
        .chain_update(secret)
        .finalize();
    let mut check = [0u8; CHECK_LEN];
    check.copy_from_slice(&digest[..CHECK_LEN]);
    check
}

/// Splits `secret` into `total_shares` shares, any `threshold` of which recover it.
pub fn split(secret: &[u8], threshold: u8, total_shares: u8) -> Result<Vec<SecretShare>, WalletError> {
    if threshold == 0 || total_shares == 0 {
        return Err(WalletError::InvalidParameters("threshold and share count must be non-zero".into()));
    }
    if threshold > total_shares {
        return Err(WalletError::InvalidParameters("threshold cannot exceed share count".into()));
    }
    if secret.is_empty() {
        return Err(WalletError::InvalidParameters("secret cannot be empty".into()));
    }

    let mut shared = Zeroizing::new(Vec::with_capacity(secret.len() + CHECK_LEN));
    shared.extend_from_slice(secret);
    shared.extend_from_slice(&secret_check(threshold, secret));

    let k = threshold as usize;
    let mut coeffs = Zeroizing::new(vec![0u8; shared.len() * k]);
    for (byte_coeffs, &b) in coeffs.chunks_mut(k).zip(shared.iter()) {
        byte_coeffs[0] = b;
        OsRng.fill_bytes(&mut byte_coeffs[1..]);
    }

    let shares = (1..=total_shares)
        .map(|x| SecretShare {
            index: x,
            threshold,
            value: Zeroizing::new(coeffs.chunks(k).map(|c| eval_poly_at(c, x)).collect()),
        })
        .collect();
    Ok(shares)
}

/// Recovers the secret from at least `threshold` shares.
///
/// The first `threshold` shares are interpolated; any extra shares must lie
/// on the same polynomials or the set is rejected as inconsistent. The
/// recovered check must verify before any secret byte is returned.
pub fn combine(shares: &[SecretShare]) -> Result<SecretVec, WalletError> {
    let first = shares.first().ok_or(WalletError::InsufficientShares { have: 0, need: 1 })?;
    let threshold = first.threshold;
    let len = first.value.len();
    if threshold == 0 || len <= CHECK_LEN {
        return Err(WalletError::InvalidParameters("malformed share".into()));
    }

    let mut seen = HashSet::new();
    for s in shares {
        if s.threshold != threshold {
            return Err(WalletError::InvalidParameters("inconsistent threshold in shares".into()));
        }
        if s.index == 0 {
            return Err(WalletError::InvalidParameters("share index zero".into()));
        }
        if !seen.insert(s.index) {
            return Err(WalletError::InvalidParameters(format!("duplicate share index {}", s.index)));
        }
        if s.value.len() != len {
            return Err(WalletError::InvalidParameters("inconsistent share length".into()));
        }
    }
    let k = threshold as usize;
    if shares.len() < k {
        return Err(WalletError::InsufficientShares { have: shares.len(), need: k });
    }

    let (basis_shares, extra) = shares.split_at(k);
    let xs: Vec<u8> = basis_shares.iter().map(|s| s.index).collect();
    let interpolate = |x: u8| -> Result<SecretVec, WalletError> {
        let basis = lagrange_basis(&xs, x)?;
        let mut out = Zeroizing::new(vec![0u8; len]);
        for (byte_idx, out_byte) in out.iter_mut().enumerate() {
            *out_byte = basis_shares
                .iter()
                .zip(&basis)
                .fold(0u8, |acc, (s, &l)| acc ^ gf_mul(s.value[byte_idx], l));
        }
        Ok(out)
    };

    for s in extra {
        let expected = interpolate(s.index)?;
        if !bool::from(expected.as_slice().ct_eq(s.value.as_slice())) {
            return Err(WalletError::InvalidParameters("shares are inconsistent".into()));
        }
    }

    let mut shared = interpolate(0)?;
    let (secret, check) = shared.split_at(len - CHECK_LEN);
    let expected = secret_check(threshold, secret);
    if !bool::from(expected[..].ct_eq(check)) {
        return Err(WalletError::InvalidParameters("shares do not reconstruct a verified secret".into()));
    }
    shared.truncate(len - CHECK_LEN);
    Ok(shared)
}

/// Protects a share at rest under a password.
pub fn seal_share(share: &SecretShare, password: &[u8], params: &KdfParams) -> Result<EncryptedEnvelope, WalletError> {
    seal_with_password(&share.to_bytes(), password, SHARE_AAD, params)
}

pub fn open_share(envelope: &EncryptedEnvelope, password: &[u8]) -> Result<SecretShare, WalletError> {
    let bytes = open_with_password(envelope, password, SHARE_AAD)?;
    SecretShare::from_bytes(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slow_mul(mut a: u8, mut b: u8) -> u8 {
        let mut r = 0u8;
        while b != 0 {
            if b & 1 != 0 {
                r ^= a;
            }
            let hi = a & 0x80 != 0;
            a <<= 1;
            if hi {
                a ^= POLY;
            }
            b >>= 1;
        }
        r
    }

    #[test]
    fn test_gf_mul_matches_reference() {
        for a in 0..=255u8 {
            for b in 0..=255u8 {
                assert_eq!(gf_mul(a, b), slow_mul(a, b));
            }
        }
        // FIPS-197 example
        assert_eq!(gf_mul(0x57, 0x83), 0xc1);
    }

    #[test]
    fn test_gf_inv() {
        for a in 1..=255u8 {
            assert_eq!(gf_mul(a, gf_inv(a).unwrap()), 1);
        }
        assert!(gf_inv(0).is_err());
    }

    #[test]
    fn test_split_and_combine() {
        let secret = b"test secret data";
        let shares = split(secret, 3, 5).unwrap();
        assert_eq!(shares.len(), 5);
        let recovered = combine(&[shares[0].clone(), shares[2].clone(), shares[4].clone()]).unwrap();
        assert_eq!(&*recovered, secret);
    }

    #[test]
    fn test_all_combinations_threshold_3_of_5() {
        let secret = b"deterministic secret for combos";
        let shares = split(secret, 3, 5).unwrap();
        for i in 0..5 {
            for j in (i + 1)..5 {
                for k in (j + 1)..5 {
                    let subset = vec![shares[i].clone(), shares[j].clone(), shares[k].clone()];
                    assert_eq!(&*combine(&subset).unwrap(), secret, "combo {},{},{}", i, j, k);
                }
            }
        }
    }

    #[test]
    fn test_long_secret() {
        let secret = vec![0xabu8; 1000];
        let shares = split(&secret, 2, 3).unwrap();
        assert_eq!(&*combine(&shares[1..]).unwrap(), &secret);
    }

    #[test]
    fn test_insufficient_shares() {
        let shares = split(b"test", 3, 5).unwrap();
        assert_eq!(
            combine(&shares[..2]).unwrap_err(),
            WalletError::InsufficientShares { have: 2, need: 3 }
        );
        assert!(matches!(combine(&[]), Err(WalletError::InsufficientShares { .. })));
    }

    #[test]
    fn test_duplicate_index_rejected() {
        let mut shares = split(b"dup id test", 3, 5).unwrap();
        shares[1].index = shares[0].index;
        assert!(matches!(combine(&shares[..3]), Err(WalletError::InvalidParameters(_))));
    }

    #[test]
    fn test_inconsistent_extra_share_rejected() {
        let mut shares = split(b"consistency", 2, 4).unwrap();
        assert!(combine(&shares).is_ok());
        shares[3].value[0] ^= 1;
        assert!(matches!(combine(&shares), Err(WalletError::InvalidParameters(_))));
    }

    #[test]
    fn test_lowered_threshold_is_refused() {
        let mut shares = split(b"threshold bound", 3, 5).unwrap();
        // two shares relabelled as a 2-of-n set
        for s in shares.iter_mut().take(2) {
            s.threshold = 2;
        }
        assert_eq!(
            combine(&shares[..2]).unwrap_err(),
            WalletError::InvalidParameters("shares do not reconstruct a verified secret".into())
        );
    }

    #[test]
    fn test_share_carries_check_bytes() {
        let shares = split(b"abc", 2, 3).unwrap();
        assert_eq!(shares[0].value.len(), 3 + CHECK_LEN);
        let mut short = shares[0].clone();
        short.value.truncate(CHECK_LEN);
        assert!(matches!(combine(&[short]), Err(WalletError::InvalidParameters(_))));
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(split(b"x", 0, 5).is_err());
        assert!(split(b"x", 2, 0).is_err());
        assert!(split(b"x", 4, 3).is_err());
        assert!(split(b"", 2, 3).is_err());
    }

    #[test]
    fn test_share_bytes_roundtrip() {
        let shares = split(b"abc", 2, 2).unwrap();
        let bytes = shares[1].to_bytes();
        assert_eq!(bytes[0], 2);
        assert_eq!(bytes[1], 2);
        assert_eq!(SecretShare::from_bytes(&bytes).unwrap(), shares[1]);
        assert!(SecretShare::from_bytes(&[2, 0, 1]).is_err());
    }

    #[test]
    fn test_seal_and_open_share() {
        let params = KdfParams::Argon2id { m_cost_kib: 64, t_cost: 1, p_cost: 1 };
        let shares = split(b"seed bytes", 2, 3).unwrap();
        let env = seal_share(&shares[0], b"pw", &params).unwrap();
        assert_eq!(open_share(&env, b"pw").unwrap(), shares[0]);
        assert_eq!(open_share(&env, b"nope").unwrap_err(), WalletError::AuthenticationFailed);
    }
}
