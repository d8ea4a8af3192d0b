//! BIP-39 mnemonics and seeds.
//!
//! Seeds and phrases only ever live in zeroizing buffers and are never
//! serialized.

use bip39::{Language, Mnemonic};
use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt;
use zeroize::Zeroizing;

use crate::core::errors::WalletError;

/// Binary seed (BIP-32 accepts 16..=64 bytes; BIP-39 produces 64).
pub struct Seed(Zeroizing<Vec<u8>>);

impl Seed {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WalletError> {
        if !(16..=64).contains(&bytes.len()) {
            return Err(WalletError::InvalidSeed(format!(
                "seed must be 16..=64 bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Self(Zeroizing::new(bytes.to_vec())))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Seed").field("len", &self.0.len()).finish_non_exhaustive()
    }
}

/// A mnemonic sentence handed to the caller once. Cleared on drop.
pub struct MnemonicPhrase(Zeroizing<String>);

impl MnemonicPhrase {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn word_count(&self) -> usize {
        self.0.split_whitespace().count()
    }
}

impl fmt::Debug for MnemonicPhrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MnemonicPhrase([REDACTED; {} words])", self.word_count())
    }
}

/// Generates a fresh English mnemonic from OS randomness.
///
/// `word_count` must be one of 12, 15, 18, 21 or 24.
pub fn generate_mnemonic(word_count: usize) -> Result<MnemonicPhrase, WalletError> {
    if !matches!(word_count, 12 | 15 | 18 | 21 | 24) {
        return Err(WalletError::InvalidParameters(format!(
            "unsupported mnemonic length {}",
            word_count
        )));
    }
    let mut entropy = Zeroizing::new([0u8; 32]);
    let len = word_count * 4 / 3;
    OsRng.fill_bytes(&mut entropy[..len]);
    let mnemonic = Zeroizing::new(
        Mnemonic::from_entropy_in(Language::English, &entropy[..len])
            .map_err(|e| WalletError::InvalidSeed(e.to_string()))?,
    );
    Ok(MnemonicPhrase(Zeroizing::new(mnemonic.to_string())))
}

/// Parses and checksum-validates `phrase`, then stretches it into a seed
/// with the optional BIP-39 passphrase.
pub fn seed_from_mnemonic(phrase: &str, passphrase: &str) -> Result<Seed, WalletError> {
    let normalized = Zeroizing::new(
        phrase
            .split_whitespace()
            .map(str::to_lowercase)
            .collect::<Vec<_>>()
            .join(" "),
    );
    let mnemonic = Zeroizing::new(
        Mnemonic::parse_in_normalized(Language::English, &normalized)
            .map_err(|e| WalletError::InvalidSeed(e.to_string()))?,
    );
    let seed = Zeroizing::new(mnemonic.to_seed(passphrase));
    Seed::from_bytes(&seed[..])
}

#[cfg(test)]
mod tests {
    use super::*;

    const ABANDON: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[test]
    fn test_trezor_vector() {
        let seed = seed_from_mnemonic(ABANDON, "TREZOR").unwrap();
        assert_eq!(
            hex::encode(seed.as_bytes()),
            "c55257c360c07c72029aebc1b53c05ed0362ada38ead3e3e9efa3708e53495531f09a6987599d18264c1e1c92f2cf141630c7a3c4ab7c81b2f001698e7463b04"
        );
    }

    #[test]
    fn test_whitespace_and_case_normalized() {
        let messy = format!("  {}  ", ABANDON.to_uppercase().replace(' ', "   "));
        let a = seed_from_mnemonic(ABANDON, "").unwrap();
        let b = seed_from_mnemonic(&messy, "").unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_bad_checksum_is_invalid_seed() {
        let bad = ABANDON.replace("about", "abandon");
        assert!(matches!(seed_from_mnemonic(&bad, ""), Err(WalletError::InvalidSeed(_))));
        assert!(matches!(seed_from_mnemonic("not a phrase", ""), Err(WalletError::InvalidSeed(_))));
    }

    #[test]
    fn test_generate_word_counts() {
        for n in [12, 15, 18, 21, 24] {
            let m = generate_mnemonic(n).unwrap();
            assert_eq!(m.word_count(), n);
            assert!(seed_from_mnemonic(m.as_str(), "").is_ok());
        }
        assert!(generate_mnemonic(13).is_err());
    }

    #[test]
    fn test_debug_redacts() {
        let m = generate_mnemonic(12).unwrap();
        assert_eq!(format!("{:?}", m), "MnemonicPhrase([REDACTED; 12 words])");
        let s = seed_from_mnemonic(ABANDON, "").unwrap();
        assert!(!format!("{:?}", s).contains(&hex::encode(&s.as_bytes()[..4])));
    }

    #[test]
    fn test_seed_length_bounds() {
        assert!(Seed::from_bytes(&[0u8; 15]).is_err());
        assert!(Seed::from_bytes(&[0u8; 16]).is_ok());
        assert!(Seed::from_bytes(&[0u8; 65]).is_err());
    }
}
