//! Small helpers and aliases for secret buffers that must be zeroized on drop.
use std::ops::Deref;
use zeroize::Zeroizing;

/// Common alias for secret byte buffers which will be zeroed when dropped.
pub type SecretVec = Zeroizing<Vec<u8>>;

/// Fixed-size 32-byte secret (private scalars, derived AEAD keys).
pub type SecretKey32 = Zeroizing<[u8; 32]>;


/// Copies a slice into a zeroizing 32-byte array. Returns `None` on length mismatch.
pub fn secret_key32(bytes: &[u8]) -> Option<SecretKey32> {
    if bytes.len() != 32 {
        return None;
    }
    let mut out = Zeroizing::new([0u8; 32]);
    out.copy_from_slice(bytes);
    Some(out)
}

/// secp256k1 secret key that is wiped when it goes out of scope.
pub struct ScopedSecretKey(secp256k1::SecretKey);

impl ScopedSecretKey {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, secp256k1::Error> {
        secp256k1::SecretKey::from_slice(bytes).map(Self)
    }

    pub fn wipe(&mut self) {
        self.0.non_secure_erase();
    }
}

impl From<secp256k1::SecretKey> for ScopedSecretKey {
    fn from(key: secp256k1::SecretKey) -> Self {
        Self(key)
    }
}

impl Deref for ScopedSecretKey {
    type Target = secp256k1::SecretKey;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Drop for ScopedSecretKey {
    fn drop(&mut self) {
        self.wipe();
    }
}
