//! Image Vault - Key Derivation
//!
//! The container key is a single unsalted SHA-256 pass over the raw
//! passphrase bytes. Every container ever written depends on this exact
//! derivation, so changing it is a format break, not a patch.

use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

/// Key length for AES-256
pub const KEY_LEN: usize = 32;

/// IV length for AES-CBC (one block)
pub const IV_LEN: usize = 16;

/// Derived container key, wiped on drop
pub struct ContainerKey {
    inner: Zeroizing<[u8; KEY_LEN]>,
}

impl ContainerKey {
    /// Expose the key bytes (use with caution)
    pub fn expose(&self) -> &[u8; KEY_LEN] {
        &self.inner
    }
}

impl std::fmt::Debug for ContainerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ContainerKey(..)")
    }
}

/// Derive the AES-256 key for a passphrase
///
/// Deterministic, no salt, no iterations. The codec puts no length
/// constraint on the passphrase; minimum length is upload policy.
pub fn derive_key(passphrase: &[u8]) -> ContainerKey {
    let mut inner = Zeroizing::new([0u8; KEY_LEN]);
    inner.copy_from_slice(&Sha256::digest(passphrase));
    ContainerKey { inner }
}

/// Generate a fresh random IV from the OS-seeded CSPRNG
pub fn generate_iv() -> [u8; IV_LEN] {
    let mut iv = [0u8; IV_LEN];
    rand::thread_rng().fill_bytes(&mut iv);
    iv
}
