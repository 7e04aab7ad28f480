//! Image Vault - AES-256-CBC
//!
//! PKCS#7 padded CBC. There is no authentication tag: an unpad failure is
//! the only signal that the key was wrong, and it is reported exactly like
//! corrupted ciphertext.

use aes::Aes256;
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};

use super::keys::{ContainerKey, IV_LEN};
use crate::error::{VaultError, VaultResult};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// AES block size
pub const BLOCK_LEN: usize = 16;

/// Encrypt with AES-256-CBC, output padded to a whole number of blocks
pub fn encrypt_cbc(key: &ContainerKey, iv: &[u8; IV_LEN], plaintext: &[u8]) -> Vec<u8> {
    Aes256CbcEnc::new(key.expose().into(), iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext)
}

/// Decrypt with AES-256-CBC
///
/// Any failure (ragged length, bad padding) is `InvalidKey`.
pub fn decrypt_cbc(
    key: &ContainerKey,
    iv: &[u8; IV_LEN],
    ciphertext: &[u8],
) -> VaultResult<Vec<u8>> {
    Aes256CbcDec::new(key.expose().into(), iv.into())
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| VaultError::InvalidKey)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::derive_key;

    const IV: [u8; IV_LEN] = [
        0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07,
        0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e, 0x0f,
    ];

    /// AES-256-CBC(SHA-256("test123"), IV, [1, 2, 3])
    const KNOWN_CIPHERTEXT: [u8; 16] = [
        0x07, 0x99, 0xad, 0x6e, 0xe5, 0x4a, 0x04, 0x48,
        0xf4, 0x08, 0xfc, 0x5f, 0xb6, 0x36, 0xaf, 0x5c,
    ];

    #[test]
    fn test_known_answer() {
        let key = derive_key(b"test123");
        assert_eq!(encrypt_cbc(&key, &IV, &[1, 2, 3]), KNOWN_CIPHERTEXT);
        assert_eq!(decrypt_cbc(&key, &IV, &KNOWN_CIPHERTEXT).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_padding_always_adds_a_block_when_aligned() {
        let key = derive_key(b"k");
        assert_eq!(encrypt_cbc(&key, &IV, &[]).len(), BLOCK_LEN);
        assert_eq!(encrypt_cbc(&key, &IV, &[0u8; 16]).len(), 2 * BLOCK_LEN);
        assert_eq!(encrypt_cbc(&key, &IV, &[0u8; 17]).len(), 2 * BLOCK_LEN);
    }

    #[test]
    fn test_wrong_key_is_invalid_key() {
        for wrong in [&b"wrong"[..], b"test124", b"Test123", b"test12", b""] {
            let result = decrypt_cbc(&derive_key(wrong), &IV, &KNOWN_CIPHERTEXT);
            assert!(matches!(result, Err(VaultError::InvalidKey)));
        }
    }

    #[test]
    fn test_ragged_ciphertext_is_invalid_key() {
        let key = derive_key(b"test123");
        assert!(matches!(
            decrypt_cbc(&key, &IV, &KNOWN_CIPHERTEXT[..15]),
            Err(VaultError::InvalidKey)
        ));
        assert!(matches!(decrypt_cbc(&key, &IV, &[]), Err(VaultError::InvalidKey)));
    }
}
