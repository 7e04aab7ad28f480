//! Container codec for Image Vault
//!
//! Format of a `.enc` file:
//! ```text
//! [LENGTH 4B][u32 big-endian, byte length of METADATA]
//! [METADATA variable][compact UTF-8 JSON object]
//! [IV 16B][random, fresh for every encryption]
//! [CIPHERTEXT variable][AES-256-CBC, PKCS#7 padded]
//! ```
//!
//! Metadata sits in the clear so listings never need a passphrase. The key
//! is `SHA-256(passphrase)` and is never stored.

use crate::crypto::{decrypt_cbc, derive_key, encrypt_cbc, generate_iv, IV_LEN};
use crate::error::{VaultError, VaultResult};
use crate::metadata::ImageMeta;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Size of the metadata length prefix
pub const LENGTH_PREFIX_LEN: usize = 4;

/// File suffix for containers
pub const CONTAINER_EXTENSION: &str = "enc";

// ---------------------------------------------------------------------------
// ContainerView
// ---------------------------------------------------------------------------

/// A container split into its regions, borrowing the input buffer
#[derive(Debug)]
pub struct ContainerView<'a> {
    /// Raw metadata JSON bytes
    pub metadata: &'a [u8],
    /// Everything after the metadata block: IV then ciphertext
    pub payload: &'a [u8],
}

impl<'a> ContainerView<'a> {
    /// Split off the length prefix and metadata block
    pub fn parse(data: &'a [u8]) -> VaultResult<Self> {
        if data.len() < LENGTH_PREFIX_LEN {
            return Err(VaultError::MalformedContainer(format!(
                "{} bytes is shorter than the length prefix",
                data.len()
            )));
        }

        let mut prefix = [0u8; LENGTH_PREFIX_LEN];
        prefix.copy_from_slice(&data[..LENGTH_PREFIX_LEN]);
        let declared = u32::from_be_bytes(prefix) as usize;

        let rest = &data[LENGTH_PREFIX_LEN..];
        if declared > rest.len() {
            return Err(VaultError::MalformedContainer(format!(
                "metadata length {} exceeds remaining {} bytes",
                declared,
                rest.len()
            )));
        }

        let (metadata, payload) = rest.split_at(declared);
        Ok(Self { metadata, payload })
    }

    /// Deserialize the metadata block; absent tags become `[]`
    pub fn metadata(&self) -> VaultResult<ImageMeta> {
        let text = std::str::from_utf8(self.metadata)
            .map_err(|e| VaultError::MalformedContainer(format!("metadata is not UTF-8: {}", e)))?;
        serde_json::from_str(text).map_err(|e| {
            VaultError::MalformedContainer(format!("metadata is not a JSON object: {}", e))
        })
    }

    /// IV and ciphertext regions
    pub fn iv_and_ciphertext(&self) -> VaultResult<([u8; IV_LEN], &'a [u8])> {
        if self.payload.len() < IV_LEN {
            return Err(VaultError::MalformedContainer(format!(
                "IV truncated: {} of {} bytes present",
                self.payload.len(),
                IV_LEN
            )));
        }
        let (iv_bytes, ciphertext) = self.payload.split_at(IV_LEN);
        let mut iv = [0u8; IV_LEN];
        iv.copy_from_slice(iv_bytes);
        Ok((iv, ciphertext))
    }
}

// ---------------------------------------------------------------------------
// Codec operations
// ---------------------------------------------------------------------------

/// Encrypt `plaintext` under `passphrase` and frame it with `metadata`
///
/// Pure transform; the caller persists the result.
pub fn encode(plaintext: &[u8], passphrase: &[u8], metadata: &ImageMeta) -> VaultResult<Vec<u8>> {
    encode_with_iv(plaintext, passphrase, metadata, &generate_iv())
}

/// Frame already-encrypted data. Used by [`encode`] and by keyless legacy
/// migration, which must keep the original IV and ciphertext.
pub fn frame(metadata: &ImageMeta, iv: &[u8; IV_LEN], ciphertext: &[u8]) -> VaultResult<Vec<u8>> {
    let json = serde_json::to_vec(metadata)?;
    let declared = u32::try_from(json.len()).map_err(|_| {
        VaultError::InvalidInput(format!("metadata block of {} bytes is too large", json.len()))
    })?;

    let mut output = Vec::with_capacity(LENGTH_PREFIX_LEN + json.len() + IV_LEN + ciphertext.len());
    output.extend_from_slice(&declared.to_be_bytes());
    output.extend_from_slice(&json);
    output.extend_from_slice(iv);
    output.extend_from_slice(ciphertext);
    Ok(output)
}

pub(crate) fn encode_with_iv(
    plaintext: &[u8],
    passphrase: &[u8],
    metadata: &ImageMeta,
    iv: &[u8; IV_LEN],
) -> VaultResult<Vec<u8>> {
    let key = derive_key(passphrase);
    let ciphertext = encrypt_cbc(&key, iv, plaintext);
    frame(metadata, iv, &ciphertext)
}

/// Decrypt a container
///
/// Structural problems are `MalformedContainer`; anything the cipher
/// rejects is `InvalidKey`. Nothing is returned on failure.
pub fn decode(data: &[u8], passphrase: &[u8]) -> VaultResult<(Vec<u8>, ImageMeta)> {
    let view = ContainerView::parse(data)?;
    let metadata = view.metadata()?;
    let (iv, ciphertext) = view.iv_and_ciphertext()?;

    let key = derive_key(passphrase);
    let plaintext = decrypt_cbc(&key, &iv, ciphertext)?;

    Ok((plaintext, metadata))
}

/// Read metadata without a passphrase; IV and ciphertext are not examined
pub fn peek_metadata(data: &[u8]) -> VaultResult<ImageMeta> {
    ContainerView::parse(data)?.metadata()
}

/// Decrypt, let `mutate` edit the metadata, and re-encrypt under a fresh IV
///
/// The full decrypt doubles as the passphrase check, so a wrong key fails
/// before the caller has anything to write.
pub fn rewrite_metadata<F>(data: &[u8], passphrase: &[u8], mutate: F) -> VaultResult<Vec<u8>>
where
    F: FnOnce(&mut ImageMeta),
{
    let (plaintext, mut metadata) = decode(data, passphrase)?;
    mutate(&mut metadata);
    encode(&plaintext, passphrase, &metadata)
}


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
