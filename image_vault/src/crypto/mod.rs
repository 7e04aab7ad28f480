//! Image Vault - Cryptographic Core
//!
//! Passphrase-derived AES-256-CBC, as stored in every `.enc` container.

pub mod keys;
pub mod aes_cbc;

pub use keys::*;
pub use aes_cbc::*;
