//! # Image Vault
//!
//! Local encrypted image storage. Each image is one self-describing file:
//!
//! ```text
//! ┌────────────────┬──────────────────────┬──────────┬──────────────────────────┐
//! │ metaLen u32 BE │ metadata (JSON)      │ IV (16B) │ AES-256-CBC + PKCS#7     │
//! └────────────────┴──────────────────────┴──────────┴──────────────────────────┘
//! ```
//!
//! Metadata is readable without the passphrase; the image bytes are not.
//!
//! ## Layers
//!
//! - [`container`]: the codec (encode, decode, peek, rewrite)
//! - [`storage`]: albums, listing, per-id locked mutations
//! - [`server`]: REST API and static frontend
//! - [`batch`] / [`migrate`]: bulk import, export and legacy upgrade
//!
//! ## Security Model
//!
//! - Key = SHA-256(passphrase), unsalted, for compatibility with existing files
//! - Fresh random IV on every write, including metadata rewrites
//! - Wrong key and corrupted ciphertext both surface as [`VaultError::InvalidKey`]
//! - Writes go through a temp file and rename
//! - Keys are zeroized on drop

pub mod batch;
pub mod config;
pub mod container;
pub mod crypto;
pub mod error;
pub mod media;
pub mod metadata;
pub mod migrate;
pub mod secure_fs;
pub mod server;
pub mod storage;

pub use container::{decode, encode, peek_metadata, rewrite_metadata};
pub use error::{VaultError, VaultResult};
pub use metadata::ImageMeta;
pub use storage::ImageStore;

/// Image Vault version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
