//! Image Vault - Error Types

use thiserror::Error;

/// Result type for vault operations
pub type VaultResult<T> = Result<T, VaultError>;

/// Vault error types
#[derive(Error, Debug)]
pub enum VaultError {
    // ═══════════════════════════════════════════════════════════════
    // CONTAINER ERRORS
    // ═══════════════════════════════════════════════════════════════

    /// Structural defect in a container: truncated prefix, metadata length
    /// past the end, bad JSON, truncated IV. Never retried.
    #[error("Malformed container: {0}")]
    MalformedContainer(String),

    /// Wrong passphrase or corrupt ciphertext. The two are deliberately
    /// indistinguishable.
    #[error("Invalid decryption key")]
    InvalidKey,

    // ═══════════════════════════════════════════════════════════════
    // STORAGE ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ═══════════════════════════════════════════════════════════════
    // SERIALIZATION ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl VaultError {
    /// Check if this error should be reported as an authorization failure
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, VaultError::InvalidKey)
    }

    /// Check if the caller, not the vault, is at fault
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            VaultError::InvalidKey | VaultError::NotFound(_) | VaultError::InvalidInput(_)
        )
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(e: serde_json::Error) -> Self {
        VaultError::Serialization(e.to_string())
    }
}

impl From<walkdir::Error> for VaultError {
    fn from(e: walkdir::Error) -> Self {
        match e.into_io_error() {
            Some(io) => VaultError::Io(io),
            None => VaultError::InvalidInput("filesystem loop detected".into()),
        }
    }
}
