use std::sync::Arc;

use crate::storage::ImageStore;

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// Container store; per-id locking lives inside
    pub store: Arc<ImageStore>,
    /// Minimum passphrase length accepted on upload
    pub min_passphrase_len: usize,
}

impl AppState {
    pub fn new(store: ImageStore, min_passphrase_len: usize) -> Self {
        Self {
            store: Arc::new(store),
            min_passphrase_len,
        }
    }
}
