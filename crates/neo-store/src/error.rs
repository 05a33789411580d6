//! Store error types.

use thiserror::Error;

/// Errors surfaced by the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend rejected or failed an operation
    #[error("Backend error: {0}")]
    Backend(String),

    /// A stored value failed to decode
    #[error("Corrupted value under key {key}: {reason}")]
    Corrupted {
        /// Hex rendering of the key
        key: String,
        /// What failed to decode
        reason: String,
    },

    /// A trie node referenced by hash is missing from the store
    #[error("Missing trie node {0}")]
    MissingTrieNode(String),
}
