use thiserror::Error;

use super::hash::ContentHash;

#[derive(Debug, Error)]
pub enum StorageError {
    /// No file holds the hash, under any extension.
    #[error("No blob stored for {0}")]
    NotFound(ContentHash),

    #[error("Invalid content hash: {0}")]
    InvalidHash(String),

    #[error("Blob of {actual} bytes exceeds the {limit} byte limit")]
    SizeLimitExceeded { actual: u64, limit: u64 },

    /// The bytes do not hash to the digest the caller claimed for them.
    #[error("Content hashes to {actual}, expected {expected}")]
    HashMismatch {
        expected: ContentHash,
        actual: ContentHash,
    },

    #[error("Storage IO error: {0}")]
    Io(#[from] std::io::Error),
}
