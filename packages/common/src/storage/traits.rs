use std::path::PathBuf;

use async_trait::async_trait;

use super::error::StorageError;
use super::hash::ContentHash;
use crate::game_path::GamePath;

/// Content-addressed blob storage.
///
/// Blobs are keyed by the hash of their bytes. The game path supplied when a
/// blob is written only influences the file extension it is stored under.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store bytes and return their content hash.
    ///
    /// A no-op when a blob for the same hash already exists, whatever its
    /// extension.
    async fn put(&self, data: &[u8], hint: &GamePath) -> Result<ContentHash, StorageError>;

    /// Store bytes that the caller claims hash to `expected`.
    async fn put_verified(
        &self,
        expected: &ContentHash,
        data: &[u8],
        hint: &GamePath,
    ) -> Result<(), StorageError> {
        let actual = ContentHash::compute(data);
        if &actual != expected {
            return Err(StorageError::HashMismatch {
                expected: expected.clone(),
                actual,
            });
        }
        self.put(data, hint).await.map(|_| ())
    }

    /// Locate the file holding `hash`.
    ///
    /// Prefers the extension implied by `hint`; falls back to any stored file
    /// for the hash. `None` means no blob exists for it at all.
    async fn resolve_path(
        &self,
        hash: &ContentHash,
        hint: Option<&GamePath>,
    ) -> Result<Option<PathBuf>, StorageError>;

    /// Retrieve all bytes for a blob by its content hash.
    async fn get(&self, hash: &ContentHash) -> Result<Vec<u8>, StorageError> {
        match self.resolve_path(hash, None).await? {
            Some(path) => Ok(tokio::fs::read(path).await?),
            None => Err(StorageError::NotFound(hash.clone())),
        }
    }

    /// Check whether a blob exists under any extension.
    async fn exists(&self, hash: &ContentHash) -> Result<bool, StorageError> {
        Ok(self.resolve_path(hash, None).await?.is_some())
    }

    /// Delete every stored file for a hash.
    ///
    /// Returns `true` if anything was deleted, `false` if nothing existed.
    async fn delete(&self, hash: &ContentHash) -> Result<bool, StorageError>;
}
