use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use super::error::StorageError;
use super::hash::ContentHash;
use super::traits::BlobStore;
use crate::game_path::{FALLBACK_EXTENSION, GamePath};

/// Filesystem-backed content-addressed blob store.
///
/// Blobs live flat in one directory as `{hash}.{ext}`, where `ext` comes from
/// the game path that first produced the content. Identical bytes reached
/// through paths with different extensions are stored once; lookups accept
/// any extension.
pub struct FilesystemBlobStore {
    base_path: PathBuf,
    max_size: u64,
}

impl FilesystemBlobStore {
    /// Create a new filesystem blob store.
    pub async fn new(base_path: PathBuf, max_size: u64) -> Result<Self, StorageError> {
        fs::create_dir_all(&base_path).await?;
        fs::create_dir_all(base_path.join(".tmp")).await?;
        Ok(Self {
            base_path,
            max_size,
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Preferred filesystem path for a hash stored under `ext`.
    fn blob_path(&self, hash: &ContentHash, ext: &str) -> PathBuf {
        self.base_path.join(format!("{hash}.{ext}"))
    }

    /// Path for a temporary file during writes.
    fn temp_path(&self) -> PathBuf {
        self.base_path
            .join(".tmp")
            .join(uuid::Uuid::new_v4().to_string())
    }

    /// Every stored file whose stem equals `hash`, in directory order.
    async fn find_any(&self, hash: &ContentHash) -> Result<Vec<PathBuf>, StorageError> {
        let mut found = Vec::new();
        let mut entries = match fs::read_dir(&self.base_path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(found),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            let stem = name.split_once('.').map_or(name, |(stem, _)| stem);
            if stem.eq_ignore_ascii_case(hash.as_str()) {
                found.push(entry.path());
            }
        }

        Ok(found)
    }
}

#[async_trait]
impl BlobStore for FilesystemBlobStore {
    async fn put(&self, data: &[u8], hint: &GamePath) -> Result<ContentHash, StorageError> {
        if data.len() as u64 > self.max_size {
            return Err(StorageError::SizeLimitExceeded {
                actual: data.len() as u64,
                limit: self.max_size,
            });
        }

        let hash = ContentHash::compute(data);
        let blob_path = self.blob_path(&hash, &hint.blob_extension());

        if fs::try_exists(&blob_path).await? || !self.find_any(&hash).await?.is_empty() {
            debug!(hash = %hash, "Blob already stored");
            return Ok(hash);
        }

        let temp_path = self.temp_path();
        if let Err(e) = fs::write(&temp_path, data).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        if let Err(e) = fs::rename(&temp_path, &blob_path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        Ok(hash)
    }

    async fn resolve_path(
        &self,
        hash: &ContentHash,
        hint: Option<&GamePath>,
    ) -> Result<Option<PathBuf>, StorageError> {
        let ext = hint.map_or_else(|| FALLBACK_EXTENSION.to_string(), GamePath::blob_extension);
        let preferred = self.blob_path(hash, &ext);
        if fs::try_exists(&preferred).await? {
            return Ok(Some(preferred));
        }

        let mut candidates = self.find_any(hash).await?;
        candidates.sort();
        Ok(candidates.into_iter().next())
    }

    async fn delete(&self, hash: &ContentHash) -> Result<bool, StorageError> {
        let mut deleted = false;
        for path in self.find_any(hash).await? {
            match fs::remove_file(&path).await {
                Ok(()) => deleted = true,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(deleted)
    }
}
