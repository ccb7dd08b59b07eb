//! Per-directory snapshot persistence and the capture/update flow.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use common::{BlobStore, ContentHash, GamePath, StorageError, storage::FilesystemBlobStore};
use futures::{StreamExt, stream};
use provider_core::{AuxKind, CaptureProvider, CapturedState};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Result, SnapshotError};
use crate::filemap::{FileMapResolver, diff};
use crate::history::{HistoryTracker, PayloadComparison};
use crate::model::{FileChanges, FileMapId, HistoryEntry, ResolvedMap, Snapshot};

pub const ROOT_FILE: &str = "snapshot.json";
pub const BLOB_DIR: &str = "files";
pub const MIGRATION_MARKER: &str = ".cas_migrated";

const DEFAULT_DESCRIPTION: &str = "Captured";

pub fn history_file(kind: AuxKind) -> String {
    format!("{kind}_history.json")
}

/// Tunables shared by every repository opened from the same configuration.
#[derive(Debug, Clone)]
pub struct RepositorySettings {
    pub max_blob_size: u64,
    pub io_concurrency: usize,
    pub max_chain_depth: usize,
    pub comparison: PayloadComparison,
}

impl Default for RepositorySettings {
    fn default() -> Self {
        let store = common::StoreConfig::default();
        Self {
            max_blob_size: store.max_blob_size,
            io_concurrency: store.io_concurrency,
            max_chain_depth: crate::filemap::DEFAULT_MAX_CHAIN_DEPTH,
            comparison: PayloadComparison::Exact,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct UpdateOptions {
    /// Treat paths missing from the capture as removed. Only sound for
    /// sources that report the complete file set.
    pub include_removals: bool,
    /// Description stored on any history entry the update appends.
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOutcome {
    /// Current file-map version after the update.
    pub file_map_id: Option<FileMapId>,
    /// Whether the update appended a new file-map version.
    pub new_version: bool,
    /// Kinds that received a new history entry.
    pub appended: Vec<AuxKind>,
    /// Game paths left out because their source bytes were unusable.
    pub skipped: Vec<GamePath>,
}

/// A game path whose blob is absent from the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissingBlob {
    /// Version introducing the reference; `None` for the legacy mapping.
    pub file_map_id: Option<FileMapId>,
    pub path: GamePath,
    pub hash: ContentHash,
}

/// Owner of one snapshot directory.
///
/// Mutating calls are expected to be issued sequentially; nothing here
/// guards against two writers on the same directory.
pub struct SnapshotRepository {
    dir: PathBuf,
    blobs: FilesystemBlobStore,
    resolver: FileMapResolver,
    settings: RepositorySettings,
}

impl SnapshotRepository {
    pub async fn open(dir: impl Into<PathBuf>, settings: RepositorySettings) -> Result<Self> {
        let dir = dir.into();
        let blobs = FilesystemBlobStore::new(dir.join(BLOB_DIR), settings.max_blob_size).await?;
        Ok(Self {
            dir,
            blobs,
            resolver: FileMapResolver::new(settings.max_chain_depth),
            settings,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn blobs(&self) -> &FilesystemBlobStore {
        &self.blobs
    }

    pub fn resolver(&self) -> &FileMapResolver {
        &self.resolver
    }

    /// Read the root record. `Ok(None)` when the snapshot has never been saved.
    pub async fn load(&self) -> Result<Option<Snapshot>> {
        read_json(&self.dir.join(ROOT_FILE)).await
    }

    /// Read the root record for an edit flow, where absence is an error.
    pub async fn load_required(&self) -> Result<Snapshot> {
        self.load()
            .await?
            .ok_or_else(|| SnapshotError::NotFound(self.dir.display().to_string()))
    }

    pub async fn load_history(&self) -> Result<HistoryTracker> {
        let mut history = HistoryTracker::new(self.settings.comparison);
        for kind in AuxKind::ALL {
            let entries: Vec<HistoryEntry> = read_json(&self.dir.join(history_file(kind)))
                .await?
                .unwrap_or_default();
            history.load_kind(kind, entries);
        }
        Ok(history)
    }

    /// Persist the root record and mark the directory as content-addressed.
    pub async fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let marker = self.dir.join(MIGRATION_MARKER);
        if !fs::try_exists(&marker).await? {
            fs::write(&marker, b"").await?;
        }
        write_json(&self.dir.join(ROOT_FILE), snapshot).await
    }

    pub async fn save_history(&self, history: &HistoryTracker, kind: AuxKind) -> Result<()> {
        write_json(&self.dir.join(history_file(kind)), history.entries(kind)).await
    }

    /// Fold a fresh capture into the snapshot.
    ///
    /// New blobs are written before the root record is touched, so the
    /// persisted pointer never names a version whose content is missing.
    /// Calling this twice with the same state is a no-op the second time.
    pub async fn update(
        &self,
        state: &CapturedState,
        source: &dyn CaptureProvider,
        options: &UpdateOptions,
    ) -> Result<UpdateOutcome> {
        let now = Utc::now();
        let (mut snapshot, fresh) = match self.load().await {
            Ok(Some(snapshot)) => (snapshot, false),
            Ok(None) => (Snapshot::new(&state.actor, state.world, now), true),
            Err(e) => {
                warn!(dir = %self.dir.display(), error = %e, "Root record unreadable, starting a new one");
                self.set_aside_unreadable().await?;
                (Snapshot::new(&state.actor, state.world, now), true)
            }
        };
        let mut history = self.load_history().await?;

        let current = self
            .resolver
            .resolve(&snapshot, snapshot.current_file_map.as_ref())?;
        let mut changes = diff(&current, &state.files, options.include_removals);

        let skipped = self.store_blobs(&changes, source).await?;
        for path in &skipped {
            changes.remove(path);
        }

        let before = snapshot.current_file_map;
        if !changes.is_empty() {
            self.resolver
                .advance(&mut snapshot, &current, changes, now)?;
        }
        let new_version = snapshot.current_file_map != before;

        let description = options.description.as_deref().unwrap_or(DEFAULT_DESCRIPTION);
        let mut appended = Vec::new();
        for (kind, payload) in &state.aux {
            if history
                .append(*kind, payload, snapshot.current_file_map, description, now)
                .is_some()
            {
                appended.push(*kind);
            }
        }

        if !(fresh || new_version || !appended.is_empty()) {
            debug!(dir = %self.dir.display(), "Capture unchanged");
            return Ok(UpdateOutcome {
                file_map_id: snapshot.current_file_map,
                new_version: false,
                appended,
                skipped,
            });
        }

        snapshot.last_update = now;
        self.save(&snapshot).await?;
        for kind in &appended {
            self.save_history(&history, *kind).await?;
        }

        if new_version {
            info!(
                dir = %self.dir.display(),
                file_map = ?snapshot.current_file_map,
                versions = snapshot.file_maps.len(),
                "Created file map version"
            );
        }

        Ok(UpdateOutcome {
            file_map_id: snapshot.current_file_map,
            new_version,
            appended,
            skipped,
        })
    }

    /// Write blobs for every hash in `changes` the store does not hold yet.
    /// Returns the paths whose source could not be stored.
    async fn store_blobs(
        &self,
        changes: &FileChanges,
        source: &dyn CaptureProvider,
    ) -> Result<Vec<GamePath>> {
        let mut by_hash: BTreeMap<&ContentHash, Vec<&GamePath>> = BTreeMap::new();
        for (path, hash) in changes {
            if let Some(hash) = hash {
                by_hash.entry(hash).or_default().push(path);
            }
        }

        let results: Vec<Result<Vec<GamePath>>> = stream::iter(by_hash)
            .map(|(hash, paths)| self.store_blob(hash, paths, source))
            .buffer_unordered(self.settings.io_concurrency.max(1))
            .collect()
            .await;

        let mut skipped = Vec::new();
        for result in results {
            skipped.extend(result?);
        }
        skipped.sort();
        Ok(skipped)
    }

    async fn store_blob(
        &self,
        hash: &ContentHash,
        paths: Vec<&GamePath>,
        source: &dyn CaptureProvider,
    ) -> Result<Vec<GamePath>> {
        if self.blobs.exists(hash).await? {
            return Ok(Vec::new());
        }

        let hint = paths[0];
        let skip_all = || -> Vec<GamePath> { paths.iter().map(|p| (*p).clone()).collect() };
        let bytes = match source.read_source(hash, hint).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(path = %hint, hash = %hash, error = %e, "Source unreadable, skipping");
                return Ok(skip_all());
            }
        };

        match self.blobs.put_verified(hash, &bytes, hint).await {
            Ok(()) => Ok(Vec::new()),
            Err(e @ (StorageError::HashMismatch { .. } | StorageError::SizeLimitExceeded { .. })) => {
                warn!(path = %hint, hash = %hash, error = %e, "Source rejected, skipping");
                Ok(skip_all())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn set_aside_unreadable(&self) -> Result<()> {
        let root = self.dir.join(ROOT_FILE);
        if fs::try_exists(&root).await? {
            fs::rename(&root, self.dir.join(format!("{ROOT_FILE}.unreadable"))).await?;
        }
        Ok(())
    }

    /// Flatten a version; `None` means the current one.
    pub async fn resolve(&self, version: Option<FileMapId>) -> Result<ResolvedMap> {
        let snapshot = self.load_required().await?;
        let id = version.or(snapshot.current_file_map);
        self.resolver.resolve(&snapshot, id.as_ref())
    }

    pub async fn history(&self, kind: AuxKind) -> Result<Vec<HistoryEntry>> {
        Ok(self.load_history().await?.entries(kind).to_vec())
    }

    /// Record an auxiliary payload against the current file-map version.
    pub async fn append_history(
        &self,
        kind: AuxKind,
        payload: &str,
        description: &str,
    ) -> Result<Option<HistoryEntry>> {
        let snapshot = self.load_required().await?;
        let mut history = self.load_history().await?;
        let appended = history
            .append(kind, payload, snapshot.current_file_map, description, Utc::now())
            .cloned();
        if appended.is_some() {
            self.save_history(&history, kind).await?;
        }
        Ok(appended)
    }

    pub async fn delete_history(&self, kind: AuxKind, id: Uuid) -> Result<HistoryEntry> {
        let mut history = self.load_history().await?;
        let removed = history.delete(kind, id)?;
        self.save_history(&history, kind).await?;
        Ok(removed)
    }

    pub async fn rename_history(&self, kind: AuxKind, id: Uuid, description: &str) -> Result<()> {
        let mut history = self.load_history().await?;
        history.rename(kind, id, description)?;
        self.save_history(&history, kind).await
    }

    /// The file set that was in effect when a history entry was recorded.
    pub async fn resolve_for_entry(&self, kind: AuxKind, id: Uuid) -> Result<ResolvedMap> {
        let snapshot = self.load_required().await?;
        let history = self.load_history().await?;
        let entry = history.get(kind, id)?;
        self.resolver.resolve(&snapshot, entry.file_map_id.as_ref())
    }

    /// Every reference, across all versions and the legacy mapping, whose
    /// blob is missing from the store.
    pub async fn audit(&self) -> Result<Vec<MissingBlob>> {
        let snapshot = self.load_required().await?;
        let mut missing = Vec::new();

        let legacy = snapshot.files.iter().map(|(p, h)| (None, p, h));
        let versioned = snapshot.file_maps.iter().flat_map(|v| {
            v.changes
                .iter()
                .filter_map(move |(p, h)| h.as_ref().map(|h| (Some(v.id), p, h)))
        });

        for (file_map_id, path, hash) in legacy.chain(versioned) {
            if !self.blobs.exists(hash).await? {
                missing.push(MissingBlob {
                    file_map_id,
                    path: path.clone(),
                    hash: hash.clone(),
                });
            }
        }
        Ok(missing)
    }
}

/// Read and parse a JSON file. A missing file is `Ok(None)`; anything
/// unreadable or malformed is [`SnapshotError::Load`].
pub(crate) async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(SnapshotError::Load {
                path: path.to_path_buf(),
                reason: e.to_string(),
            });
        }
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| SnapshotError::Load {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

/// Serialize to a sibling temp file, then rename over `path`.
pub(crate) async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let data = serde_json::to_vec_pretty(value)?;
    let mut temp = path.as_os_str().to_owned();
    temp.push(".tmp");
    let temp = PathBuf::from(temp);

    if let Err(e) = fs::write(&temp, &data).await {
        let _ = fs::remove_file(&temp).await;
        return Err(e.into());
    }
    if let Err(e) = fs::rename(&temp, path).await {
        let _ = fs::remove_file(&temp).await;
        return Err(e.into());
    }
    Ok(())
}
