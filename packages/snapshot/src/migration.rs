//! One-shot upgrade of flat-file snapshot directories.
//!
//! Old snapshots kept every replaced file loose in the snapshot directory
//! and listed them in the root record as `file_replacements`
//! (game path -> file name). Migration hashes those files into the blob
//! store, writes a single root file-map version and seeds history from the
//! inline auxiliary payloads.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use common::{BlobStore, ContentHash, GamePath};
use futures::{StreamExt, stream};
use provider_core::AuxKind;
use serde::Deserialize;
use serde_json::Value;
use tokio::fs;
use tracing::{error, info, warn};

use crate::error::{Result, SnapshotError};
use crate::history::HistoryTracker;
use crate::model::{HistoryEntry, ResolvedMap, Snapshot};
use crate::repository::{
    MIGRATION_MARKER, ROOT_FILE, RepositorySettings, SnapshotRepository, read_json,
};

const FAILED_SUFFIX: &str = "_migration_failed";
const MIGRATED_DESCRIPTION: &str = "Migrated";

#[derive(Debug, Deserialize)]
struct LegacySnapshot {
    #[serde(default)]
    actor: String,
    #[serde(default)]
    world: Option<u16>,
    #[serde(default)]
    last_update: Option<DateTime<Utc>>,
    #[serde(default)]
    file_replacements: BTreeMap<String, String>,
    #[serde(default)]
    outfit_data: Option<String>,
    #[serde(default)]
    shape_data: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MigrationOutcome {
    /// Marker present or no root record: nothing to do.
    NotNeeded,
    /// Root record was already content-addressed; only the marker was missing.
    MarkerRestored,
    Migrated { files: usize, skipped: usize },
}

pub struct LegacyMigrator {
    settings: RepositorySettings,
}

impl LegacyMigrator {
    pub fn new(settings: RepositorySettings) -> Self {
        Self { settings }
    }

    /// A directory needs migration when it has a root record but no marker.
    pub async fn needs_migration(dir: &Path) -> Result<bool> {
        Ok(fs::try_exists(dir.join(ROOT_FILE)).await?
            && !fs::try_exists(dir.join(MIGRATION_MARKER)).await?)
    }

    /// Migrate `dir` if it uses the flat layout.
    ///
    /// On failure the whole directory is renamed to `<dir>_migration_failed`
    /// and [`SnapshotError::MigrationFailed`] is returned; the original
    /// record and loose files are left as they were.
    pub async fn migrate(&self, dir: &Path) -> Result<MigrationOutcome> {
        if !Self::needs_migration(dir).await? {
            return Ok(MigrationOutcome::NotNeeded);
        }

        match self.run(dir).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                let moved_to = failed_path(dir).await;
                error!(
                    dir = %dir.display(),
                    moved_to = %moved_to.display(),
                    error = %e,
                    "Snapshot migration failed, moving directory aside"
                );
                fs::rename(dir, &moved_to).await?;
                Err(SnapshotError::MigrationFailed {
                    moved_to,
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn run(&self, dir: &Path) -> Result<MigrationOutcome> {
        let root_path = dir.join(ROOT_FILE);
        let raw: Value = read_json(&root_path)
            .await?
            .ok_or_else(|| SnapshotError::NotFound(root_path.display().to_string()))?;

        if raw.get("file_maps").is_some() {
            fs::write(dir.join(MIGRATION_MARKER), b"").await?;
            return Ok(MigrationOutcome::MarkerRestored);
        }

        let legacy: LegacySnapshot = serde_json::from_value(raw)?;
        let repo = SnapshotRepository::open(dir, self.settings.clone()).await?;

        let results: Vec<Result<Option<(GamePath, ContentHash, PathBuf)>>> =
            stream::iter(&legacy.file_replacements)
                .map(|(game_path, file_name)| ingest(&repo, dir, game_path, file_name))
                .buffer_unordered(self.settings.io_concurrency.max(1))
                .collect()
                .await;

        let mut map = ResolvedMap::new();
        let mut sources = Vec::new();
        let mut skipped = 0;
        for result in results {
            match result? {
                Some((path, hash, source)) => {
                    map.insert(path, hash);
                    sources.push(source);
                }
                None => skipped += 1,
            }
        }

        let now = Utc::now();
        let mut snapshot = Snapshot::new(
            legacy.actor,
            legacy.world,
            legacy.last_update.unwrap_or(now),
        );
        let root = repo.resolver().create_root_if_missing(&mut snapshot, &map, now);

        let mut history = HistoryTracker::new(self.settings.comparison);
        for (kind, payload) in [
            (AuxKind::Outfit, legacy.outfit_data),
            (AuxKind::Shape, legacy.shape_data),
        ] {
            if let Some(payload) = payload {
                history.push(
                    kind,
                    HistoryEntry::new(payload, root, MIGRATED_DESCRIPTION, snapshot.last_update),
                );
                repo.save_history(&history, kind).await?;
            }
        }

        repo.save(&snapshot).await?;

        // Everything below is cleanup; the snapshot is already usable.
        let blob_dir = repo.blobs().base_path().to_path_buf();
        for source in sources.iter().filter(|s| !s.starts_with(&blob_dir)) {
            if let Err(e) = fs::remove_file(source).await {
                warn!(file = %source.display(), error = %e, "Could not remove migrated file");
            }
        }

        info!(dir = %dir.display(), files = map.len(), skipped, "Migrated snapshot");
        Ok(MigrationOutcome::Migrated {
            files: map.len(),
            skipped,
        })
    }
}

/// Hash one loose file into the store. `Ok(None)` when the entry is skipped.
async fn ingest(
    repo: &SnapshotRepository,
    dir: &Path,
    game_path: &str,
    file_name: &str,
) -> Result<Option<(GamePath, ContentHash, PathBuf)>> {
    let relative = Path::new(file_name);
    if !relative
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
    {
        warn!(game_path, file_name, "Legacy entry escapes the snapshot directory, skipping");
        return Ok(None);
    }

    let source = dir.join(relative);
    let bytes = match fs::read(&source).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(game_path, file = %source.display(), "Legacy file missing, skipping");
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };

    let path = GamePath::new(game_path);
    let hash = repo.blobs().put(&bytes, &path).await?;
    Ok(Some((path, hash, source)))
}

async fn failed_path(dir: &Path) -> PathBuf {
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let candidate = dir.with_file_name(format!("{name}{FAILED_SUFFIX}"));
    if fs::try_exists(&candidate).await.unwrap_or(false) {
        dir.with_file_name(format!(
            "{name}{FAILED_SUFFIX}_{}",
            Utc::now().timestamp()
        ))
    } else {
        candidate
    }
}
