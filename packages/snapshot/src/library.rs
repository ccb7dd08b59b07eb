//! A directory of snapshot directories.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::fs;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::error::{Result, SnapshotError};
use crate::migration::{LegacyMigrator, MigrationOutcome};
use crate::model::FileMapId;
use crate::repository::{RepositorySettings, SnapshotRepository};

const FAILED_MARKER: &str = "_migration_failed";

/// Listing information for one snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotSummary {
    pub name: String,
    pub actor: String,
    pub world: Option<u16>,
    pub last_update: DateTime<Utc>,
    pub versions: usize,
    pub current_file_map: Option<FileMapId>,
}

pub struct SnapshotLibrary {
    root: PathBuf,
    settings: RepositorySettings,
    migrator: LegacyMigrator,
}

impl SnapshotLibrary {
    pub fn new(root: impl Into<PathBuf>, settings: RepositorySettings) -> Self {
        Self {
            root: root.into(),
            migrator: LegacyMigrator::new(settings.clone()),
            settings,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(&config.storage.root, config.repository_settings())
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    /// Summaries of every readable snapshot, sorted by name. Legacy
    /// directories are migrated on the way; ones that fail are skipped.
    pub async fn list(&self) -> Result<Vec<SnapshotSummary>> {
        let mut summaries = Vec::new();
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(summaries),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.contains(FAILED_MARKER) {
                continue;
            }

            if let Err(e) = self.migrator.migrate(&entry.path()).await {
                warn!(snapshot = %name, error = %e, "Skipping snapshot");
                continue;
            }

            let repo = SnapshotRepository::open(entry.path(), self.settings.clone()).await?;
            match repo.load().await {
                Ok(Some(snapshot)) => summaries.push(SnapshotSummary {
                    name,
                    actor: snapshot.actor,
                    world: snapshot.world,
                    last_update: snapshot.last_update,
                    versions: snapshot.file_maps.len(),
                    current_file_map: snapshot.current_file_map,
                }),
                Ok(None) => {}
                Err(e) => warn!(snapshot = %name, error = %e, "Skipping unreadable snapshot"),
            }
        }

        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(summaries)
    }

    /// Open an existing snapshot, migrating it first if needed.
    pub async fn open(&self, name: &str) -> Result<SnapshotRepository> {
        let dir = self.root.join(validate_name(name)?);
        if !fs::try_exists(&dir).await? {
            return Err(SnapshotError::NotFound(name.to_string()));
        }
        if let MigrationOutcome::Migrated { files, .. } = self.migrator.migrate(&dir).await? {
            info!(snapshot = name, files, "Snapshot upgraded on open");
        }
        SnapshotRepository::open(dir, self.settings.clone()).await
    }

    /// Open a snapshot for a capture, creating its directory when new.
    pub async fn open_or_create(&self, name: &str) -> Result<SnapshotRepository> {
        let dir = self.root.join(validate_name(name)?);
        if fs::try_exists(&dir).await? {
            return self.open(name).await;
        }
        fs::create_dir_all(&dir).await?;
        SnapshotRepository::open(dir, self.settings.clone()).await
    }
}

/// Snapshot names become directory names: one flat, visible path segment.
pub fn validate_name(name: &str) -> Result<&str> {
    let trimmed = name.trim();
    let reason = if trimmed.is_empty() {
        Some("name cannot be empty")
    } else if trimmed.chars().any(|c| c.is_control()) {
        Some("control characters are not allowed")
    } else if trimmed.contains('/') || trimmed.contains('\\') {
        Some("path separators are not allowed")
    } else if trimmed.starts_with('.') {
        Some("names cannot start with '.'")
    } else if trimmed.contains(FAILED_MARKER) {
        Some("name is reserved for failed migrations")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(SnapshotError::InvalidName(format!("{name:?}: {reason}"))),
        None => Ok(trimmed),
    }
}
