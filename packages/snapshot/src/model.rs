use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use common::{ContentHash, GamePath};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Flat game path -> content hash mapping. Derived, never persisted on its own.
pub type ResolvedMap = BTreeMap<GamePath, ContentHash>;

/// Changes carried by a file-map version. `None` marks a removed path.
pub type FileChanges = BTreeMap<GamePath, Option<ContentHash>>;

/// Opaque identifier of a file-map version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileMapId(Uuid);

impl FileMapId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for FileMapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for FileMapId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// One link of a file-map delta chain. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMapVersion {
    pub id: FileMapId,
    /// Previous version this one is a delta against; `None` for a root
    /// version, whose `changes` hold the full mapping.
    pub base_id: Option<FileMapId>,
    pub changes: FileChanges,
    pub created_at: DateTime<Utc>,
}

impl FileMapVersion {
    pub fn is_root(&self) -> bool {
        self.base_id.is_none()
    }
}

/// Root record of a snapshot directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Label of the actor the snapshot was first captured from.
    pub actor: String,
    #[serde(default)]
    pub world: Option<u16>,
    pub last_update: DateTime<Utc>,
    #[serde(default)]
    pub current_file_map: Option<FileMapId>,
    #[serde(default)]
    pub file_maps: Vec<FileMapVersion>,
    /// Flat mapping from before file maps were versioned. Only consulted
    /// when no version pointer resolves.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub files: ResolvedMap,
}

impl Snapshot {
    pub fn new(actor: impl Into<String>, world: Option<u16>, now: DateTime<Utc>) -> Self {
        Self {
            actor: actor.into(),
            world,
            last_update: now,
            current_file_map: None,
            file_maps: Vec::new(),
            files: ResolvedMap::new(),
        }
    }

    pub fn version(&self, id: &FileMapId) -> Option<&FileMapVersion> {
        self.file_maps.iter().find(|v| &v.id == id)
    }
}

/// A recorded auxiliary-state capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub description: String,
    /// Opaque auxiliary payload as produced by the capture provider.
    pub payload: String,
    /// File-map version that was current when the entry was recorded.
    pub file_map_id: Option<FileMapId>,
}

impl HistoryEntry {
    pub fn new(
        payload: impl Into<String>,
        file_map_id: Option<FileMapId>,
        description: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp,
            description: description.into(),
            payload: payload.into(),
            file_map_id,
        }
    }
}
