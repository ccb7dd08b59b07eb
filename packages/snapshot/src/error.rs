use std::path::PathBuf;

use common::StorageError;
use provider_core::{AuxKind, ProviderError};
use thiserror::Error;
use uuid::Uuid;

use crate::model::FileMapId;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Could not load {path}: {reason}")]
    Load { path: PathBuf, reason: String },

    #[error("Snapshot not found: {0}")]
    NotFound(String),

    #[error("No {kind} history entry with id {id}")]
    EntryNotFound { kind: AuxKind, id: Uuid },

    #[error("File map chain starting at {id} exceeds {limit} levels (possible cycle)")]
    ChainTooDeep { id: FileMapId, limit: usize },

    #[error("File map {id} points at missing base version {missing}")]
    BrokenChain { id: FileMapId, missing: FileMapId },

    #[error("No provider offers the {0} capability")]
    CapabilityMissing(&'static str),

    #[error("Migration failed ({reason}); directory moved to {moved_to}")]
    MigrationFailed { moved_to: PathBuf, reason: String },

    #[error("Invalid snapshot name: {0}")]
    InvalidName(String),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SnapshotError>;
