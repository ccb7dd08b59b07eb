pub mod apply;
pub mod config;
pub mod error;
pub mod filemap;
pub mod history;
pub mod library;
pub mod migration;
pub mod model;
pub mod registry;
pub mod repository;
pub mod session;

pub use apply::{ApplyRequest, AuxChoice, PreparedApplication};
pub use config::AppConfig;
pub use error::{Result, SnapshotError};
pub use filemap::FileMapResolver;
pub use history::{HistoryTracker, PayloadComparison};
pub use library::{SnapshotLibrary, SnapshotSummary};
pub use migration::{LegacyMigrator, MigrationOutcome};
pub use model::{FileChanges, FileMapId, FileMapVersion, HistoryEntry, ResolvedMap, Snapshot};
pub use registry::{ActiveApplication, ActiveSnapshotRegistry};
pub use repository::{
    MissingBlob, RepositorySettings, SnapshotRepository, UpdateOptions, UpdateOutcome,
};
pub use session::Session;
