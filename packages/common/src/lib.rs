pub mod config;
pub mod game_path;
pub mod storage;

pub use config::StoreConfig;
pub use game_path::GamePath;
pub use storage::{BlobStore, ContentHash, StorageError};
