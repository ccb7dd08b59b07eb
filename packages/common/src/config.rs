use serde::Deserialize;

/// Blob storage configuration shared by every snapshot directory.
#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Directory holding one sub-directory per snapshot. Default: "./snapshots".
    #[serde(default = "default_root")]
    pub root: String,
    /// Largest blob accepted by the store, in bytes. Default: 256 MiB.
    #[serde(default = "default_max_blob_size")]
    pub max_blob_size: u64,
    /// Number of source reads / hashes allowed in flight at once. Default: 8.
    #[serde(default = "default_io_concurrency")]
    pub io_concurrency: usize,
}

fn default_root() -> String {
    "./snapshots".into()
}
fn default_max_blob_size() -> u64 {
    256 * 1024 * 1024
}
fn default_io_concurrency() -> usize {
    8
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            max_blob_size: default_max_blob_size(),
            io_concurrency: default_io_concurrency(),
        }
    }
}
