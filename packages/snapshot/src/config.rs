use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

pub use common::config::StoreConfig;

use crate::filemap::DEFAULT_MAX_CHAIN_DEPTH;
use crate::history::PayloadComparison;
use crate::repository::RepositorySettings;

#[derive(Debug, Deserialize, Clone)]
pub struct FileMapConfig {
    /// Longest delta chain resolved before reporting corruption. Default: 64.
    #[serde(default = "default_max_chain_depth")]
    pub max_chain_depth: usize,
}

fn default_max_chain_depth() -> usize {
    DEFAULT_MAX_CHAIN_DEPTH
}

impl Default for FileMapConfig {
    fn default() -> Self {
        Self {
            max_chain_depth: default_max_chain_depth(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct HistoryConfig {
    /// Numeric tolerance when comparing JSON payloads. Unset means exact
    /// equality.
    #[serde(default)]
    pub payload_tolerance: Option<f64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RegistryConfig {
    /// Keep the local actor's applied snapshot when reverting automatically.
    /// Default: true.
    #[serde(default = "default_persist_local")]
    pub persist_local_on_auto_revert: bool,
}

fn default_persist_local() -> bool {
    true
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            persist_local_on_auto_revert: default_persist_local(),
        }
    }
}

/// Application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub storage: StoreConfig,
    #[serde(default)]
    pub filemap: FileMapConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("WARDROBE_CONFIG").unwrap_or_else(|_| "config/config".to_string());
        Self::load_from(&config_path)
    }

    pub fn load_from(config_path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .set_default("storage.root", "./snapshots")?
            .set_default("storage.max_blob_size", 256_i64 * 1024 * 1024)?
            .set_default("storage.io_concurrency", 8_i64)?
            .set_default("filemap.max_chain_depth", DEFAULT_MAX_CHAIN_DEPTH as i64)?
            .set_default("registry.persist_local_on_auto_revert", true)?
            .add_source(File::with_name(config_path).required(false))
            // e.g. WARDROBE__STORAGE__ROOT=/data/snapshots
            .add_source(Environment::with_prefix("WARDROBE").separator("__"))
            .build()?;

        s.try_deserialize()
    }

    pub fn repository_settings(&self) -> RepositorySettings {
        RepositorySettings {
            max_blob_size: self.storage.max_blob_size,
            io_concurrency: self.storage.io_concurrency,
            max_chain_depth: self.filemap.max_chain_depth,
            comparison: PayloadComparison::from_tolerance(self.history.payload_tolerance),
        }
    }
}
