//! Providers backed by plain directories.
//!
//! A folder of loose files stands in for a live actor: every file is a game
//! path relative to the folder root. Exporting writes a resolved snapshot
//! back out in the same shape.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use common::{ContentHash, GamePath};
use futures::{StreamExt, stream};
use provider_core::{
    ActorIdentity, ApplyProvider, AuxKind, AuxPayloads, CaptureProvider, CapturedState,
    ProfileId, Provider, ProviderError,
};
use tokio::fs;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Capture source reading a directory tree.
pub struct FolderSource {
    root: PathBuf,
    world: Option<u16>,
    aux: AuxPayloads,
    io_concurrency: usize,
}

impl FolderSource {
    pub fn new(root: impl Into<PathBuf>, io_concurrency: usize) -> Self {
        Self {
            root: root.into(),
            world: None,
            aux: AuxPayloads::new(),
            io_concurrency: io_concurrency.max(1),
        }
    }

    pub fn with_world(mut self, world: Option<u16>) -> Self {
        self.world = world;
        self
    }

    pub fn with_aux(mut self, kind: AuxKind, payload: String) -> Self {
        self.aux.insert(kind, payload);
        self
    }

    fn files(&self) -> Result<Vec<(GamePath, PathBuf)>, ProviderError> {
        let mut files = Vec::new();
        for entry in WalkDir::new(&self.root).follow_links(false) {
            let entry = entry.map_err(|e| {
                ProviderError::SourceUnreadable(self.root.display().to_string(), e.to_string())
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            match relative.to_str() {
                Some(relative) => files.push((GamePath::new(relative), entry.path().to_path_buf())),
                None => warn!(file = %entry.path().display(), "Skipping non UTF-8 path"),
            }
        }
        Ok(files)
    }
}

impl Provider for FolderSource {
    fn id(&self) -> &str {
        "folder-source"
    }

    fn as_capture(&self) -> Option<&dyn CaptureProvider> {
        Some(self)
    }
}

#[async_trait]
impl CaptureProvider for FolderSource {
    async fn capture(&self, actor: &ActorIdentity) -> Result<CapturedState, ProviderError> {
        if !fs::try_exists(&self.root).await? {
            return Err(ProviderError::Unavailable(format!(
                "source folder {} does not exist",
                self.root.display()
            )));
        }

        let hashed: Vec<Result<(GamePath, ContentHash), ProviderError>> =
            stream::iter(self.files()?)
                .map(|(game_path, file)| async move {
                    let bytes = fs::read(&file).await?;
                    Ok::<_, ProviderError>((game_path, ContentHash::compute(&bytes)))
                })
                .buffer_unordered(self.io_concurrency)
                .collect()
                .await;

        let files = hashed.into_iter().collect::<Result<BTreeMap<_, _>, _>>()?;
        debug!(root = %self.root.display(), files = files.len(), "Captured folder");

        Ok(CapturedState {
            actor: actor.name.clone(),
            world: self.world,
            files,
            aux: self.aux.clone(),
        })
    }

    async fn read_source(
        &self,
        _hash: &ContentHash,
        path: &GamePath,
    ) -> Result<Vec<u8>, ProviderError> {
        let file = contained(&self.root, path).ok_or_else(|| {
            ProviderError::SourceUnreadable(path.to_string(), "outside source folder".into())
        })?;
        fs::read(&file)
            .await
            .map_err(|e| ProviderError::SourceUnreadable(path.to_string(), e.to_string()))
    }
}

/// Apply target materialising a snapshot into a directory.
pub struct FolderTarget {
    out: PathBuf,
}

impl FolderTarget {
    pub fn new(out: impl Into<PathBuf>) -> Self {
        Self { out: out.into() }
    }

    fn aux_file(&self, kind: AuxKind) -> PathBuf {
        self.out.join(format!("{kind}.json"))
    }
}

impl Provider for FolderTarget {
    fn id(&self) -> &str {
        "folder-target"
    }

    fn as_apply(&self) -> Option<&dyn ApplyProvider> {
        Some(self)
    }
}

#[async_trait]
impl ApplyProvider for FolderTarget {
    async fn apply(
        &self,
        _slot: u16,
        files: &BTreeMap<GamePath, PathBuf>,
        aux: &AuxPayloads,
    ) -> Result<Option<ProfileId>, ProviderError> {
        fs::create_dir_all(&self.out).await?;
        for (game_path, blob) in files {
            let Some(target) = contained(&self.out, game_path) else {
                warn!(path = %game_path, "Game path escapes the output folder, skipping");
                continue;
            };
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).await?;
            }
            fs::copy(blob, &target).await?;
        }
        for (kind, payload) in aux {
            fs::write(self.aux_file(*kind), payload).await?;
        }
        Ok(None)
    }

    async fn clear(&self, _slot: u16) -> Result<(), ProviderError> {
        match fs::remove_dir_all(&self.out).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    async fn release_profile(&self, _profile: ProfileId) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn reset_aux(&self, _slot: u16) -> Result<(), ProviderError> {
        for kind in AuxKind::ALL {
            match fs::remove_file(self.aux_file(kind)).await {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e.into()),
                _ => {}
            }
        }
        Ok(())
    }
}

/// `base` joined with a game path, or `None` if the path would leave `base`.
fn contained(base: &Path, path: &GamePath) -> Option<PathBuf> {
    let relative = Path::new(path.as_str());
    relative
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
        .then(|| base.join(relative))
}
