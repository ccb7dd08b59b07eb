use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ::common::{ContentHash, GamePath};
use provider_core::{
    ActorIdentity, ApplyProvider, AuxKind, AuxPayloads, CaptureProvider, CapturedState,
    IdentityProvider, ProfileId, Provider, ProviderError, ProviderRegistry,
};
use snapshot::{
    ActiveSnapshotRegistry, RepositorySettings, Session, SnapshotLibrary, SnapshotRepository,
};
use tempfile::TempDir;
use uuid::Uuid;

/// A live actor environment: capture source, apply target and actor table
/// in one provider.
#[derive(Default)]
pub struct FakeEnvironment {
    state: Mutex<CapturedState>,
    bytes: Mutex<BTreeMap<ContentHash, Vec<u8>>>,
    unreadable: Mutex<HashSet<ContentHash>>,
    actors: Mutex<BTreeMap<u16, ActorIdentity>>,
    calls: Mutex<Vec<ApplyCall>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ApplyCall {
    Apply {
        slot: u16,
        files: BTreeMap<GamePath, PathBuf>,
        aux: AuxPayloads,
        profile: ProfileId,
    },
    Clear(u16),
    Release(ProfileId),
    ResetAux(u16),
}

impl FakeEnvironment {
    pub fn new(actor: &str) -> Arc<Self> {
        let env = Self::default();
        env.state.lock().unwrap().actor = actor.to_string();
        Arc::new(env)
    }

    /// Put `bytes` at `path` in the live state and return their hash.
    pub fn set_file(&self, path: &str, bytes: &[u8]) -> ContentHash {
        let hash = ContentHash::compute(bytes);
        self.bytes.lock().unwrap().insert(hash.clone(), bytes.to_vec());
        self.state
            .lock()
            .unwrap()
            .files
            .insert(GamePath::new(path), hash.clone());
        hash
    }

    pub fn remove_file(&self, path: &str) {
        self.state.lock().unwrap().files.remove(&GamePath::new(path));
    }

    pub fn set_aux(&self, kind: AuxKind, payload: &str) {
        self.state
            .lock()
            .unwrap()
            .aux
            .insert(kind, payload.to_string());
    }

    /// Make the source bytes for `hash` fail to read.
    pub fn break_source(&self, hash: &ContentHash) {
        self.unreadable.lock().unwrap().insert(hash.clone());
    }

    pub fn state(&self) -> CapturedState {
        self.state.lock().unwrap().clone()
    }

    pub fn spawn_actor(&self, actor: ActorIdentity) {
        self.actors.lock().unwrap().insert(actor.slot, actor);
    }

    pub fn despawn(&self, slot: u16) {
        self.actors.lock().unwrap().remove(&slot);
    }

    pub fn calls(&self) -> Vec<ApplyCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl Provider for FakeEnvironment {
    fn id(&self) -> &str {
        "fake"
    }

    fn as_capture(&self) -> Option<&dyn CaptureProvider> {
        Some(self)
    }

    fn as_apply(&self) -> Option<&dyn ApplyProvider> {
        Some(self)
    }

    fn as_identity(&self) -> Option<&dyn IdentityProvider> {
        Some(self)
    }
}

#[async_trait]
impl CaptureProvider for FakeEnvironment {
    async fn capture(&self, _actor: &ActorIdentity) -> Result<CapturedState, ProviderError> {
        Ok(self.state())
    }

    async fn read_source(
        &self,
        hash: &ContentHash,
        path: &GamePath,
    ) -> Result<Vec<u8>, ProviderError> {
        if self.unreadable.lock().unwrap().contains(hash) {
            return Err(ProviderError::SourceUnreadable(
                path.to_string(),
                "locked".into(),
            ));
        }
        self.bytes
            .lock()
            .unwrap()
            .get(hash)
            .cloned()
            .ok_or_else(|| ProviderError::SourceUnreadable(path.to_string(), "gone".into()))
    }
}

#[async_trait]
impl ApplyProvider for FakeEnvironment {
    async fn apply(
        &self,
        slot: u16,
        files: &BTreeMap<GamePath, PathBuf>,
        aux: &AuxPayloads,
    ) -> Result<Option<ProfileId>, ProviderError> {
        let profile = ProfileId(Uuid::new_v4());
        self.calls.lock().unwrap().push(ApplyCall::Apply {
            slot,
            files: files.clone(),
            aux: aux.clone(),
            profile,
        });
        Ok(Some(profile))
    }

    async fn clear(&self, slot: u16) -> Result<(), ProviderError> {
        self.calls.lock().unwrap().push(ApplyCall::Clear(slot));
        Ok(())
    }

    async fn release_profile(&self, profile: ProfileId) -> Result<(), ProviderError> {
        self.calls.lock().unwrap().push(ApplyCall::Release(profile));
        Ok(())
    }

    async fn reset_aux(&self, slot: u16) -> Result<(), ProviderError> {
        self.calls.lock().unwrap().push(ApplyCall::ResetAux(slot));
        Ok(())
    }
}

impl IdentityProvider for FakeEnvironment {
    fn actor_at(&self, slot: u16) -> Option<ActorIdentity> {
        self.actors.lock().unwrap().get(&slot).cloned()
    }

    fn local_actor(&self) -> Option<ActorIdentity> {
        self.actors
            .lock()
            .unwrap()
            .values()
            .find(|a| a.is_local)
            .cloned()
    }
}

/// A temporary snapshot library wired to a [`FakeEnvironment`].
pub struct TestSnapshots {
    pub dir: TempDir,
    pub env: Arc<FakeEnvironment>,
    pub session: Session,
}

impl TestSnapshots {
    pub fn new() -> Self {
        Self::with_settings(RepositorySettings::default(), true)
    }

    pub fn with_settings(settings: RepositorySettings, persist_local: bool) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let env = FakeEnvironment::new("Aria Starfall");
        let mut providers = ProviderRegistry::new();
        providers.register(env.clone());
        let session = Session::new(
            SnapshotLibrary::new(dir.path(), settings),
            providers,
            ActiveSnapshotRegistry::new(persist_local),
        );
        Self { dir, env, session }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub async fn repo(&self, name: &str) -> SnapshotRepository {
        self.session
            .library()
            .open(name)
            .await
            .expect("Failed to open snapshot")
    }
}

pub fn local_actor(slot: u16) -> ActorIdentity {
    ActorIdentity::new(slot, true, "Aria Starfall")
}

pub fn path(p: &str) -> GamePath {
    GamePath::new(p)
}
