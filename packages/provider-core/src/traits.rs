use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use common::{ContentHash, GamePath};

use crate::error::ProviderError;
use crate::types::{ActorIdentity, AuxPayloads, CapturedState, ProfileId};

/// Produces the current appearance state of a live actor.
#[async_trait]
pub trait CaptureProvider: Send + Sync {
    async fn capture(&self, actor: &ActorIdentity) -> Result<CapturedState, ProviderError>;

    /// Bytes of the file currently providing `path`, expected to hash to `hash`.
    async fn read_source(
        &self,
        hash: &ContentHash,
        path: &GamePath,
    ) -> Result<Vec<u8>, ProviderError>;
}

/// Pushes a resolved snapshot onto a live actor slot and undoes it again.
#[async_trait]
pub trait ApplyProvider: Send + Sync {
    /// Redirect `files` for the actor in `slot` and apply the auxiliary
    /// payloads. Returns a profile handle when the provider created one.
    async fn apply(
        &self,
        slot: u16,
        files: &BTreeMap<GamePath, PathBuf>,
        aux: &AuxPayloads,
    ) -> Result<Option<ProfileId>, ProviderError>;

    /// Remove any file redirection applied to `slot`.
    async fn clear(&self, slot: u16) -> Result<(), ProviderError>;

    /// Release a profile handle previously returned by [`ApplyProvider::apply`].
    async fn release_profile(&self, profile: ProfileId) -> Result<(), ProviderError>;

    /// Unlock the auxiliary layer of `slot` and reset it to the actor's baseline.
    async fn reset_aux(&self, slot: u16) -> Result<(), ProviderError>;
}

/// Answers questions about live actors. Called from the control thread only.
pub trait IdentityProvider: Send + Sync {
    /// The actor currently occupying `slot`, if any.
    fn actor_at(&self, slot: u16) -> Option<ActorIdentity>;

    /// The privileged / local actor, if present.
    fn local_actor(&self) -> Option<ActorIdentity>;
}
