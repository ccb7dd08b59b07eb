//! The surface the UI / integration layer talks to.

use provider_core::{ActorIdentity, ApplyProvider, IdentityProvider, ProviderRegistry};

use crate::apply::{self, ApplyRequest};
use crate::config::AppConfig;
use crate::error::{Result, SnapshotError};
use crate::library::SnapshotLibrary;
use crate::registry::{ActiveApplication, ActiveSnapshotRegistry};
use crate::repository::{UpdateOptions, UpdateOutcome};

/// Owns the snapshot library, the external providers and the registry of
/// active applications. Meant to live on the control thread; every
/// registry mutation goes through here.
pub struct Session {
    library: SnapshotLibrary,
    providers: ProviderRegistry,
    active: ActiveSnapshotRegistry,
}

impl Session {
    pub fn new(
        library: SnapshotLibrary,
        providers: ProviderRegistry,
        active: ActiveSnapshotRegistry,
    ) -> Self {
        Self {
            library,
            providers,
            active,
        }
    }

    pub fn from_config(config: &AppConfig, providers: ProviderRegistry) -> Self {
        Self::new(
            SnapshotLibrary::from_config(config),
            providers,
            ActiveSnapshotRegistry::new(config.registry.persist_local_on_auto_revert),
        )
    }

    pub fn library(&self) -> &SnapshotLibrary {
        &self.library
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    pub fn active(&self) -> &ActiveSnapshotRegistry {
        &self.active
    }

    /// Capture `actor` and fold the result into snapshot `name`.
    pub async fn capture(
        &self,
        name: &str,
        actor: &ActorIdentity,
        options: &UpdateOptions,
    ) -> Result<UpdateOutcome> {
        let capture = self
            .providers
            .capture()
            .ok_or(SnapshotError::CapabilityMissing("capture"))?;
        let state = capture.capture(actor).await?;
        let repo = self.library.open_or_create(name).await?;
        repo.update(&state, capture, options).await
    }

    pub async fn apply(
        &mut self,
        name: &str,
        request: &ApplyRequest,
        actor: &ActorIdentity,
    ) -> Result<ActiveApplication> {
        let provider = self
            .providers
            .apply()
            .ok_or(SnapshotError::CapabilityMissing("apply"))?;
        let repo = self.library.open(name).await?;
        apply::apply(&repo, name, request, actor, provider, &mut self.active).await
    }

    pub async fn revert(&mut self, actor: &ActorIdentity) -> Result<Vec<ActiveApplication>> {
        let (apply, identity) = revert_capabilities(&self.providers)?;
        Ok(self.active.revert(actor, apply, identity).await)
    }

    /// `respect_persistence` is set for automatic triggers and cleared for a
    /// manual "revert all".
    pub async fn revert_all(&mut self, respect_persistence: bool) -> Result<Vec<ActiveApplication>> {
        let (apply, identity) = revert_capabilities(&self.providers)?;
        Ok(self
            .active
            .revert_all(respect_persistence, apply, identity)
            .await)
    }

    /// The environment reindexed the local actor, e.g. entering or leaving a
    /// capture mode.
    pub fn remap_local_slot(&mut self, old: u16, new: u16) -> bool {
        self.active.remap_slot(old, new)
    }

    pub fn lock(&mut self, actor: &ActorIdentity) -> bool {
        self.active.lock(actor)
    }

    pub fn unlock(&mut self, actor: &ActorIdentity) -> bool {
        self.active.unlock(actor)
    }

    /// Drop entries whose actors have disappeared from the live table.
    pub fn revalidate(&mut self) -> Result<Vec<ActiveApplication>> {
        let identity = self
            .providers
            .identity()
            .ok_or(SnapshotError::CapabilityMissing("identity"))?;
        Ok(self.active.revalidate(identity))
    }
}

fn revert_capabilities(
    providers: &ProviderRegistry,
) -> Result<(&dyn ApplyProvider, &dyn IdentityProvider)> {
    let apply = providers
        .apply()
        .ok_or(SnapshotError::CapabilityMissing("apply"))?;
    let identity = providers
        .identity()
        .ok_or(SnapshotError::CapabilityMissing("identity"))?;
    Ok((apply, identity))
}
