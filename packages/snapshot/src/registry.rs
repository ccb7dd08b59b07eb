//! In-memory record of snapshots currently applied to live actor slots.

use provider_core::{ActorIdentity, ApplyProvider, IdentityProvider, ProfileId};
use tracing::{info, warn};

use crate::model::FileMapId;

/// A snapshot applied to one actor slot.
///
/// Treated as a value: the registry never edits an entry in place, it
/// swaps in an updated copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveApplication {
    /// Snapshot name the application came from.
    pub snapshot: String,
    pub file_map_id: Option<FileMapId>,
    pub slot: u16,
    /// Auxiliary profile created by the apply provider, if any.
    pub profile: Option<ProfileId>,
    pub is_local: bool,
    /// Display name used to re-match the actor when its slot changes.
    pub name: String,
    /// Auxiliary layer is protected from unrelated automatic reapplication.
    pub aux_locked: bool,
}

impl ActiveApplication {
    pub fn with_slot(&self, slot: u16) -> Self {
        Self {
            slot,
            ..self.clone()
        }
    }

    pub fn with_aux_locked(&self, aux_locked: bool) -> Self {
        Self {
            aux_locked,
            ..self.clone()
        }
    }
}

#[derive(Debug, Default)]
pub struct ActiveSnapshotRegistry {
    entries: Vec<ActiveApplication>,
    persist_local_on_auto_revert: bool,
}

impl ActiveSnapshotRegistry {
    pub fn new(persist_local_on_auto_revert: bool) -> Self {
        Self {
            entries: Vec::new(),
            persist_local_on_auto_revert,
        }
    }

    /// Record an application. Callers remove any earlier entry for the same
    /// actor first; nothing here enforces uniqueness.
    pub fn add(&mut self, application: ActiveApplication) {
        self.entries.push(application);
    }

    pub fn entries(&self) -> &[ActiveApplication] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn find(&self, actor: &ActorIdentity) -> Vec<&ActiveApplication> {
        self.matching(actor)
            .into_iter()
            .map(|i| &self.entries[i])
            .collect()
    }

    /// Indices of entries for `actor`: by slot first, then by the local-actor
    /// flag, then by display name. The first tier with a hit wins.
    fn matching(&self, actor: &ActorIdentity) -> Vec<usize> {
        let tiers: [&dyn Fn(&ActiveApplication) -> bool; 3] = [
            &|e| e.slot == actor.slot,
            &|e| actor.is_local && e.is_local,
            &|e| e.name == actor.name,
        ];
        tiers
            .iter()
            .map(|tier| {
                self.entries
                    .iter()
                    .enumerate()
                    .filter(|(_, e)| tier(*e))
                    .map(|(i, _)| i)
                    .collect::<Vec<_>>()
            })
            .find(|hits| !hits.is_empty())
            .unwrap_or_default()
    }

    /// Remove the entries at `indices`, returned in their original order.
    fn take(&mut self, mut indices: Vec<usize>) -> Vec<ActiveApplication> {
        indices.sort_unstable();
        let mut taken: Vec<ActiveApplication> = indices
            .into_iter()
            .rev()
            .map(|i| self.entries.remove(i))
            .collect();
        taken.reverse();
        taken
    }

    /// Drop every entry for `actor` without touching the live actor.
    pub fn remove_all_for(&mut self, actor: &ActorIdentity) -> Vec<ActiveApplication> {
        let indices = self.matching(actor);
        self.take(indices)
    }

    /// Undo every application recorded for `actor`.
    ///
    /// Cleanup is best-effort: provider failures and a vanished actor are
    /// logged, and the entries are removed regardless.
    pub async fn revert(
        &mut self,
        actor: &ActorIdentity,
        apply: &dyn ApplyProvider,
        identity: &dyn IdentityProvider,
    ) -> Vec<ActiveApplication> {
        let removed = self.remove_all_for(actor);
        for entry in &removed {
            undo(entry, apply, identity).await;
        }
        removed
    }

    /// Revert everything.
    ///
    /// With `respect_persistence`, used for automatic triggers such as
    /// leaving a special mode, the local actor's entry survives when the
    /// registry is configured to keep it. A manual revert passes `false`.
    pub async fn revert_all(
        &mut self,
        respect_persistence: bool,
        apply: &dyn ApplyProvider,
        identity: &dyn IdentityProvider,
    ) -> Vec<ActiveApplication> {
        let keep_local = respect_persistence && self.persist_local_on_auto_revert;
        let indices: Vec<usize> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| !(keep_local && e.is_local))
            .map(|(i, _)| i)
            .collect();

        let removed = self.take(indices);
        for entry in &removed {
            undo(entry, apply, identity).await;
        }
        removed
    }

    /// Move the local actor's entry from `old` to `new` when the environment
    /// reindexes it. Returns whether an entry was moved.
    pub fn remap_slot(&mut self, old: u16, new: u16) -> bool {
        let Some(pos) = self
            .entries
            .iter()
            .position(|e| e.is_local && e.slot == old)
        else {
            return false;
        };
        let moved = self.entries.remove(pos).with_slot(new);
        info!(old, new, snapshot = %moved.snapshot, "Remapped local actor slot");
        self.entries.push(moved);
        true
    }

    pub fn lock(&mut self, actor: &ActorIdentity) -> bool {
        self.set_aux_locked(actor, true)
    }

    pub fn unlock(&mut self, actor: &ActorIdentity) -> bool {
        self.set_aux_locked(actor, false)
    }

    pub fn is_aux_locked(&self, actor: &ActorIdentity) -> bool {
        self.find(actor).iter().any(|e| e.aux_locked)
    }

    fn set_aux_locked(&mut self, actor: &ActorIdentity, locked: bool) -> bool {
        let indices = self.matching(actor);
        if indices.is_empty() {
            return false;
        }
        let updated: Vec<ActiveApplication> = self
            .take(indices)
            .iter()
            .map(|e| e.with_aux_locked(locked))
            .collect();
        self.entries.extend(updated);
        true
    }

    /// Re-check every entry against the live actor table.
    ///
    /// Entries whose actor is still in place are kept; the local actor's
    /// entry follows it to a new slot; anything else is dropped and
    /// returned.
    pub fn revalidate(&mut self, identity: &dyn IdentityProvider) -> Vec<ActiveApplication> {
        let mut kept = Vec::with_capacity(self.entries.len());
        let mut dropped = Vec::new();
        for entry in std::mem::take(&mut self.entries) {
            match identity.actor_at(entry.slot) {
                Some(live) if live.name == entry.name => kept.push(entry),
                _ => match identity.local_actor().filter(|_| entry.is_local) {
                    Some(local) => kept.push(entry.with_slot(local.slot)),
                    None => {
                        warn!(
                            slot = entry.slot,
                            name = %entry.name,
                            snapshot = %entry.snapshot,
                            "Actor for active snapshot is gone, dropping entry"
                        );
                        dropped.push(entry);
                    }
                },
            }
        }
        self.entries = kept;
        dropped
    }
}

async fn undo(entry: &ActiveApplication, apply: &dyn ApplyProvider, identity: &dyn IdentityProvider) {
    let present = identity
        .actor_at(entry.slot)
        .is_some_and(|live| live.name == entry.name || (live.is_local && entry.is_local));
    if !present {
        warn!(
            slot = entry.slot,
            name = %entry.name,
            snapshot = %entry.snapshot,
            "No live actor at recorded slot; attempting cleanup anyway and dropping the entry"
        );
    }

    if let Err(e) = apply.clear(entry.slot).await {
        warn!(slot = entry.slot, error = %e, "Failed to clear applied files");
    }
    if let Some(profile) = entry.profile {
        if let Err(e) = apply.release_profile(profile).await {
            warn!(slot = entry.slot, profile = %profile, error = %e, "Failed to release profile");
        }
    }
    if let Err(e) = apply.reset_aux(entry.slot).await {
        warn!(slot = entry.slot, error = %e, "Failed to reset auxiliary layer");
    }
    info!(slot = entry.slot, snapshot = %entry.snapshot, "Reverted snapshot");
}
