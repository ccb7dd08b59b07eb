//! Turning a stored snapshot into something the apply provider can use.

use std::collections::BTreeMap;
use std::path::PathBuf;

use common::{BlobStore, GamePath};
use provider_core::{ActorIdentity, ApplyProvider, AuxKind, AuxPayloads};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::model::FileMapId;
use crate::registry::{ActiveApplication, ActiveSnapshotRegistry};
use crate::repository::SnapshotRepository;

/// Which history entry supplies an auxiliary payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuxChoice {
    #[default]
    Latest,
    Entry(Uuid),
    Skip,
}

#[derive(Debug, Clone, Default)]
pub struct ApplyRequest {
    /// File-map version to apply; `None` applies the current one.
    pub file_map: Option<FileMapId>,
    pub outfit: AuxChoice,
    pub shape: AuxChoice,
    /// Lock the auxiliary layer against automatic reapplication.
    pub lock_aux: bool,
    /// Replace the auxiliary layer even if the actor's current application
    /// has it locked.
    pub unlock_aux: bool,
}

impl ApplyRequest {
    pub fn choice(&self, kind: AuxKind) -> AuxChoice {
        match kind {
            AuxKind::Outfit => self.outfit,
            AuxKind::Shape => self.shape,
        }
    }
}

/// A resolved snapshot ready to hand to an apply provider.
#[derive(Debug, Clone, Default)]
pub struct PreparedApplication {
    pub file_map_id: Option<FileMapId>,
    /// Game path -> stored blob file.
    pub files: BTreeMap<GamePath, PathBuf>,
    pub aux: AuxPayloads,
    /// Game paths left out because no blob exists for their hash.
    pub missing: Vec<GamePath>,
}

/// Resolve a request against a repository.
///
/// A hash with no stored blob skips that game path with a warning; the
/// rest of the mapping is still returned.
pub async fn prepare(repo: &SnapshotRepository, request: &ApplyRequest) -> Result<PreparedApplication> {
    let snapshot = repo.load_required().await?;
    let history = repo.load_history().await?;

    let file_map_id = request.file_map.or(snapshot.current_file_map);
    let resolved = repo.resolver().resolve(&snapshot, file_map_id.as_ref())?;

    let mut prepared = PreparedApplication {
        file_map_id,
        ..Default::default()
    };
    for (path, hash) in &resolved {
        match repo.blobs().resolve_path(hash, Some(path)).await? {
            Some(file) => {
                prepared.files.insert(path.clone(), file);
            }
            None => {
                warn!(path = %path, hash = %hash, "Blob missing, skipping game path");
                prepared.missing.push(path.clone());
            }
        }
    }

    for kind in AuxKind::ALL {
        let payload = match request.choice(kind) {
            AuxChoice::Latest => history.latest(kind).map(|e| e.payload.clone()),
            AuxChoice::Entry(id) => Some(history.get(kind, id)?.payload.clone()),
            AuxChoice::Skip => None,
        };
        if let Some(payload) = payload {
            prepared.aux.insert(kind, payload);
        }
    }

    Ok(prepared)
}

/// Apply a snapshot to `actor` and record it in `registry`.
///
/// Any earlier application for the same actor is dropped from the registry
/// and its profile released first; its file redirection is simply
/// overwritten. A locked auxiliary layer is left alone and stays locked
/// unless the request sets `unlock_aux`.
pub async fn apply(
    repo: &SnapshotRepository,
    name: &str,
    request: &ApplyRequest,
    actor: &ActorIdentity,
    provider: &dyn ApplyProvider,
    registry: &mut ActiveSnapshotRegistry,
) -> Result<ActiveApplication> {
    let mut prepared = prepare(repo, request).await?;

    let keep_lock = registry.is_aux_locked(actor) && !request.unlock_aux;
    if keep_lock && !prepared.aux.is_empty() {
        debug!(slot = actor.slot, "Auxiliary layer locked, applying files only");
        prepared.aux.clear();
    }

    for prior in registry.remove_all_for(actor) {
        if let Some(profile) = prior.profile {
            if let Err(e) = provider.release_profile(profile).await {
                warn!(slot = prior.slot, profile = %profile, error = %e, "Failed to release previous profile");
            }
        }
    }

    let profile = provider
        .apply(actor.slot, &prepared.files, &prepared.aux)
        .await?;

    let application = ActiveApplication {
        snapshot: name.to_string(),
        file_map_id: prepared.file_map_id,
        slot: actor.slot,
        profile,
        is_local: actor.is_local,
        name: actor.name.clone(),
        aux_locked: request.lock_aux || keep_lock,
    };
    registry.add(application.clone());

    info!(
        snapshot = name,
        slot = actor.slot,
        files = prepared.files.len(),
        missing = prepared.missing.len(),
        "Applied snapshot"
    );
    Ok(application)
}
