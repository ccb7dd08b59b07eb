//! Delta-chain file maps.
//!
//! A snapshot's file set is stored as a chain of [`FileMapVersion`]s. The
//! root of a chain holds a full mapping; every other version holds only the
//! paths that changed relative to its base. Resolving a version replays the
//! chain root-to-leaf.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::error::{Result, SnapshotError};
use crate::model::{FileChanges, FileMapId, FileMapVersion, ResolvedMap, Snapshot};

/// Default ceiling on chain length.
pub const DEFAULT_MAX_CHAIN_DEPTH: usize = 64;

/// Resolves and extends a snapshot's file-map chains, bounded by `max_depth`.
#[derive(Debug, Clone, Copy)]
pub struct FileMapResolver {
    max_depth: usize,
}

impl Default for FileMapResolver {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CHAIN_DEPTH)
    }
}

impl FileMapResolver {
    pub fn new(max_depth: usize) -> Self {
        Self {
            max_depth: max_depth.max(1),
        }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Flatten `id` into a game path -> hash mapping.
    ///
    /// An absent or unknown `id` yields the snapshot's legacy flat mapping.
    /// A chain longer than the configured depth is reported as
    /// [`SnapshotError::ChainTooDeep`] rather than truncated.
    pub fn resolve(&self, snapshot: &Snapshot, id: Option<&FileMapId>) -> Result<ResolvedMap> {
        let Some(id) = id else {
            return Ok(snapshot.files.clone());
        };

        if snapshot.version(id).is_none() {
            warn!(file_map = %id, "Unknown file map version, using legacy mapping");
            return Ok(snapshot.files.clone());
        }

        let chain = self.chain(snapshot, id)?;
        let resolved = chain
            .iter()
            .rev()
            .fold(ResolvedMap::new(), |acc, v| apply_changes(&acc, &v.changes));
        debug!(file_map = %id, depth = chain.len(), files = resolved.len(), "Resolved file map");
        Ok(resolved)
    }

    /// Number of versions from `id` back to its root, inclusive.
    pub fn depth(&self, snapshot: &Snapshot, id: &FileMapId) -> Result<usize> {
        self.chain(snapshot, id).map(|chain| chain.len())
    }

    /// Versions from `id` back to its root, leaf first.
    fn chain<'a>(&self, snapshot: &'a Snapshot, id: &FileMapId) -> Result<Vec<&'a FileMapVersion>> {
        let index: HashMap<&FileMapId, &FileMapVersion> =
            snapshot.file_maps.iter().map(|v| (&v.id, v)).collect();

        let mut chain = Vec::new();
        let mut cursor = Some(*id);
        while let Some(current) = cursor {
            if chain.len() >= self.max_depth {
                return Err(SnapshotError::ChainTooDeep {
                    id: *id,
                    limit: self.max_depth,
                });
            }
            let version = index
                .get(&current)
                .copied()
                .ok_or(SnapshotError::BrokenChain {
                    id: *id,
                    missing: current,
                })?;
            chain.push(version);
            cursor = version.base_id;
        }
        Ok(chain)
    }

    /// Establish the root version the first time a non-empty map exists.
    ///
    /// Returns the current pointer: the existing one untouched when already
    /// set, the new root's id when one was created, `None` when `map` is
    /// empty and no pointer exists.
    pub fn create_root_if_missing(
        &self,
        snapshot: &mut Snapshot,
        map: &ResolvedMap,
        now: DateTime<Utc>,
    ) -> Option<FileMapId> {
        if let Some(current) = snapshot.current_file_map {
            return Some(current);
        }
        if map.is_empty() {
            return None;
        }

        let changes = map
            .iter()
            .map(|(path, hash)| (path.clone(), Some(hash.clone())))
            .collect();
        Some(push_version(snapshot, None, changes, now))
    }

    /// Record `changes` on top of `current`, the resolved map of the current
    /// pointer, and advance the pointer.
    ///
    /// Without a pointer this creates the first root. When one more delta
    /// would reach the depth ceiling, a new root holding the full mapping is
    /// started instead; older versions keep their own chains.
    pub fn advance(
        &self,
        snapshot: &mut Snapshot,
        current: &ResolvedMap,
        changes: FileChanges,
        now: DateTime<Utc>,
    ) -> Result<Option<FileMapId>> {
        let Some(base) = snapshot.current_file_map else {
            let full = apply_changes(current, &changes);
            return Ok(self.create_root_if_missing(snapshot, &full, now));
        };

        // A dangling pointer resolved to the legacy map; start over from it.
        let depth = match snapshot.version(&base) {
            Some(_) => self.depth(snapshot, &base)?,
            None => self.max_depth,
        };
        if depth < self.max_depth {
            return Ok(Some(self.append_version(snapshot, changes, now)));
        }

        let full = apply_changes(current, &changes)
            .into_iter()
            .map(|(path, hash)| (path, Some(hash)))
            .collect();
        let id = push_version(snapshot, None, full, now);
        info!(file_map = %id, previous = %base, limit = self.max_depth, "Chain at depth ceiling, started a new root");
        Ok(Some(id))
    }

    /// Append a delta on top of the current version and advance the pointer.
    pub fn append_version(
        &self,
        snapshot: &mut Snapshot,
        changes: FileChanges,
        now: DateTime<Utc>,
    ) -> FileMapId {
        let base = snapshot.current_file_map;
        push_version(snapshot, base, changes, now)
    }
}

fn push_version(
    snapshot: &mut Snapshot,
    base_id: Option<FileMapId>,
    changes: FileChanges,
    now: DateTime<Utc>,
) -> FileMapId {
    let id = FileMapId::generate();
    snapshot.file_maps.push(FileMapVersion {
        id,
        base_id,
        changes,
        created_at: now,
    });
    snapshot.current_file_map = Some(id);
    id
}

/// Paths whose hash in `incoming` differs from `current`.
///
/// With `include_removals`, paths missing from `incoming` are recorded as
/// removed. Otherwise omission is not treated as deletion, which suits
/// captures that only report what they currently observe.
pub fn diff(current: &ResolvedMap, incoming: &ResolvedMap, include_removals: bool) -> FileChanges {
    let mut changes: FileChanges = incoming
        .iter()
        .filter(|(path, hash)| current.get(*path) != Some(*hash))
        .map(|(path, hash)| (path.clone(), Some(hash.clone())))
        .collect();

    if include_removals {
        for path in current.keys().filter(|p| !incoming.contains_key(*p)) {
            changes.insert(path.clone(), None);
        }
    }

    changes
}

/// Overlay `changes` on `base`. Pure; changes win by key.
pub fn apply_changes(base: &ResolvedMap, changes: &FileChanges) -> ResolvedMap {
    let mut out = base.clone();
    for (path, hash) in changes {
        match hash {
            Some(hash) => {
                out.insert(path.clone(), hash.clone());
            }
            None => {
                out.remove(path);
            }
        }
    }
    out
}
