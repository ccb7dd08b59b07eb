//! Append-only auxiliary-state history.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use provider_core::AuxKind;
use serde_json::Value;
use uuid::Uuid;

use crate::error::{Result, SnapshotError};
use crate::model::{FileMapId, HistoryEntry};

/// How two payloads are judged equal when deciding whether a capture is new.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum PayloadComparison {
    /// Byte-for-byte equality.
    #[default]
    Exact,
    /// JSON payloads whose numbers differ by at most the given epsilon are
    /// equal. Non-JSON payloads fall back to exact comparison.
    Tolerant(f64),
}

impl PayloadComparison {
    pub fn from_tolerance(tolerance: Option<f64>) -> Self {
        match tolerance {
            Some(eps) if eps > 0.0 => Self::Tolerant(eps),
            _ => Self::Exact,
        }
    }

    pub fn same(&self, a: &str, b: &str) -> bool {
        if a == b {
            return true;
        }
        match self {
            Self::Exact => false,
            Self::Tolerant(eps) => {
                match (
                    serde_json::from_str::<Value>(a),
                    serde_json::from_str::<Value>(b),
                ) {
                    (Ok(a), Ok(b)) => values_close(&a, &b, *eps),
                    _ => false,
                }
            }
        }
    }
}

fn values_close(a: &Value, b: &Value, eps: f64) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => (x - y).abs() <= eps,
            _ => x == y,
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_close(x, y, eps))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| values_close(x, y, eps)))
        }
        _ => a == b,
    }
}

/// Ordered history entries per auxiliary kind, newest last.
#[derive(Debug, Clone, Default)]
pub struct HistoryTracker {
    entries: BTreeMap<AuxKind, Vec<HistoryEntry>>,
    comparison: PayloadComparison,
}

impl HistoryTracker {
    pub fn new(comparison: PayloadComparison) -> Self {
        Self {
            entries: BTreeMap::new(),
            comparison,
        }
    }

    /// Replace the entries of one kind, e.g. after loading them from disk.
    pub fn load_kind(&mut self, kind: AuxKind, entries: Vec<HistoryEntry>) {
        self.entries.insert(kind, entries);
    }

    /// Record a capture unless it repeats the latest entry of its kind.
    ///
    /// An entry is appended when the payload differs from the latest one, or
    /// when the payload is the same but the file-map version moved on, so
    /// the exact file set in effect for that payload stays recoverable.
    /// Returns the new entry, or `None` when nothing was appended.
    pub fn append(
        &mut self,
        kind: AuxKind,
        payload: &str,
        file_map_id: Option<FileMapId>,
        description: &str,
        now: DateTime<Utc>,
    ) -> Option<&HistoryEntry> {
        if let Some(latest) = self.latest(kind) {
            if self.comparison.same(&latest.payload, payload) && latest.file_map_id == file_map_id {
                return None;
            }
        }

        let list = self.entries.entry(kind).or_default();
        list.push(HistoryEntry::new(payload, file_map_id, description, now));
        list.last()
    }

    /// Append without the duplicate check.
    pub fn push(&mut self, kind: AuxKind, entry: HistoryEntry) {
        self.entries.entry(kind).or_default().push(entry);
    }

    pub fn entries(&self, kind: AuxKind) -> &[HistoryEntry] {
        self.entries.get(&kind).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn latest(&self, kind: AuxKind) -> Option<&HistoryEntry> {
        self.entries(kind).last()
    }

    pub fn get(&self, kind: AuxKind, id: Uuid) -> Result<&HistoryEntry> {
        self.entries(kind)
            .iter()
            .find(|e| e.id == id)
            .ok_or(SnapshotError::EntryNotFound { kind, id })
    }

    /// Remove one entry. Other entries are left exactly as they were.
    pub fn delete(&mut self, kind: AuxKind, id: Uuid) -> Result<HistoryEntry> {
        let list = self.entries.entry(kind).or_default();
        let pos = list
            .iter()
            .position(|e| e.id == id)
            .ok_or(SnapshotError::EntryNotFound { kind, id })?;
        Ok(list.remove(pos))
    }

    pub fn rename(&mut self, kind: AuxKind, id: Uuid, description: &str) -> Result<()> {
        let entry = self
            .entries
            .get_mut(&kind)
            .and_then(|list| list.iter_mut().find(|e| e.id == id))
            .ok_or(SnapshotError::EntryNotFound { kind, id })?;
        entry.description = description.to_string();
        Ok(())
    }
}
