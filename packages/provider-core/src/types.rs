use std::collections::BTreeMap;
use std::fmt;

use common::{ContentHash, GamePath};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Auxiliary appearance state kinds tracked alongside the file map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuxKind {
    /// Outfit / equipment description.
    Outfit,
    /// Body shape and pose scaling description.
    Shape,
}

impl AuxKind {
    pub const ALL: [AuxKind; 2] = [AuxKind::Outfit, AuxKind::Shape];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Outfit => "outfit",
            Self::Shape => "shape",
        }
    }
}

impl fmt::Display for AuxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque auxiliary payloads keyed by kind. A missing kind was not captured.
pub type AuxPayloads = BTreeMap<AuxKind, String>;

/// Everything a capture provider observed for one actor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CapturedState {
    /// Label of the actor the state was captured from.
    pub actor: String,
    /// World the actor belongs to, when known.
    pub world: Option<u16>,
    /// Flat game path -> content hash mapping of every file in use.
    pub files: BTreeMap<GamePath, ContentHash>,
    pub aux: AuxPayloads,
}

/// A live actor as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorIdentity {
    /// Current slot index in the environment's actor table.
    pub slot: u16,
    /// Whether this is the privileged / local actor.
    pub is_local: bool,
    /// Display name, used to re-match an actor whose slot changed.
    pub name: String,
}

impl ActorIdentity {
    pub fn new(slot: u16, is_local: bool, name: impl Into<String>) -> Self {
        Self {
            slot,
            is_local,
            name: name.into(),
        }
    }
}

/// Handle issued by the apply provider for auxiliary state it created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileId(pub Uuid);

impl fmt::Display for ProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
