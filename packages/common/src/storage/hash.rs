use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::error::StorageError;

const MIN_HEX_LEN: usize = 8;
const MAX_HEX_LEN: usize = 128;

/// A validated, lowercase hex content hash.
///
/// Hashes computed by this crate are SHA-256 (64 hex characters). Shorter or
/// longer digests are accepted when parsing so that file maps produced by
/// other tools still round-trip; they simply never match a freshly computed
/// hash.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContentHash(String);

impl ContentHash {
    /// Compute the SHA-256 hash of the given data.
    pub fn compute(data: &[u8]) -> Self {
        let hash = Sha256::digest(data);
        Self(hex::encode(hash))
    }

    /// Parse a hex-encoded content hash string.
    pub fn from_hex(s: &str) -> Result<Self, StorageError> {
        let s = s.trim();
        if !(MIN_HEX_LEN..=MAX_HEX_LEN).contains(&s.len()) {
            return Err(StorageError::InvalidHash(format!(
                "expected {MIN_HEX_LEN}..={MAX_HEX_LEN} hex characters, got {}",
                s.len()
            )));
        }

        if s.len() % 2 != 0 {
            return Err(StorageError::InvalidHash(format!(
                "odd number of hex characters ({})",
                s.len()
            )));
        }

        if !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(StorageError::InvalidHash(format!("invalid hex: {s}")));
        }

        Ok(Self(s.to_ascii_lowercase()))
    }

    /// Return the hash as a lowercase hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.0)
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for ContentHash {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
