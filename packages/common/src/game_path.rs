use std::fmt;

use serde::{Deserialize, Serialize};

/// Extension used for blobs whose source path has no usable extension.
pub const FALLBACK_EXTENSION: &str = "dat";

const MAX_EXTENSION_LEN: usize = 8;

/// A logical game resource path, e.g. `chara/equipment/e0001/texture/v01_c0101e0001_top_d.tex`.
///
/// Backslashes are normalized to forward slashes and surrounding whitespace
/// is trimmed; case is preserved.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GamePath(String);

impl GamePath {
    pub fn new(path: impl AsRef<str>) -> Self {
        Self(path.as_ref().trim().replace('\\', "/"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The raw extension of the final path segment, if any.
    pub fn extension(&self) -> Option<&str> {
        let file_name = self.0.rsplit('/').next()?;
        let (stem, ext) = file_name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(ext)
    }

    /// Extension to use when naming a blob produced from this path.
    pub fn blob_extension(&self) -> String {
        sanitize_extension(self.extension())
    }
}

impl fmt::Display for GamePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GamePath {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Restricts a source extension to 1..=8 ASCII alphanumerics, lowercased.
/// Anything else collapses to [`FALLBACK_EXTENSION`].
pub fn sanitize_extension(ext: Option<&str>) -> String {
    match ext {
        Some(ext)
            if !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_LEN
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            ext.to_ascii_lowercase()
        }
        _ => FALLBACK_EXTENSION.to_string(),
    }
}
