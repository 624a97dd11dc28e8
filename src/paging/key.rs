//! Hierarchical buffer identifiers.
//!
//! Keys follow the scene-graph path convention: `/World/Mesh_0/points`.
//! The absolute root `/` is a valid key with no segments.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::KeyError;

/// Slash-delimited path that names one buffer inside a `BufferManager`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BufferKey(String);

impl BufferKey {
    /// Parse and validate a key.
    ///
    /// A trailing slash is dropped (`/a/b/` becomes `/a/b`), so equal paths
    /// always compare and hash equal.
    pub fn new(path: impl AsRef<str>) -> Result<Self, KeyError> {
        let path = path.as_ref();
        if path.is_empty() {
            return Err(KeyError::Empty);
        }
        if !path.starts_with('/') {
            return Err(KeyError::NotAbsolute(path.to_string()));
        }
        if path == "/" {
            return Ok(Self::root());
        }

        let trimmed = path.strip_suffix('/').unwrap_or(path);
        for segment in trimmed[1..].split('/') {
            if segment.is_empty() {
                return Err(KeyError::EmptySegment(path.to_string()));
            }
            if let Some(ch) = segment
                .chars()
                .find(|c| c.is_control() || c.is_whitespace())
            {
                return Err(KeyError::InvalidCharacter { key: path.to_string(), ch });
            }
        }
        Ok(Self(trimmed.to_string()))
    }

    /// The absolute root path.
    pub fn root() -> Self {
        Self("/".to_string())
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path segments from the root down.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    /// Number of segments (0 for the root).
    pub fn depth(&self) -> usize {
        self.segments().count()
    }

    /// Last segment, or `None` for the root.
    pub fn name(&self) -> Option<&str> {
        self.segments().last()
    }

    /// Parent path, or `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(0) => Some(Self::root()),
            Some(idx) => Some(Self(self.0[..idx].to_string())),
            None => None,
        }
    }

    /// Append one child segment.
    pub fn child(&self, name: &str) -> Result<Self, KeyError> {
        if self.is_root() {
            Self::new(format!("/{}", name))
        } else {
            Self::new(format!("{}/{}", self.0, name))
        }
    }

    /// True if `prefix` is this key or one of its ancestors.
    pub fn has_prefix(&self, prefix: &BufferKey) -> bool {
        if prefix.is_root() {
            return true;
        }
        let mut ours = self.segments();
        prefix.segments().all(|p| ours.next() == Some(p))
    }
}

// Ordering is segment-wise so that `/a/b` sorts before `/a-c`
// even though '-' < '/' byte-wise.
impl Ord for BufferKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.segments().cmp(other.segments())
    }
}

impl PartialOrd for BufferKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for BufferKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for BufferKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for BufferKey {
    type Error = KeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<BufferKey> for String {
    fn from(key: BufferKey) -> Self {
        key.0
    }
}
