//! Replica-neutral item paths
//!
//! Every synchronized item is identified by its path relative to the
//! replica root. The same identity is used for a file on disk and for an
//! object key in a container, so it is normalized to forward slashes with
//! no leading slash and no empty, `.` or `..` segments.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A validated path relative to a replica root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ItemPath {
    /// Internal representation always uses forward slashes
    inner: String,
}

impl ItemPath {
    /// Parse a relative path, normalizing separators.
    ///
    /// Backslashes become forward slashes, empty and `.` segments are
    /// dropped. Parent references and the empty path are rejected.
    pub fn new(path: impl AsRef<str>) -> Result<Self> {
        let raw = path.as_ref();
        let normalized = raw.replace('\\', "/");
        let mut segments = Vec::new();
        for segment in normalized.split('/') {
            match segment {
                "" | "." => continue,
                ".." => {
                    return Err(Error::InvalidPath {
                        path: raw.to_string(),
                        reason: "parent references are not allowed".into(),
                    });
                }
                s => segments.push(s),
            }
        }

        if segments.is_empty() {
            return Err(Error::InvalidPath {
                path: raw.to_string(),
                reason: "path is empty".into(),
            });
        }

        Ok(Self {
            inner: segments.join("/"),
        })
    }

    /// Build an item path from an absolute path below `root`.
    pub fn from_native(root: &Path, full: &Path) -> Result<Self> {
        let relative = full.strip_prefix(root).map_err(|_| Error::InvalidPath {
            path: full.display().to_string(),
            reason: format!("not below {}", root.display()),
        })?;

        let mut parts = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
                Component::CurDir => {}
                _ => {
                    return Err(Error::InvalidPath {
                        path: full.display().to_string(),
                        reason: "unexpected path component".into(),
                    });
                }
            }
        }
        Self::new(parts.join("/"))
    }

    /// Get the internal normalized string representation.
    pub fn as_str(&self) -> &str {
        &self.inner
    }

    /// Iterate over the path segments, outermost first.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.inner.split('/')
    }

    /// Number of segments; root-level items have depth 1.
    pub fn depth(&self) -> usize {
        self.segments().count()
    }

    /// Resolve against a replica root as a platform-native path.
    pub fn to_native(&self, root: &Path) -> PathBuf {
        let mut path = root.to_path_buf();
        for segment in self.segments() {
            path.push(segment);
        }
        path
    }

    /// Join this path with a relative segment.
    pub fn join(&self, segment: &str) -> Result<Self> {
        Self::new(format!("{}/{}", self.inner, segment))
    }

    /// Get the parent directory, or `None` for root-level items.
    pub fn parent(&self) -> Option<Self> {
        self.inner.rfind('/').map(|idx| Self {
            inner: self.inner[..idx].to_string(),
        })
    }

    /// Get the final segment.
    pub fn file_name(&self) -> &str {
        self.inner.rsplit('/').next().unwrap_or(&self.inner)
    }

    /// True when this path equals `prefix` or is nested under it.
    ///
    /// Matching is segment-wise: `logs2/a` is not within `logs`.
    pub fn is_within(&self, prefix: &ItemPath) -> bool {
        self.inner == prefix.inner
            || (self.inner.starts_with(&prefix.inner)
                && self.inner.as_bytes().get(prefix.inner.len()) == Some(&b'/'))
    }

    /// All proper ancestors, nearest first.
    pub fn ancestors(&self) -> Vec<ItemPath> {
        let mut out = Vec::new();
        let mut current = self.parent();
        while let Some(parent) = current {
            current = parent.parent();
            out.push(parent);
        }
        out
    }
}

impl fmt::Display for ItemPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl AsRef<str> for ItemPath {
    fn as_ref(&self) -> &str {
        &self.inner
    }
}

impl TryFrom<String> for ItemPath {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl TryFrom<&str> for ItemPath {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

impl From<ItemPath> for String {
    fn from(path: ItemPath) -> Self {
        path.inner
    }
}
