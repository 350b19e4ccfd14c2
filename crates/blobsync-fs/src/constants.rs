//! Well-known names used by blobsync on disk and in containers.

use std::path::Path;

/// Standard state paths and markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatePath {
    /// Default state directory under the local root
    StateDir,
    /// Directory holding one knowledge file per replica
    KnowledgeDir,
    /// Replica identity registry inside the state directory
    ReplicasFile,
    /// Lock file serializing knowledge commits
    LockFile,
    /// Zero-byte object standing in for a directory in a container
    DirectoryMarker,
}

impl StatePath {
    /// Get the string representation of the path.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StateDir => ".blobsync",
            Self::KnowledgeDir => "knowledge",
            Self::ReplicasFile => "replicas.toml",
            Self::LockFile => "knowledge.lock",
            Self::DirectoryMarker => ".blobsync-dir",
        }
    }
}

impl AsRef<Path> for StatePath {
    fn as_ref(&self) -> &Path {
        Path::new(self.as_str())
    }
}

impl AsRef<str> for StatePath {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl std::fmt::Display for StatePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
