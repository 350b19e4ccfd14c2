//! Error types for blobsync-core

use std::path::PathBuf;

use crate::model::Side;

/// Result type for blobsync-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in blobsync-core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The local root directory does not exist or is not a directory
    #[error("Local root not found: {path}")]
    LocalRootMissing { path: PathBuf },

    /// The target no longer matches the state the write was planned against
    #[error("Precondition failed for {path}: {reason}")]
    Precondition { path: String, reason: String },

    /// Item absent on the replica
    #[error("Not found: {path}")]
    NotFound { path: String },

    /// A replica could not be scanned or reached
    #[error("{side} replica unavailable: {message}")]
    ReplicaUnavailable { side: Side, message: String },

    /// Error in knowledge persistence
    #[error("Knowledge error: {message}")]
    Knowledge { message: String },

    /// Invalid configuration value
    #[error("Invalid configuration: {message}")]
    Config { message: String },

    /// A file name pattern could not be compiled
    #[error("Invalid file name pattern '{pattern}': {reason}")]
    Pattern { pattern: String, reason: String },

    /// An interval setting that is not a whole number of seconds
    #[error("Invalid interval '{value}': expected a whole number of seconds")]
    InvalidInterval { value: String },

    /// Item operation that failed for a reason other than I/O
    #[error("Transfer failed for {path}: {reason}")]
    Transfer { path: String, reason: String },

    /// Background task panicked or was cancelled
    #[error("Task failed: {message}")]
    Task { message: String },

    // Transparent wrappers for underlying crate errors
    /// Filesystem error from blobsync-fs
    #[error(transparent)]
    Fs(#[from] blobsync_fs::Error),

    /// Object store error
    #[error(transparent)]
    Store(#[from] object_store::Error),

    /// Standard I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// TOML deserialization error
    #[error(transparent)]
    TomlDe(#[from] toml::de::Error),

    /// TOML serialization error
    #[error(transparent)]
    TomlSer(#[from] toml::ser::Error),
}

impl Error {
    /// Create a precondition failure for `path`.
    pub fn precondition(path: impl ToString, reason: impl Into<String>) -> Self {
        Self::Precondition {
            path: path.to_string(),
            reason: reason.into(),
        }
    }

    /// True for failures worth retrying within the same pass.
    ///
    /// Precondition mismatches and missing items are never transient:
    /// retrying cannot change their outcome until the next enumeration.
    pub fn is_transient(&self) -> bool {
        use std::io::ErrorKind;

        let io_transient = |kind: ErrorKind| {
            matches!(
                kind,
                ErrorKind::Interrupted
                    | ErrorKind::TimedOut
                    | ErrorKind::WouldBlock
                    | ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
            )
        };

        match self {
            Self::Store(err) => !matches!(
                err,
                object_store::Error::NotFound { .. }
                    | object_store::Error::AlreadyExists { .. }
                    | object_store::Error::Precondition { .. }
                    | object_store::Error::NotModified { .. }
                    | object_store::Error::NotImplemented
                    | object_store::Error::NotSupported { .. }
                    | object_store::Error::InvalidPath { .. }
                    | object_store::Error::UnknownConfigurationKey { .. }
            ),
            Self::Io(err) => io_transient(err.kind()),
            Self::Fs(blobsync_fs::Error::Io { source, .. }) => io_transient(source.kind()),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precondition_is_not_transient() {
        let err = Error::precondition("docs/readme.txt", "changed on target");
        assert!(!err.is_transient());
        assert!(err.to_string().contains("docs/readme.txt"));
    }

    #[test]
    fn timeouts_are_transient() {
        let err = Error::Io(std::io::Error::new(std::io::ErrorKind::TimedOut, "slow"));
        assert!(err.is_transient());
    }

    #[test]
    fn generic_store_errors_are_transient() {
        let err = Error::Store(object_store::Error::Generic {
            store: "test",
            source: "connection reset".into(),
        });
        assert!(err.is_transient());
    }

    #[test]
    fn missing_objects_are_not_transient() {
        let err = Error::Store(object_store::Error::NotFound {
            path: "a".into(),
            source: "gone".into(),
        });
        assert!(!err.is_transient());
    }
}
