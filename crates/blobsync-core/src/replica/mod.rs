//! Replica abstraction
//!
//! A [`Replica`] is one side of a synchronized pair. The engine only talks
//! to replicas through this trait, so a local directory, an object-store
//! container and test doubles are interchangeable.

mod azure;
mod local;
mod remote;

pub use local::LocalReplica;
pub use remote::ObjectStoreReplica;

use async_trait::async_trait;
use blobsync_fs::ItemPath;
use bytes::Bytes;

use crate::{Error, Result};
use crate::filter::ScopeFilter;
use crate::model::{Fingerprint, ItemState, Side};

/// Storage operations the engine needs from one side of the pair.
///
/// Every mutating call carries the fingerprint the caller last observed.
/// When the item no longer matches it, the call fails with
/// [`Error::Precondition`](crate::Error::Precondition) and leaves the item
/// untouched.
#[async_trait]
pub trait Replica: Send + Sync {
    /// Which side of the pair this replica is.
    fn side(&self) -> Side;

    /// Canonical location this replica serves; replica identity is bound to it.
    fn endpoint(&self) -> String;

    /// List every in-scope item.
    ///
    /// Items rejected by `filter` must not be returned, and directories
    /// rejected by it are not descended into.
    async fn scan(&self, filter: &ScopeFilter) -> Result<Vec<ItemState>>;

    /// Read the full content of a file, verifying it still matches `expected`.
    async fn read(&self, path: &ItemPath, expected: &Fingerprint) -> Result<Bytes>;

    /// Write a file.
    ///
    /// `expected` is the fingerprint of the file being replaced; `None`
    /// means the file must not exist yet. Returns the new state.
    async fn write(
        &self,
        path: &ItemPath,
        content: Bytes,
        expected: Option<&Fingerprint>,
    ) -> Result<ItemState>;

    /// Remove a file; an already absent file is not an error.
    async fn remove(&self, path: &ItemPath, expected: Option<&Fingerprint>) -> Result<()>;

    /// Create a directory and any missing parents.
    async fn create_dir(&self, path: &ItemPath) -> Result<ItemState>;

    /// Remove an empty directory; an already absent directory is not an error.
    async fn remove_dir(&self, path: &ItemPath) -> Result<()>;
}

/// Compare the caller's expectation against what currently sits at `path`.
pub fn check_precondition(
    path: &ItemPath,
    expected: Option<&Fingerprint>,
    current: Option<&Fingerprint>,
) -> Result<()> {
    match (expected, current) {
        (None, None) => Ok(()),
        (Some(expected), Some(current)) if expected == current => Ok(()),
        (None, Some(_)) => Err(Error::precondition(path, "target appeared since it was scanned")),
        (Some(_), None) => Err(Error::precondition(path, "target vanished since it was scanned")),
        (Some(_), Some(_)) => Err(Error::precondition(path, "target changed since it was scanned")),
    }
}
