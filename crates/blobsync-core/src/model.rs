//! Core data model shared by enumeration, conflict resolution and apply
//!
//! An item is identified by its [`ItemPath`] relative to the replica root.
//! Each replica reports its items as [`ItemState`]s; comparing a snapshot
//! against the replica's knowledge produces [`ChangeRecord`]s.

use std::collections::BTreeMap;
use std::fmt;

use blobsync_fs::ItemPath;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which side of the pair a replica is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Local,
    Remote,
}

impl Side {
    /// The other side of the pair.
    pub fn opposite(self) -> Self {
        match self {
            Self::Local => Self::Remote,
            Self::Remote => Self::Local,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether an item is a file or a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    File,
    Directory,
}

impl ItemKind {
    pub fn is_directory(self) -> bool {
        self == Self::Directory
    }
}

/// Cheap content identity of an item on one replica.
///
/// The tag is replica specific: a content hash locally, the entity tag
/// remotely. Fingerprints are only ever compared within one replica.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint {
    pub size: u64,
    pub tag: String,
}

impl Fingerprint {
    /// Tag shared by every directory.
    pub const DIRECTORY_TAG: &'static str = "directory";

    pub fn new(size: u64, tag: impl Into<String>) -> Self {
        Self {
            size,
            tag: tag.into(),
        }
    }

    /// Fingerprint carried by directories; they have no content.
    pub fn directory() -> Self {
        Self::new(0, Self::DIRECTORY_TAG)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} bytes)", self.tag, self.size)
    }
}

/// An item as observed on a replica during a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemState {
    pub path: ItemPath,
    pub kind: ItemKind,
    pub fingerprint: Fingerprint,
    pub modified: Option<DateTime<Utc>>,
}

impl ItemState {
    pub fn file(path: ItemPath, fingerprint: Fingerprint, modified: Option<DateTime<Utc>>) -> Self {
        Self {
            path,
            kind: ItemKind::File,
            fingerprint,
            modified,
        }
    }

    pub fn directory(path: ItemPath, modified: Option<DateTime<Utc>>) -> Self {
        Self {
            path,
            kind: ItemKind::Directory,
            fingerprint: Fingerprint::directory(),
            modified,
        }
    }
}

/// All in-scope items of one replica, keyed by path.
pub type Snapshot = BTreeMap<ItemPath, ItemState>;

/// Build a [`Snapshot`] from scanned states.
pub fn snapshot_from(states: impl IntoIterator<Item = ItemState>) -> Snapshot {
    states.into_iter().map(|s| (s.path.clone(), s)).collect()
}

/// What happened to an item since the replica's knowledge was committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        };
        f.write_str(s)
    }
}

/// One observed change on one replica.
///
/// For deletions `fingerprint` and `kind` are the last known values and
/// `modified` is `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRecord {
    pub path: ItemPath,
    pub change: ChangeKind,
    pub kind: ItemKind,
    pub fingerprint: Fingerprint,
    pub modified: Option<DateTime<Utc>>,
    pub source: Side,
    /// Tick the change would be committed at on its source replica
    pub tick: u64,
}

impl ChangeRecord {
    pub fn is_delete(&self) -> bool {
        self.change == ChangeKind::Deleted
    }

    /// The observed state behind a non-delete change.
    pub fn state(&self) -> Option<ItemState> {
        (!self.is_delete()).then(|| ItemState {
            path: self.path.clone(),
            kind: self.kind,
            fingerprint: self.fingerprint.clone(),
            modified: self.modified,
        })
    }
}
