//! Knowledge tracking
//!
//! A replica's knowledge vector records every item it has committed,
//! together with the tick of the commit that recorded it. Comparing a fresh
//! scan against the vector yields the replica's changes since the last
//! successful pass.

mod store;

pub use store::{KnowledgeStore, ReplicaRecord, ReplicaRegistry};

use std::collections::{BTreeMap, btree_map};
use std::fmt;

use blobsync_fs::ItemPath;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{Fingerprint, ItemKind, ItemState};

/// Stable identifier of one replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReplicaId(Uuid);

impl ReplicaId {
    /// Mint a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ReplicaId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for ReplicaId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a replica knows about one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemKnowledge {
    /// Tick of the commit that recorded this entry
    pub tick: u64,
    pub kind: ItemKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
    pub fingerprint: Fingerprint,
}

/// One applied outcome to fold into a knowledge vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KnowledgeUpdate {
    /// The item exists on the replica in this state
    Record(ItemState),
    /// The item no longer exists on the replica
    Forget(ItemPath),
}

impl KnowledgeUpdate {
    pub fn path(&self) -> &ItemPath {
        match self {
            Self::Record(state) => &state.path,
            Self::Forget(path) => path,
        }
    }
}

/// Per-replica knowledge: the committed state of every tracked item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeVector {
    /// Format version for forward compatibility
    version: String,
    replica_id: ReplicaId,
    tick: u64,
    #[serde(default)]
    items: BTreeMap<ItemPath, ItemKnowledge>,
}

impl KnowledgeVector {
    /// Empty knowledge at tick zero.
    pub fn new(replica_id: ReplicaId) -> Self {
        Self {
            version: "1.0".to_string(),
            replica_id,
            tick: 0,
            items: BTreeMap::new(),
        }
    }

    pub fn replica_id(&self) -> ReplicaId {
        self.replica_id
    }

    /// Tick of the latest commit; never decreases.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn get(&self, path: &ItemPath) -> Option<&ItemKnowledge> {
        self.items.get(path)
    }

    /// Tracked items in path order.
    pub fn items(&self) -> btree_map::Iter<'_, ItemPath, ItemKnowledge> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Fold `updates` into the vector as one commit.
    ///
    /// Every recorded entry is stamped with the new tick. An empty update
    /// set leaves the vector untouched, tick included.
    pub fn apply(&mut self, updates: &[KnowledgeUpdate]) {
        if updates.is_empty() {
            return;
        }

        self.tick += 1;
        for update in updates {
            match update {
                KnowledgeUpdate::Record(state) => {
                    self.items.insert(
                        state.path.clone(),
                        ItemKnowledge {
                            tick: self.tick,
                            kind: state.kind,
                            modified: state.modified,
                            fingerprint: state.fingerprint.clone(),
                        },
                    );
                }
                KnowledgeUpdate::Forget(path) => {
                    self.items.remove(path);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(path: &str, tag: &str) -> ItemState {
        ItemState::file(ItemPath::new(path).unwrap(), Fingerprint::new(1, tag), None)
    }

    #[test]
    fn new_vector_is_empty_at_tick_zero() {
        let vector = KnowledgeVector::new(ReplicaId::new());
        assert_eq!(vector.tick(), 0);
        assert!(vector.is_empty());
        assert_eq!(vector.version, "1.0");
    }

    #[test]
    fn apply_stamps_entries_with_next_tick() {
        let mut vector = KnowledgeVector::new(ReplicaId::new());
        vector.apply(&[KnowledgeUpdate::Record(file("a.txt", "t1"))]);
        vector.apply(&[KnowledgeUpdate::Record(file("b.txt", "t2"))]);

        let a = ItemPath::new("a.txt").unwrap();
        let b = ItemPath::new("b.txt").unwrap();
        assert_eq!(vector.tick(), 2);
        assert_eq!(vector.get(&a).unwrap().tick, 1);
        assert_eq!(vector.get(&b).unwrap().tick, 2);
    }

    #[test]
    fn empty_apply_keeps_tick() {
        let mut vector = KnowledgeVector::new(ReplicaId::new());
        vector.apply(&[]);
        assert_eq!(vector.tick(), 0);
    }

    #[test]
    fn forget_removes_entry() {
        let mut vector = KnowledgeVector::new(ReplicaId::new());
        let state = file("a.txt", "t1");
        vector.apply(&[KnowledgeUpdate::Record(state.clone())]);
        vector.apply(&[KnowledgeUpdate::Forget(state.path.clone())]);
        assert!(vector.get(&state.path).is_none());
        assert_eq!(vector.tick(), 2);
    }

    #[test]
    fn vector_serializes_to_toml() {
        let mut vector = KnowledgeVector::new(ReplicaId::new());
        vector.apply(&[KnowledgeUpdate::Record(file("docs/readme.txt", "sha256:00"))]);

        let text = toml::to_string_pretty(&vector).unwrap();
        assert!(text.contains("version = \"1.0\""));
        assert!(text.contains("docs/readme.txt"));

        let parsed: KnowledgeVector = toml::from_str(&text).unwrap();
        assert_eq!(parsed, vector);
    }
}
