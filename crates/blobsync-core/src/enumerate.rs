//! Change enumeration
//!
//! Compares a replica's current snapshot against its knowledge vector and
//! lazily yields one [`ChangeRecord`] per item that was created, updated or
//! deleted since the last commit.

use std::collections::btree_map;

use blobsync_fs::ItemPath;

use crate::filter::ScopeFilter;
use crate::knowledge::{ItemKnowledge, KnowledgeVector};
use crate::model::{ChangeKind, ChangeRecord, ItemState, Side, Snapshot};

/// Lazy, single-use iterator over one replica's changes.
///
/// Present items are visited first (creates and updates), then knowledge
/// entries missing from the snapshot (deletes). Both phases run in path
/// order.
pub struct Changes<'a> {
    side: Side,
    tick: u64,
    filter: &'a ScopeFilter,
    snapshot: &'a Snapshot,
    knowledge: &'a KnowledgeVector,
    present: btree_map::Values<'a, ItemPath, ItemState>,
    known: btree_map::Iter<'a, ItemPath, ItemKnowledge>,
}

/// Enumerate changes of `snapshot` relative to `since`.
pub fn enumerate<'a>(
    side: Side,
    snapshot: &'a Snapshot,
    since: &'a KnowledgeVector,
    filter: &'a ScopeFilter,
) -> Changes<'a> {
    Changes {
        side,
        tick: since.tick() + 1,
        filter,
        snapshot,
        knowledge: since,
        present: snapshot.values(),
        known: since.items(),
    }
}

impl Changes<'_> {
    fn next_present(&mut self) -> Option<ChangeRecord> {
        for state in self.present.by_ref() {
            if !self.filter.admits(&state.path, state.kind.is_directory()) {
                continue;
            }

            let change = match self.knowledge.get(&state.path) {
                None => ChangeKind::Created,
                Some(known) if known.kind != state.kind || known.fingerprint != state.fingerprint => {
                    ChangeKind::Updated
                }
                Some(_) => continue,
            };

            return Some(ChangeRecord {
                path: state.path.clone(),
                change,
                kind: state.kind,
                fingerprint: state.fingerprint.clone(),
                modified: state.modified,
                source: self.side,
                tick: self.tick,
            });
        }
        None
    }

    fn next_deleted(&mut self) -> Option<ChangeRecord> {
        for (path, known) in self.known.by_ref() {
            if self.snapshot.contains_key(path) {
                continue;
            }
            // Items that merely left scope are not deleted
            if !self.filter.admits(path, known.kind.is_directory()) {
                continue;
            }

            return Some(ChangeRecord {
                path: path.clone(),
                change: ChangeKind::Deleted,
                kind: known.kind,
                fingerprint: known.fingerprint.clone(),
                modified: None,
                source: self.side,
                tick: self.tick,
            });
        }
        None
    }
}

impl Iterator for Changes<'_> {
    type Item = ChangeRecord;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_present().or_else(|| self.next_deleted())
    }
}
