//! Pairing both replicas' changes into an ordered plan

use std::collections::BTreeMap;

use blobsync_fs::ItemPath;

use super::report::{ConflictReport, Operation};
use crate::conflict::ConflictResolver;
use crate::knowledge::KnowledgeUpdate;
use crate::model::{ChangeRecord, ItemKind, ItemState, Side, Snapshot};

/// One change to carry over to the opposite replica.
#[derive(Debug, Clone)]
pub(crate) struct Action {
    pub record: ChangeRecord,
    pub target: Side,
    /// What the target held at that path when it was scanned
    pub observed: Option<ItemState>,
}

impl Action {
    pub fn path(&self) -> &ItemPath {
        &self.record.path
    }

    pub fn operation(&self) -> Operation {
        match (self.record.is_delete(), self.record.kind) {
            (true, ItemKind::Directory) => Operation::RemoveDirectory,
            (true, ItemKind::File) => Operation::RemoveFile,
            (false, ItemKind::Directory) => Operation::CreateDirectory,
            (false, ItemKind::File) => Operation::WriteFile,
        }
    }
}

/// An item both replicas already agree on.
#[derive(Debug, Clone)]
pub(crate) struct Convergent {
    pub local: KnowledgeUpdate,
    pub remote: KnowledgeUpdate,
}

/// Ordered work for one pass.
#[derive(Debug, Default)]
pub(crate) struct Plan {
    /// Shallowest first, so parents exist before children
    pub directory_creates: Vec<Action>,
    pub transfers: Vec<Action>,
    /// Deepest first, after every file is gone
    pub directory_removals: Vec<Action>,
    pub converged: Vec<Convergent>,
    pub conflicts: Vec<ConflictReport>,
}

impl Plan {
    fn push(&mut self, action: Action) {
        match action.operation() {
            Operation::CreateDirectory => self.directory_creates.push(action),
            Operation::RemoveDirectory => self.directory_removals.push(action),
            Operation::WriteFile | Operation::RemoveFile => self.transfers.push(action),
        }
    }

    pub fn action_count(&self) -> usize {
        self.directory_creates.len() + self.transfers.len() + self.directory_removals.len()
    }
}

/// Pair changes by path and decide what to apply where.
pub(crate) fn merge(
    local: impl IntoIterator<Item = ChangeRecord>,
    remote: impl IntoIterator<Item = ChangeRecord>,
    local_snapshot: &Snapshot,
    remote_snapshot: &Snapshot,
    resolver: &ConflictResolver,
) -> Plan {
    let mut paired: BTreeMap<ItemPath, (Option<ChangeRecord>, Option<ChangeRecord>)> =
        BTreeMap::new();
    for change in local {
        let key = change.path.clone();
        paired.entry(key).or_default().0 = Some(change);
    }
    for change in remote {
        let key = change.path.clone();
        paired.entry(key).or_default().1 = Some(change);
    }

    let mut plan = Plan::default();
    for (path, pair) in paired {
        let winner = match pair {
            (Some(local), None) => local,
            (None, Some(remote)) => remote,
            (Some(local), Some(remote)) => {
                if let Some(convergent) = convergent(&local, &remote) {
                    plan.converged.push(convergent);
                    continue;
                }

                let resolution = resolver.resolve(local, remote);
                tracing::warn!(
                    %path,
                    winner = %resolution.winner.source,
                    reason = %resolution.reason,
                    "conflicting changes, discarding {} {}",
                    resolution.loser.source,
                    resolution.loser.change
                );
                plan.conflicts.push(ConflictReport::from(&resolution));
                resolution.winner
            }
            (None, None) => continue,
        };

        let target = winner.source.opposite();
        let observed = match target {
            Side::Local => local_snapshot.get(&path),
            Side::Remote => remote_snapshot.get(&path),
        }
        .cloned();

        plan.push(Action {
            record: winner,
            target,
            observed,
        });
    }

    plan.directory_creates.sort_by_key(|a| a.path().depth());
    plan.directory_removals
        .sort_by_key(|a| std::cmp::Reverse(a.path().depth()));
    plan
}

/// Both sides deleted the item, or both created the same directory.
fn convergent(local: &ChangeRecord, remote: &ChangeRecord) -> Option<Convergent> {
    if local.is_delete() && remote.is_delete() {
        return Some(Convergent {
            local: KnowledgeUpdate::Forget(local.path.clone()),
            remote: KnowledgeUpdate::Forget(remote.path.clone()),
        });
    }

    let both_directories = local.kind.is_directory() && remote.kind.is_directory();
    match (local.state(), remote.state()) {
        (Some(local), Some(remote)) if both_directories => Some(Convergent {
            local: KnowledgeUpdate::Record(local),
            remote: KnowledgeUpdate::Record(remote),
        }),
        _ => None,
    }
}
