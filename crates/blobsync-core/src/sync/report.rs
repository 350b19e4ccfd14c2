//! Pass outcome types
//!
//! A pass never aborts because of a single item. Per-item failures and
//! discarded conflict losers are collected here instead.

use std::fmt;

use blobsync_fs::ItemPath;
use serde::{Deserialize, Serialize};

use crate::conflict::{Resolution, ResolutionReason};
use crate::model::{ChangeKind, Side};

/// Where the orchestrator is within a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PassState {
    /// No pass in flight
    Idle,
    /// Scanning replicas and loading knowledge
    Enumerating,
    /// Pairing changes and resolving conflicts
    Merging,
    /// Transferring items
    Applying,
    /// Persisting knowledge
    Committing,
    /// The last pass aborted before committing
    Failed,
}

impl fmt::Display for PassState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Enumerating => "enumerating",
            Self::Merging => "merging",
            Self::Applying => "applying",
            Self::Committing => "committing",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// What applying a change does to the target replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    WriteFile,
    RemoveFile,
    CreateDirectory,
    RemoveDirectory,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::WriteFile => "write file",
            Self::RemoveFile => "remove file",
            Self::CreateDirectory => "create directory",
            Self::RemoveDirectory => "remove directory",
        };
        f.write_str(s)
    }
}

/// A conflict whose loser was discarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictReport {
    pub path: ItemPath,
    pub winner: Side,
    pub winning_change: ChangeKind,
    pub losing_change: ChangeKind,
    pub reason: ResolutionReason,
}

impl From<&Resolution> for ConflictReport {
    fn from(resolution: &Resolution) -> Self {
        Self {
            path: resolution.winner.path.clone(),
            winner: resolution.winner.source,
            winning_change: resolution.winner.change,
            losing_change: resolution.loser.change,
            reason: resolution.reason,
        }
    }
}

/// An item that could not be applied; it stays uncommitted and is retried
/// by the next pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemError {
    pub path: ItemPath,
    /// Replica the operation was applied to
    pub target: Side,
    pub operation: Operation,
    pub message: String,
}

/// Summary of one synchronization pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassResult {
    /// Items applied to the remote replica
    pub uploaded: usize,
    /// Items applied to the local replica
    pub downloaded: usize,
    /// Items changed identically on both sides, committed without transfer
    pub converged: usize,
    /// Items whose knowledge was committed this pass
    pub committed: usize,
    pub conflicts: Vec<ConflictReport>,
    pub errors: Vec<ItemError>,
    /// Knowledge ticks after the pass
    pub local_tick: u64,
    pub remote_tick: u64,
}

impl PassResult {
    pub fn transfers(&self) -> usize {
        self.uploaded + self.downloaded
    }

    /// True when every observed change was applied.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}
