//! Conflict resolution
//!
//! When both replicas changed the same item in one pass exactly one change
//! survives. The policy is deterministic: given the same two records the
//! same winner is picked every time.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::{ChangeRecord, Side};

/// Which side wins when timestamps are equal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TieBreak {
    #[default]
    Remote,
    Local,
}

impl TieBreak {
    pub fn side(self) -> Side {
        match self {
            Self::Remote => Side::Remote,
            Self::Local => Side::Local,
        }
    }
}

/// Why the winner won.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionReason {
    /// The delete was committed later than the competing update
    NewerDelete,
    /// The update was not superseded by the delete and brings the item back
    Resurrected,
    /// The winner carries the later modification time
    LaterModification,
    /// Timestamps were equal or both missing
    TieBreak,
}

impl fmt::Display for ResolutionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NewerDelete => "newer delete",
            Self::Resurrected => "update resurrects deleted item",
            Self::LaterModification => "later modification",
            Self::TieBreak => "tie-break",
        };
        f.write_str(s)
    }
}

/// Outcome of resolving one conflict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub winner: ChangeRecord,
    pub loser: ChangeRecord,
    pub reason: ResolutionReason,
}

/// Picks a winner between concurrent changes to the same item.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictResolver {
    tie_break: TieBreak,
}

impl ConflictResolver {
    pub fn new(tie_break: TieBreak) -> Self {
        Self { tie_break }
    }

    pub fn tie_break(&self) -> TieBreak {
        self.tie_break
    }

    /// Resolve concurrent changes from the local and remote replica.
    ///
    /// A delete beats an update only when its tick is strictly greater.
    /// Otherwise the later modification time wins, a missing time counting
    /// as oldest, and equal times go to the tie-break side.
    pub fn resolve(&self, local: ChangeRecord, remote: ChangeRecord) -> Resolution {
        debug_assert_eq!(local.source, Side::Local);
        debug_assert_eq!(remote.source, Side::Remote);
        debug_assert_eq!(local.path, remote.path);

        if local.is_delete() != remote.is_delete() {
            let (delete, update) = if local.is_delete() {
                (local, remote)
            } else {
                (remote, local)
            };
            return if delete.tick > update.tick {
                Resolution {
                    winner: delete,
                    loser: update,
                    reason: ResolutionReason::NewerDelete,
                }
            } else {
                Resolution {
                    winner: update,
                    loser: delete,
                    reason: ResolutionReason::Resurrected,
                }
            };
        }

        // None sorts before Some, so a missing time is the oldest
        let (winner_side, reason) = match local.modified.cmp(&remote.modified) {
            Ordering::Greater => (Side::Local, ResolutionReason::LaterModification),
            Ordering::Less => (Side::Remote, ResolutionReason::LaterModification),
            Ordering::Equal => (self.tie_break.side(), ResolutionReason::TieBreak),
        };

        let (winner, loser) = match winner_side {
            Side::Local => (local, remote),
            Side::Remote => (remote, local),
        };
        Resolution {
            winner,
            loser,
            reason,
        }
    }
}
