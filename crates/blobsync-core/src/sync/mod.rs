//! Synchronization passes
//!
//! This module provides:
//! - **orchestrator**: run one pass over a local and a remote replica
//! - **plan**: pair both sides' changes and order the resulting actions
//! - **apply**: carry one change over to the opposite replica
//! - **report**: pass results, conflicts and per-item errors

mod apply;
mod orchestrator;
mod plan;
mod report;

pub use orchestrator::{SyncOptions, SyncOrchestrator};
pub use report::{ConflictReport, ItemError, Operation, PassResult, PassState};
