//! Bidirectional replication engine for blobsync
//!
//! Keeps a local directory tree and an object-store container in step using
//! per-replica knowledge vectors: each side remembers what it has already
//! seen, so a pass only carries over what changed since the last one.
//!
//! # Architecture
//!
//! ```text
//!                  Scheduler
//!                      |
//!               SyncOrchestrator
//!                      |
//!     +----------+-----+------+-----------+
//!     |          |            |           |
//! enumerate  conflict   KnowledgeStore  Replica
//!                                     (local | object store)
//!                      |
//!                 blobsync-fs
//! ```
//!
//! # Example
//!
//! ```ignore
//! use blobsync_core::{Scheduler, SyncConfig};
//!
//! async fn example(config: SyncConfig) -> blobsync_core::Result<()> {
//!     let orchestrator = blobsync_core::build_orchestrator(&config).await?;
//!     let (scheduler, _handle) = Scheduler::new(config.interval()?);
//!     scheduler.run(&orchestrator).await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod conflict;
pub mod enumerate;
pub mod error;
pub mod filter;
pub mod knowledge;
pub mod model;
pub mod replica;
pub mod scheduler;
pub mod sync;

use std::sync::Arc;

pub use config::{Backend, SyncConfig};
pub use conflict::{ConflictResolver, Resolution, ResolutionReason, TieBreak};
pub use enumerate::enumerate;
pub use error::{Error, Result};
pub use filter::{ScopeFilter, ScopeFilterSpec};
pub use knowledge::{KnowledgeStore, KnowledgeUpdate, KnowledgeVector, ReplicaId};
pub use model::{ChangeKind, ChangeRecord, Fingerprint, ItemKind, ItemState, Side, Snapshot};
pub use replica::{LocalReplica, ObjectStoreReplica, Replica};
pub use scheduler::{Interval, PassRunner, Scheduler, SchedulerHandle, SchedulerSummary};
pub use sync::{ConflictReport, ItemError, PassResult, PassState, SyncOptions, SyncOrchestrator};

/// Run blocking filesystem work off the async runtime.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Task {
            message: e.to_string(),
        })?
}

/// Wire up both replicas, the knowledge store and the filter described by
/// `config`.
///
/// A missing remote container is created. Fails when the local root is
/// missing, the filter is invalid, or the container cannot be created or
/// listed.
pub async fn build_orchestrator(config: &SyncConfig) -> Result<SyncOrchestrator> {
    config.validate()?;
    let filter = config.scope_filter()?;
    let state_dir = config.state_dir();

    let local = LocalReplica::open(&config.local.path)?.excluding(&state_dir);
    let remote = ObjectStoreReplica::from_config(&config.remote)?;
    remote.ensure_container().await?;
    remote.check_reachable().await?;

    let knowledge = blocking(move || KnowledgeStore::open(state_dir)).await?;
    tracing::debug!(
        local = %local.endpoint(),
        remote = %remote.endpoint(),
        "replicas ready"
    );

    Ok(SyncOrchestrator::new(
        Arc::new(local),
        Arc::new(remote),
        Arc::new(knowledge),
        filter,
        config.sync_options(),
    ))
}
