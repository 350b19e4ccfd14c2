//! SyncOrchestrator implementation
//!
//! One pass enumerates both replicas against their knowledge, merges the
//! two change sets, applies the result and commits what succeeded.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::apply::{self, Applied};
use super::plan::{self, Action, Plan};
use super::report::{ItemError, PassResult, PassState};
use crate::conflict::{ConflictResolver, TieBreak};
use crate::enumerate::enumerate;
use crate::filter::ScopeFilter;
use crate::knowledge::{KnowledgeStore, KnowledgeUpdate, KnowledgeVector};
use crate::model::{Side, Snapshot, snapshot_from};
use crate::replica::Replica;
use crate::scheduler::PassRunner;
use crate::{Error, Result, blocking};

/// Tuning for sync passes.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Maximum concurrent file transfers
    pub max_workers: usize,
    /// Winner of conflicts with equal timestamps
    pub tie_break: TieBreak,
    /// How long one item's transient failures are retried within a pass
    pub retry_window: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            max_workers: 4,
            tie_break: TieBreak::default(),
            retry_window: Duration::from_secs(30),
        }
    }
}

/// Drives a local and a remote replica to convergence.
///
/// Passes are serialized: a second [`run_once`](Self::run_once) waits for
/// the one in flight.
pub struct SyncOrchestrator {
    local: Arc<dyn Replica>,
    remote: Arc<dyn Replica>,
    filter: ScopeFilter,
    knowledge: Arc<KnowledgeStore>,
    resolver: ConflictResolver,
    options: SyncOptions,
    pass_lock: tokio::sync::Mutex<()>,
    state: Mutex<PassState>,
}

#[derive(Default)]
struct Outcome {
    local_updates: Vec<KnowledgeUpdate>,
    remote_updates: Vec<KnowledgeUpdate>,
    uploaded: usize,
    downloaded: usize,
    errors: Vec<ItemError>,
}

impl Outcome {
    fn record(&mut self, action: &Action, result: Result<Applied>) {
        let operation = action.operation();
        match result {
            Ok(applied) => {
                tracing::debug!(path = %action.path(), %operation, target = %action.target, "applied");
                match action.target {
                    Side::Remote => {
                        self.uploaded += 1;
                        self.local_updates.push(applied.source);
                        self.remote_updates.push(applied.target);
                    }
                    Side::Local => {
                        self.downloaded += 1;
                        self.remote_updates.push(applied.source);
                        self.local_updates.push(applied.target);
                    }
                }
            }
            Err(e) => {
                tracing::warn!(
                    path = %action.path(),
                    %operation,
                    target = %action.target,
                    error = %e,
                    "item failed, it will be retried next pass"
                );
                self.errors.push(ItemError {
                    path: action.path().clone(),
                    target: action.target,
                    operation,
                    message: e.to_string(),
                });
            }
        }
    }
}

impl SyncOrchestrator {
    /// Create an orchestrator over `local` and `remote`.
    pub fn new(
        local: Arc<dyn Replica>,
        remote: Arc<dyn Replica>,
        knowledge: Arc<KnowledgeStore>,
        filter: ScopeFilter,
        options: SyncOptions,
    ) -> Self {
        debug_assert_eq!(local.side(), Side::Local);
        debug_assert_eq!(remote.side(), Side::Remote);

        Self {
            local,
            remote,
            filter,
            knowledge,
            resolver: ConflictResolver::new(options.tie_break),
            options,
            pass_lock: tokio::sync::Mutex::new(()),
            state: Mutex::new(PassState::Idle),
        }
    }

    /// Current pass state.
    pub fn state(&self) -> PassState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    fn transition(&self, next: PassState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        tracing::trace!(from = %*state, to = %next, "pass state");
        *state = next;
    }

    /// Run one complete pass.
    ///
    /// Item failures are reported in the result and do not fail the pass.
    /// Scan, knowledge and commit failures abort it without committing.
    pub async fn run_once(&self) -> Result<PassResult> {
        let _pass = self.pass_lock.lock().await;

        self.transition(PassState::Enumerating);
        match self.execute_pass().await {
            Ok(result) => {
                self.transition(PassState::Idle);
                tracing::info!(
                    uploaded = result.uploaded,
                    downloaded = result.downloaded,
                    conflicts = result.conflicts.len(),
                    errors = result.errors.len(),
                    local_tick = result.local_tick,
                    remote_tick = result.remote_tick,
                    "sync pass complete"
                );
                Ok(result)
            }
            Err(e) => {
                self.transition(PassState::Failed);
                tracing::error!(error = %e, "sync pass failed");
                Err(e)
            }
        }
    }

    async fn execute_pass(&self) -> Result<PassResult> {
        let (local_known, remote_known) = self.load_knowledge().await?;

        let (local_snapshot, remote_snapshot) = tokio::try_join!(
            scan(self.local.as_ref(), &self.filter),
            scan(self.remote.as_ref(), &self.filter),
        )?;

        self.transition(PassState::Merging);
        let plan = plan::merge(
            enumerate(Side::Local, &local_snapshot, &local_known, &self.filter),
            enumerate(Side::Remote, &remote_snapshot, &remote_known, &self.filter),
            &local_snapshot,
            &remote_snapshot,
            &self.resolver,
        );
        tracing::debug!(
            actions = plan.action_count(),
            converged = plan.converged.len(),
            conflicts = plan.conflicts.len(),
            "pass planned"
        );

        self.transition(PassState::Applying);
        let Plan {
            directory_creates,
            transfers,
            directory_removals,
            converged,
            conflicts,
        } = plan;
        let mut outcome = Outcome::default();

        for action in &directory_creates {
            let result = self.apply_in_place(action).await;
            outcome.record(action, result);
        }
        self.apply_concurrently(transfers, &mut outcome).await;
        for action in &directory_removals {
            let result = self.apply_in_place(action).await;
            outcome.record(action, result);
        }

        self.transition(PassState::Committing);
        let converged_count = converged.len();
        for item in converged {
            outcome.local_updates.push(item.local);
            outcome.remote_updates.push(item.remote);
        }

        let store = Arc::clone(&self.knowledge);
        let Outcome {
            local_updates,
            remote_updates,
            uploaded,
            downloaded,
            errors,
        } = outcome;
        let (local_known, remote_known) = blocking(move || {
            let mut committed = store
                .commit_all(&[
                    (&local_known, &local_updates[..]),
                    (&remote_known, &remote_updates[..]),
                ])?
                .into_iter();
            match (committed.next(), committed.next()) {
                (Some(local), Some(remote)) => Ok((local, remote)),
                _ => Err(Error::Knowledge {
                    message: "commit returned fewer vectors than requested".into(),
                }),
            }
        })
        .await?;

        Ok(PassResult {
            uploaded,
            downloaded,
            converged: converged_count,
            committed: uploaded + downloaded + converged_count,
            conflicts,
            errors,
            local_tick: local_known.tick(),
            remote_tick: remote_known.tick(),
        })
    }

    async fn load_knowledge(&self) -> Result<(KnowledgeVector, KnowledgeVector)> {
        let store = Arc::clone(&self.knowledge);
        let local_endpoint = self.local.endpoint();
        let remote_endpoint = self.remote.endpoint();

        blocking(move || {
            let local = store.resolve_replica(Side::Local, &local_endpoint)?;
            let remote = store.resolve_replica(Side::Remote, &remote_endpoint)?;
            Ok((store.load(local)?, store.load(remote)?))
        })
        .await
    }

    fn replicas_for(&self, target: Side) -> (Arc<dyn Replica>, Arc<dyn Replica>) {
        match target {
            Side::Remote => (Arc::clone(&self.local), Arc::clone(&self.remote)),
            Side::Local => (Arc::clone(&self.remote), Arc::clone(&self.local)),
        }
    }

    async fn apply_in_place(&self, action: &Action) -> Result<Applied> {
        let (source, target) = self.replicas_for(action.target);
        apply::apply_with_retry(
            source.as_ref(),
            target.as_ref(),
            action,
            self.options.retry_window,
        )
        .await
    }

    async fn apply_concurrently(&self, actions: Vec<Action>, outcome: &mut Outcome) {
        let permits = Arc::new(Semaphore::new(self.options.max_workers.max(1)));
        let mut tasks = JoinSet::new();

        for action in actions {
            let (source, target) = self.replicas_for(action.target);
            let permits = Arc::clone(&permits);
            let window = self.options.retry_window;

            tasks.spawn(async move {
                let result = match permits.acquire_owned().await {
                    Ok(_permit) => {
                        apply::apply_with_retry(source.as_ref(), target.as_ref(), &action, window)
                            .await
                    }
                    Err(e) => Err(Error::Task {
                        message: e.to_string(),
                    }),
                };
                (action, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((action, result)) => outcome.record(&action, result),
                // The item stays uncommitted and is picked up again next pass
                Err(e) => tracing::error!(error = %e, "transfer task did not complete"),
            }
        }
    }
}

#[async_trait]
impl PassRunner for SyncOrchestrator {
    async fn run_pass(&self) -> Result<PassResult> {
        self.run_once().await
    }
}

async fn scan(replica: &dyn Replica, filter: &ScopeFilter) -> Result<Snapshot> {
    replica
        .scan(filter)
        .await
        .map(snapshot_from)
        .map_err(|e| Error::ReplicaUnavailable {
            side: replica.side(),
            message: e.to_string(),
        })
}
