//! Applying a single planned action

use std::time::Duration;

use backoff::ExponentialBackoffBuilder;

use super::plan::Action;
use super::report::Operation;
use crate::Result;
use crate::knowledge::KnowledgeUpdate;
use crate::replica::Replica;

/// Knowledge to commit on each replica after an action succeeded.
#[derive(Debug, Clone)]
pub(crate) struct Applied {
    pub source: KnowledgeUpdate,
    pub target: KnowledgeUpdate,
}

/// Apply `action`, retrying transient failures for up to `window`.
pub(crate) async fn apply_with_retry(
    source: &dyn Replica,
    target: &dyn Replica,
    action: &Action,
    window: Duration,
) -> Result<Applied> {
    let policy = ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_millis(200))
        .with_max_interval(Duration::from_secs(5))
        .with_max_elapsed_time(Some(window))
        .build();

    backoff::future::retry(policy, || async move {
        apply(source, target, action).await.map_err(|e| {
            if e.is_transient() {
                tracing::debug!(path = %action.path(), error = %e, "transient failure, retrying");
                backoff::Error::transient(e)
            } else {
                backoff::Error::permanent(e)
            }
        })
    })
    .await
}

async fn apply(source: &dyn Replica, target: &dyn Replica, action: &Action) -> Result<Applied> {
    let record = &action.record;
    let path = &record.path;
    let source_update = record
        .state()
        .map(KnowledgeUpdate::Record)
        .unwrap_or_else(|| KnowledgeUpdate::Forget(path.clone()));

    let target_update = match action.operation() {
        Operation::WriteFile => {
            let content = source.read(path, &record.fingerprint).await?;
            let expected = match &action.observed {
                Some(existing) if existing.kind.is_directory() => {
                    target.remove_dir(path).await?;
                    None
                }
                Some(existing) => Some(&existing.fingerprint),
                None => None,
            };
            KnowledgeUpdate::Record(target.write(path, content, expected).await?)
        }
        Operation::CreateDirectory => {
            if let Some(existing) = &action.observed
                && !existing.kind.is_directory()
            {
                target.remove(path, Some(&existing.fingerprint)).await?;
            }
            KnowledgeUpdate::Record(target.create_dir(path).await?)
        }
        Operation::RemoveFile => {
            // Nothing was observed, so anything there now is newer than the delete
            if let Some(existing) = &action.observed {
                target.remove(path, Some(&existing.fingerprint)).await?;
            }
            KnowledgeUpdate::Forget(path.clone())
        }
        Operation::RemoveDirectory => {
            target.remove_dir(path).await?;
            KnowledgeUpdate::Forget(path.clone())
        }
    };

    Ok(Applied {
        source: source_update,
        target: target_update,
    })
}
