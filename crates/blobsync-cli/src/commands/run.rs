//! Run command implementation

use std::path::{Path, PathBuf};

use blobsync_core::{
    Interval, PassResult, Scheduler, SchedulerHandle, SyncConfig, build_orchestrator,
};
use colored::Colorize;

use super::load_config;
use crate::error::{CliError, Result};

/// Check the environment, then synchronize until shut down.
///
/// With `once` a single pass runs and its outcome decides the exit status.
pub fn run_sync(path: &Path, once: bool) -> Result<()> {
    let config = load_config(path)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        if once {
            run_single(&config).await
        } else {
            run_scheduled(path, &config).await
        }
    })
}

async fn run_single(config: &SyncConfig) -> Result<()> {
    let orchestrator = build_orchestrator(config).await?;
    let result = orchestrator.run_once().await?;
    print_result(&result);

    if result.is_clean() {
        Ok(())
    } else {
        Err(CliError::user(format!(
            "{} item(s) could not be synchronized; they will be retried next run",
            result.errors.len()
        )))
    }
}

async fn run_scheduled(path: &Path, config: &SyncConfig) -> Result<()> {
    let interval = config.interval()?;
    let orchestrator = build_orchestrator(config).await?;

    let (scheduler, handle) = Scheduler::new(interval);
    let signals = tokio::spawn(watch_signals(handle, path.to_path_buf()));

    let summary = scheduler.run(&orchestrator).await;
    signals.abort();

    println!(
        "{} {} pass(es), {} failed",
        "stopped:".green(),
        summary.passes,
        summary.failed
    );
    if interval == Interval::Once && summary.failed > 0 {
        return Err(CliError::user("sync pass failed"));
    }
    Ok(())
}

fn print_result(result: &PassResult) {
    println!(
        "{} {} uploaded, {} downloaded, {} converged",
        "synced:".green().bold(),
        result.uploaded,
        result.downloaded,
        result.converged
    );
    for conflict in &result.conflicts {
        println!(
            "  {} {} kept {} {} ({})",
            "conflict".yellow(),
            conflict.path,
            conflict.winner,
            conflict.winning_change,
            conflict.reason
        );
    }
    for error in &result.errors {
        println!(
            "  {} {} on {} {}: {}",
            "failed".red(),
            error.operation,
            error.target,
            error.path,
            error.message
        );
    }
}

/// Re-read the interval after SIGHUP; a broken file keeps the old one.
#[cfg(unix)]
fn reload(handle: &SchedulerHandle, path: &Path) {
    match SyncConfig::load(path) {
        Ok(config) => {
            tracing::info!(config = %path.display(), "configuration reloaded");
            handle.reconfigure(config.schedule.interval_seconds.raw());
        }
        Err(e) => tracing::warn!(
            config = %path.display(),
            error = %e,
            "could not reload configuration, keeping current interval"
        ),
    }
}

#[cfg(unix)]
async fn watch_signals(handle: SchedulerHandle, path: PathBuf) {
    use tokio::signal::unix::{SignalKind, signal};

    let (mut terminate, mut hangup) =
        match (signal(SignalKind::terminate()), signal(SignalKind::hangup())) {
            (Ok(terminate), Ok(hangup)) => (terminate, hangup),
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!(error = %e, "signal handlers unavailable, only Ctrl-C stops the run");
                if tokio::signal::ctrl_c().await.is_ok() {
                    handle.shutdown();
                }
                return;
            }
        };

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupt received, stopping after the current pass");
                handle.shutdown();
                break;
            }
            _ = terminate.recv() => {
                tracing::info!("SIGTERM received, stopping after the current pass");
                handle.shutdown();
                break;
            }
            _ = hangup.recv() => reload(&handle, &path),
        }
    }
}

#[cfg(not(unix))]
async fn watch_signals(handle: SchedulerHandle, _path: PathBuf) {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("interrupt received, stopping after the current pass");
        handle.shutdown();
    }
}
