//! Periodic pass scheduling
//!
//! The [`Scheduler`] owns the control channel. Callers steer it through a
//! cloneable [`SchedulerHandle`]; messages that arrive while a pass is in
//! flight are handled after the pass has committed.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};

use crate::sync::PassResult;
use crate::{Error, Result};

/// How often passes run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interval {
    /// Run a single pass and stop
    Once,
    /// Run nothing until told otherwise
    Paused,
    /// Run a pass, then wait this long
    Every(Duration),
}

impl Interval {
    /// Interpret a configured number of seconds.
    ///
    /// `-1` is [`Once`](Self::Once), any other value at or below zero is
    /// [`Paused`](Self::Paused).
    pub fn from_seconds(seconds: i64) -> Self {
        match seconds {
            -1 => Self::Once,
            s if s <= 0 => Self::Paused,
            s => Self::Every(Duration::from_secs(s.unsigned_abs())),
        }
    }

    /// Parse a textual number of seconds.
    pub fn parse(raw: &str) -> Result<Self> {
        raw.trim()
            .parse::<i64>()
            .map(Self::from_seconds)
            .map_err(|_| Error::InvalidInterval {
                value: raw.to_string(),
            })
    }

    pub fn is_paused(&self) -> bool {
        matches!(self, Self::Paused)
    }
}

impl FromStr for Interval {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Once => f.write_str("once"),
            Self::Paused => f.write_str("paused"),
            Self::Every(period) => write!(f, "every {}s", period.as_secs()),
        }
    }
}

/// Something that can run a synchronization pass.
#[async_trait]
pub trait PassRunner: Send + Sync {
    async fn run_pass(&self) -> Result<PassResult>;
}

/// Messages accepted by a running scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Control {
    SetInterval(Interval),
    /// Raw interval text, typically from a reloaded configuration file
    Reconfigure(String),
    /// Run a pass now
    Wake,
    Shutdown,
}

/// Sends [`Control`] messages to a [`Scheduler`].
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    tx: mpsc::UnboundedSender<Control>,
}

impl SchedulerHandle {
    pub fn set_interval(&self, interval: Interval) {
        self.send(Control::SetInterval(interval));
    }

    /// Apply an interval given as text. Unparsable values are logged by the
    /// scheduler and the current interval stays in effect.
    pub fn reconfigure(&self, raw: impl Into<String>) {
        self.send(Control::Reconfigure(raw.into()));
    }

    pub fn wake(&self) {
        self.send(Control::Wake);
    }

    /// Stop after the pass in flight, if any, has finished.
    pub fn shutdown(&self) {
        self.send(Control::Shutdown);
    }

    fn send(&self, message: Control) {
        if self.tx.send(message).is_err() {
            tracing::debug!("scheduler already stopped");
        }
    }
}

/// Pass counts over a scheduler's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerSummary {
    pub passes: usize,
    pub failed: usize,
}

enum Next {
    Pass,
    Stop,
}

/// Runs passes according to an [`Interval`] until shut down.
pub struct Scheduler {
    interval: Interval,
    rx: mpsc::UnboundedReceiver<Control>,
    handles_dropped: bool,
}

impl Scheduler {
    pub fn new(interval: Interval) -> (Self, SchedulerHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            interval,
            rx,
            handles_dropped: false,
        };
        (scheduler, SchedulerHandle { tx })
    }

    pub fn interval(&self) -> Interval {
        self.interval
    }

    /// Drive `runner` until shutdown, a completed [`Interval::Once`] pass, or
    /// every handle being dropped while no timer is armed.
    pub async fn run<R>(mut self, runner: &R) -> SchedulerSummary
    where
        R: PassRunner + ?Sized,
    {
        let mut summary = SchedulerSummary::default();
        let mut pass_due = !self.interval.is_paused();
        tracing::info!(interval = %self.interval, "scheduler started");

        loop {
            if pass_due {
                summary.passes += 1;
                // Errors are already logged by the runner; the next pass retries
                if runner.run_pass().await.is_err() {
                    summary.failed += 1;
                }
                if self.interval == Interval::Once {
                    break;
                }
            }

            match self.wait().await {
                Next::Pass => pass_due = true,
                Next::Stop => break,
            }
        }

        tracing::info!(
            passes = summary.passes,
            failed = summary.failed,
            "scheduler stopped"
        );
        summary
    }

    async fn wait(&mut self) -> Next {
        let mut deadline = self.deadline();

        loop {
            let message = match (deadline, self.handles_dropped) {
                (Some(deadline), false) => {
                    tokio::select! {
                        _ = sleep_until(deadline) => return Next::Pass,
                        message = self.rx.recv() => message,
                    }
                }
                (Some(deadline), true) => {
                    sleep_until(deadline).await;
                    return Next::Pass;
                }
                (None, false) => self.rx.recv().await,
                (None, true) => return Next::Stop,
            };

            let Some(message) = message else {
                tracing::debug!("all scheduler handles dropped");
                self.handles_dropped = true;
                continue;
            };

            match message {
                Control::Shutdown => {
                    tracing::info!("shutdown requested");
                    return Next::Stop;
                }
                Control::Wake => return Next::Pass,
                Control::SetInterval(interval) => {
                    if self.change_interval(interval) {
                        return Next::Pass;
                    }
                    deadline = self.deadline();
                }
                Control::Reconfigure(raw) => match Interval::parse(&raw) {
                    Ok(interval) => {
                        if self.change_interval(interval) {
                            return Next::Pass;
                        }
                        deadline = self.deadline();
                    }
                    Err(e) => {
                        tracing::warn!(
                            error = %e,
                            current = %self.interval,
                            "ignoring invalid interval, keeping the current one"
                        );
                    }
                },
            }
        }
    }

    /// Returns true when the new interval asks for an immediate pass.
    fn change_interval(&mut self, interval: Interval) -> bool {
        if interval != self.interval {
            tracing::info!(from = %self.interval, to = %interval, "interval changed");
        }
        self.interval = interval;
        interval == Interval::Once
    }

    fn deadline(&self) -> Option<Instant> {
        match self.interval {
            Interval::Every(period) => Some(Instant::now() + period),
            Interval::Once | Interval::Paused => None,
        }
    }
}
