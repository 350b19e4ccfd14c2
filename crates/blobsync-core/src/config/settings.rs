//! Sync configuration file
//!
//! One file describes one synchronized pair: the local root, the remote
//! container, the scope filter and the schedule.

use std::path::{Path, PathBuf};

use blobsync_fs::{ConfigStore, StatePath};
use serde::{Deserialize, Serialize};

use crate::conflict::TieBreak;
use crate::filter::{ScopeFilter, ScopeFilterSpec};
use crate::scheduler::Interval;
use crate::sync::SyncOptions;
use crate::{Error, Result};

fn default_max_workers() -> usize {
    4
}

fn default_interval() -> IntervalSetting {
    IntervalSetting::Seconds(60)
}

/// `[local]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalConfig {
    /// Root of the synchronized tree; must exist
    pub path: PathBuf,

    /// Where knowledge is kept, relative to `path` unless absolute
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,
}

/// Object store implementation backing the remote replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Azure Blob Storage, or the storage emulator for `devstoreaccount1`
    Azure,
    /// A directory standing in for a container
    Filesystem,
    /// Process-local store, mostly for trials
    Memory,
}

/// `[remote]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub backend: Backend,
    pub container: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_key: Option<String>,
    /// Filesystem backend: directory holding one subdirectory per container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
}

/// `[filter]` section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterConfig {
    #[serde(default)]
    pub exclude_subdirectories: Vec<String>,

    /// Comma-separated form of `exclude_subdirectories`, merged into it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_paths: Option<String>,

    #[serde(default)]
    pub include_file_name_patterns: Vec<String>,

    #[serde(default)]
    pub exclude_directories: bool,
}

impl FilterConfig {
    /// Combine list and comma-separated excludes into one filter spec.
    pub fn to_spec(&self) -> ScopeFilterSpec {
        let mut exclude_subdirectories = self.exclude_subdirectories.clone();
        if let Some(legacy) = &self.exclude_paths {
            for entry in legacy.split(',').map(str::trim).filter(|e| !e.is_empty()) {
                if !exclude_subdirectories.iter().any(|existing| existing == entry) {
                    exclude_subdirectories.push(entry.to_string());
                }
            }
        }

        ScopeFilterSpec {
            exclude_subdirectories,
            include_file_name_patterns: self.include_file_name_patterns.clone(),
            exclude_directories: self.exclude_directories,
        }
    }
}

/// Interval as written in the file: a number or a numeric string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IntervalSetting {
    Seconds(i64),
    Raw(String),
}

impl IntervalSetting {
    /// The setting as text, for passing to [`Interval::parse`].
    pub fn raw(&self) -> String {
        match self {
            Self::Seconds(seconds) => seconds.to_string(),
            Self::Raw(raw) => raw.clone(),
        }
    }

    pub fn parse(&self) -> Result<Interval> {
        match self {
            Self::Seconds(seconds) => Ok(Interval::from_seconds(*seconds)),
            Self::Raw(raw) => Interval::parse(raw),
        }
    }
}

/// `[schedule]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// `-1` runs once, `0` or below pauses, above `0` is the period
    #[serde(default = "default_interval")]
    pub interval_seconds: IntervalSetting,

    /// Concurrent item transfers per pass
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Winner when conflicting changes carry the same timestamp
    #[serde(default)]
    pub tie_break: TieBreak,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_interval(),
            max_workers: default_max_workers(),
            tie_break: TieBreak::default(),
        }
    }
}

/// Complete configuration of one synchronized pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    pub local: LocalConfig,
    pub remote: RemoteConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

impl SyncConfig {
    /// Parse TOML content.
    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load from a `.toml`, `.json` or `.yaml` file.
    ///
    /// Relative `local.path` and `remote.root` are resolved against the
    /// file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config: SyncConfig = ConfigStore::new().load(path)?;
        if let Some(base) = path.parent() {
            if config.local.path.is_relative() {
                config.local.path = base.join(&config.local.path);
            }
            if let Some(root) = config.remote.root.as_mut().filter(|r| r.is_relative()) {
                *root = base.join(&*root);
            }
        }
        Ok(config)
    }

    /// Check required values and compile the filter once to surface
    /// invalid patterns.
    pub fn validate(&self) -> Result<()> {
        if self.local.path.as_os_str().is_empty() {
            return Err(Error::Config {
                message: "local.path must not be empty".into(),
            });
        }
        if self.remote.container.trim().is_empty() {
            return Err(Error::Config {
                message: "remote.container must not be empty".into(),
            });
        }
        match self.remote.backend {
            Backend::Azure if self.remote.account_name.is_none() => {
                return Err(Error::Config {
                    message: "the azure backend requires remote.account_name".into(),
                });
            }
            Backend::Filesystem if self.remote.root.is_none() => {
                return Err(Error::Config {
                    message: "the filesystem backend requires remote.root".into(),
                });
            }
            _ => {}
        }
        if self.schedule.max_workers == 0 {
            return Err(Error::Config {
                message: "schedule.max_workers must be at least 1".into(),
            });
        }

        self.schedule.interval_seconds.parse()?;
        self.scope_filter()?;
        Ok(())
    }

    pub fn scope_filter(&self) -> Result<ScopeFilter> {
        ScopeFilter::from_spec(&self.filter.to_spec())
    }

    /// Absolute state directory; defaults to `.blobsync` under the local root.
    pub fn state_dir(&self) -> PathBuf {
        match &self.local.state_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => self.local.path.join(dir),
            None => self.local.path.join(StatePath::StateDir),
        }
    }

    pub fn interval(&self) -> Result<Interval> {
        self.schedule.interval_seconds.parse()
    }

    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            max_workers: self.schedule.max_workers.max(1),
            tie_break: self.schedule.tie_break,
            ..SyncOptions::default()
        }
    }
}
