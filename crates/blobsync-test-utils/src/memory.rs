//! [`MemoryReplica`], an in-process [`Replica`] for engine tests.
//!
//! Timestamps come from a clock the test sets explicitly, so conflict
//! resolution can be driven deterministically. Faults can be armed per path
//! to exercise retry and partial-failure handling.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use blobsync_core::replica::check_precondition;
use blobsync_core::{Error, Fingerprint, ItemState, Replica, Result, ScopeFilter, Side};
use blobsync_fs::ItemPath;
use bytes::Bytes;
use chrono::{DateTime, Duration, TimeZone, Utc};

/// Failure injected into mutating calls for one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Fail with a timeout this many more times, then succeed
    Transient(u32),
    /// Fail with a non-retryable error until cleared
    Permanent,
}

#[derive(Debug, Clone)]
enum Entry {
    File {
        content: Bytes,
        fingerprint: Fingerprint,
        modified: DateTime<Utc>,
    },
    Directory {
        modified: DateTime<Utc>,
    },
}

impl Entry {
    fn state(&self, path: &ItemPath) -> ItemState {
        match self {
            Self::File {
                fingerprint,
                modified,
                ..
            } => ItemState::file(path.clone(), fingerprint.clone(), Some(*modified)),
            Self::Directory { modified } => ItemState::directory(path.clone(), Some(*modified)),
        }
    }

    fn fingerprint(&self) -> Fingerprint {
        match self {
            Self::File { fingerprint, .. } => fingerprint.clone(),
            Self::Directory { .. } => Fingerprint::directory(),
        }
    }
}

#[derive(Debug)]
struct Inner {
    items: BTreeMap<ItemPath, Entry>,
    clock: DateTime<Utc>,
    next_version: u64,
    faults: HashMap<ItemPath, Fault>,
    scan_fails: bool,
    mutations: usize,
}

/// A replica held entirely in memory.
///
/// Each write stamps the item with the current clock and a fresh version
/// tag, the way an object store hands out entity tags.
#[derive(Debug)]
pub struct MemoryReplica {
    side: Side,
    name: String,
    inner: Mutex<Inner>,
}

impl MemoryReplica {
    /// Create an empty replica whose clock starts at the Unix epoch plus
    /// one day.
    pub fn new(side: Side) -> Self {
        Self::named(side, "default")
    }

    /// Create an empty replica with a distinct endpoint name.
    pub fn named(side: Side, name: &str) -> Self {
        let start = Utc.timestamp_opt(86_400, 0).single().unwrap_or_default();
        Self {
            side,
            name: name.to_string(),
            inner: Mutex::new(Inner {
                items: BTreeMap::new(),
                clock: start,
                next_version: 1,
                faults: HashMap::new(),
                scan_fails: false,
                mutations: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    /// Set the clock used for subsequent modifications.
    pub fn set_time(&self, at: DateTime<Utc>) {
        self.lock().clock = at;
    }

    /// Move the clock forward.
    pub fn advance(&self, seconds: i64) {
        let mut inner = self.lock();
        inner.clock += Duration::seconds(seconds);
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.lock().clock
    }

    /// Place a file directly, bypassing preconditions and faults, and create
    /// its missing parent directories.
    pub fn put_file(&self, path: &str, content: impl Into<Bytes>) {
        let path = item_path(path);
        let mut inner = self.lock();
        for ancestor in path.ancestors() {
            let modified = inner.clock;
            inner
                .items
                .entry(ancestor)
                .or_insert(Entry::Directory { modified });
        }
        inner.store_file(&path, content.into());
    }

    /// Place a directory directly.
    pub fn put_dir(&self, path: &str) {
        let mut inner = self.lock();
        let modified = inner.clock;
        inner
            .items
            .insert(item_path(path), Entry::Directory { modified });
    }

    /// Remove an item and everything beneath it, bypassing preconditions.
    pub fn delete(&self, path: &str) {
        let path = item_path(path);
        self.lock()
            .items
            .retain(|p, _| p != &path && !p.is_within(&path));
    }

    /// Arm a fault for writes and removals of `path`.
    pub fn inject_fault(&self, path: &str, fault: Fault) {
        self.lock().faults.insert(item_path(path), fault);
    }

    pub fn clear_faults(&self) {
        self.lock().faults.clear();
    }

    /// Make every scan fail until reset.
    pub fn fail_scans(&self, fail: bool) {
        self.lock().scan_fails = fail;
    }

    /// File content at `path`, if it is a file.
    pub fn content(&self, path: &str) -> Option<Bytes> {
        match self.lock().items.get(&item_path(path)) {
            Some(Entry::File { content, .. }) => Some(content.clone()),
            _ => None,
        }
    }

    /// File content as UTF-8 text.
    pub fn text(&self, path: &str) -> Option<String> {
        self.content(path)
            .map(|c| String::from_utf8_lossy(&c).into_owned())
    }

    pub fn is_dir(&self, path: &str) -> bool {
        matches!(
            self.lock().items.get(&item_path(path)),
            Some(Entry::Directory { .. })
        )
    }

    pub fn contains(&self, path: &str) -> bool {
        self.lock().items.contains_key(&item_path(path))
    }

    /// Every item path in order.
    pub fn paths(&self) -> Vec<String> {
        self.lock().items.keys().map(|p| p.to_string()).collect()
    }

    /// Successful writes, removals and directory operations made through
    /// the [`Replica`] interface.
    pub fn mutations(&self) -> usize {
        self.lock().mutations
    }
}

impl Inner {
    fn store_file(&mut self, path: &ItemPath, content: Bytes) -> ItemState {
        let fingerprint = Fingerprint::new(content.len() as u64, format!("v{}", self.next_version));
        self.next_version += 1;
        let entry = Entry::File {
            content,
            fingerprint,
            modified: self.clock,
        };
        let state = entry.state(path);
        self.items.insert(path.clone(), entry);
        state
    }

    fn check_fault(&mut self, path: &ItemPath) -> Result<()> {
        match self.faults.get_mut(path) {
            Some(Fault::Permanent) => Err(Error::Transfer {
                path: path.to_string(),
                reason: "injected permanent fault".into(),
            }),
            Some(Fault::Transient(remaining)) if *remaining > 0 => {
                *remaining -= 1;
                Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "injected transient fault",
                )))
            }
            _ => Ok(()),
        }
    }

    fn current(&self, path: &ItemPath) -> Option<Fingerprint> {
        self.items.get(path).map(Entry::fingerprint)
    }
}

fn item_path(path: &str) -> ItemPath {
    ItemPath::new(path).unwrap_or_else(|e| panic!("invalid test path '{path}': {e}"))
}

#[async_trait]
impl Replica for MemoryReplica {
    fn side(&self) -> Side {
        self.side
    }

    fn endpoint(&self) -> String {
        format!("memory://{}/{}", self.side, self.name)
    }

    async fn scan(&self, filter: &ScopeFilter) -> Result<Vec<ItemState>> {
        let inner = self.lock();
        if inner.scan_fails {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "injected scan failure",
            )));
        }

        Ok(inner
            .items
            .iter()
            .filter(|(path, entry)| filter.admits(path, matches!(entry, Entry::Directory { .. })))
            .map(|(path, entry)| entry.state(path))
            .collect())
    }

    async fn read(&self, path: &ItemPath, expected: &Fingerprint) -> Result<Bytes> {
        let inner = self.lock();
        match inner.items.get(path) {
            Some(Entry::File {
                content,
                fingerprint,
                ..
            }) if fingerprint == expected => Ok(content.clone()),
            Some(_) => Err(Error::precondition(path, "source changed since it was scanned")),
            None => Err(Error::NotFound {
                path: path.to_string(),
            }),
        }
    }

    async fn write(
        &self,
        path: &ItemPath,
        content: Bytes,
        expected: Option<&Fingerprint>,
    ) -> Result<ItemState> {
        let mut inner = self.lock();
        inner.check_fault(path)?;
        check_precondition(path, expected, inner.current(path).as_ref())?;

        // Parents appear implicitly, as on a filesystem
        let modified = inner.clock;
        for ancestor in path.ancestors() {
            inner
                .items
                .entry(ancestor)
                .or_insert(Entry::Directory { modified });
        }
        let state = inner.store_file(path, content);
        inner.mutations += 1;
        Ok(state)
    }

    async fn remove(&self, path: &ItemPath, expected: Option<&Fingerprint>) -> Result<()> {
        let mut inner = self.lock();
        inner.check_fault(path)?;
        let Some(current) = inner.current(path) else {
            return Ok(());
        };
        if expected.is_some() {
            check_precondition(path, expected, Some(&current))?;
        }

        inner.items.remove(path);
        inner.mutations += 1;
        Ok(())
    }

    async fn create_dir(&self, path: &ItemPath) -> Result<ItemState> {
        let mut inner = self.lock();
        inner.check_fault(path)?;
        let modified = inner.clock;
        for ancestor in path.ancestors() {
            inner
                .items
                .entry(ancestor)
                .or_insert(Entry::Directory { modified });
        }
        let entry = inner
            .items
            .entry(path.clone())
            .or_insert(Entry::Directory { modified })
            .clone();
        inner.mutations += 1;
        Ok(entry.state(path))
    }

    async fn remove_dir(&self, path: &ItemPath) -> Result<()> {
        let mut inner = self.lock();
        inner.check_fault(path)?;
        if !inner.items.contains_key(path) {
            return Ok(());
        }
        if inner.items.keys().any(|p| p != path && p.is_within(path)) {
            return Err(Error::Transfer {
                path: path.to_string(),
                reason: "directory is not empty".into(),
            });
        }

        inner.items.remove(path);
        inner.mutations += 1;
        Ok(())
    }
}
