//! Local directory replica

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

use async_trait::async_trait;
use blobsync_fs::io::{self, RobustnessConfig};
use blobsync_fs::{ItemPath, StatePath, checksum};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use walkdir::{DirEntry, WalkDir};

use super::{Replica, check_precondition};
use crate::filter::ScopeFilter;
use crate::model::{Fingerprint, ItemState, Side};
use crate::{Error, Result, blocking};

#[derive(Debug, Clone)]
struct CachedHash {
    size: u64,
    modified: SystemTime,
    tag: String,
}

/// Content hashes keyed by path, valid while size and mtime are unchanged.
type HashCache = Arc<Mutex<HashMap<ItemPath, CachedHash>>>;

/// A directory tree on the local filesystem.
///
/// Files are fingerprinted by SHA-256 of their content. Writes go through
/// [`io::write_atomic`], so a reader never sees a partially written file.
#[derive(Debug, Clone)]
pub struct LocalReplica {
    root: PathBuf,
    excluded: Vec<PathBuf>,
    robustness: RobustnessConfig,
    hashes: HashCache,
}

impl LocalReplica {
    /// Open the tree rooted at `root`, which must be an existing directory.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(Error::LocalRootMissing {
                path: root.to_path_buf(),
            });
        }

        Ok(Self {
            root: io::canonicalize(root)?,
            excluded: Vec::new(),
            robustness: RobustnessConfig::default(),
            hashes: HashCache::default(),
        })
    }

    /// Never synchronize `dir`; relative paths are resolved against the root.
    pub fn excluding(mut self, dir: impl AsRef<Path>) -> Self {
        let dir = self.root.join(dir.as_ref());
        let dir = io::canonicalize(&dir).unwrap_or(dir);
        self.excluded.push(dir);
        self
    }

    pub fn with_robustness(mut self, robustness: RobustnessConfig) -> Self {
        self.robustness = robustness;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl Replica for LocalReplica {
    fn side(&self) -> Side {
        Side::Local
    }

    fn endpoint(&self) -> String {
        self.root.display().to_string()
    }

    async fn scan(&self, filter: &ScopeFilter) -> Result<Vec<ItemState>> {
        let root = self.root.clone();
        let excluded = self.excluded.clone();
        let filter = filter.clone();
        let hashes = Arc::clone(&self.hashes);

        let states = blocking(move || scan_tree(&root, &excluded, &filter, &hashes)).await?;
        tracing::debug!(root = %self.root.display(), items = states.len(), "local scan complete");
        Ok(states)
    }

    async fn read(&self, path: &ItemPath, expected: &Fingerprint) -> Result<Bytes> {
        let full = path.to_native(&self.root);
        let path = path.clone();
        let expected = expected.clone();

        blocking(move || {
            let content = fs::read(&full).map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => Error::NotFound {
                    path: path.to_string(),
                },
                _ => blobsync_fs::Error::io(&full, e).into(),
            })?;

            let actual = Fingerprint::new(
                content.len() as u64,
                checksum::compute_content_checksum(&content),
            );
            if actual != expected {
                return Err(Error::precondition(&path, "source changed since it was scanned"));
            }
            Ok(Bytes::from(content))
        })
        .await
    }

    async fn write(
        &self,
        path: &ItemPath,
        content: Bytes,
        expected: Option<&Fingerprint>,
    ) -> Result<ItemState> {
        let full = path.to_native(&self.root);
        let path = path.clone();
        let expected = expected.cloned();
        let robustness = self.robustness;
        let hashes = Arc::clone(&self.hashes);

        blocking(move || {
            let current = current_fingerprint(&full, &path, &hashes)?;
            check_precondition(&path, expected.as_ref(), current.as_ref())?;

            io::write_atomic(&full, &content, robustness)?;

            let metadata = fs::metadata(&full).map_err(|e| blobsync_fs::Error::io(&full, e))?;
            let modified = metadata
                .modified()
                .map_err(|e| blobsync_fs::Error::io(&full, e))?;
            let tag = checksum::compute_content_checksum(&content);

            lock(&hashes).insert(
                path.clone(),
                CachedHash {
                    size: metadata.len(),
                    modified,
                    tag: tag.clone(),
                },
            );

            Ok(ItemState::file(
                path,
                Fingerprint::new(content.len() as u64, tag),
                Some(DateTime::<Utc>::from(modified)),
            ))
        })
        .await
    }

    async fn remove(&self, path: &ItemPath, expected: Option<&Fingerprint>) -> Result<()> {
        let full = path.to_native(&self.root);
        let path = path.clone();
        let expected = expected.cloned();
        let hashes = Arc::clone(&self.hashes);

        blocking(move || {
            let Some(current) = current_fingerprint(&full, &path, &hashes)? else {
                return Ok(());
            };
            if let Some(expected) = &expected
                && *expected != current
            {
                return Err(Error::precondition(&path, "target changed since it was scanned"));
            }

            match fs::remove_file(&full) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(blobsync_fs::Error::io(&full, e).into()),
            }
            lock(&hashes).remove(&path);
            Ok(())
        })
        .await
    }

    async fn create_dir(&self, path: &ItemPath) -> Result<ItemState> {
        let full = path.to_native(&self.root);
        let path = path.clone();

        blocking(move || {
            fs::create_dir_all(&full).map_err(|e| blobsync_fs::Error::io(&full, e))?;
            Ok(ItemState::directory(path, modified_time(&full)))
        })
        .await
    }

    async fn remove_dir(&self, path: &ItemPath) -> Result<()> {
        let full = path.to_native(&self.root);

        blocking(move || match fs::remove_dir(&full) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(blobsync_fs::Error::io(&full, e).into()),
        })
        .await
    }
}

fn lock(hashes: &HashCache) -> std::sync::MutexGuard<'_, HashMap<ItemPath, CachedHash>> {
    hashes.lock().unwrap_or_else(PoisonError::into_inner)
}

fn modified_time(full: &Path) -> Option<DateTime<Utc>> {
    fs::metadata(full)
        .and_then(|m| m.modified())
        .ok()
        .map(DateTime::<Utc>::from)
}

fn scan_tree(
    root: &Path,
    excluded: &[PathBuf],
    filter: &ScopeFilter,
    hashes: &HashCache,
) -> Result<Vec<ItemState>> {
    let mut states = Vec::new();

    let walker = WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| admit_entry(root, excluded, filter, entry));

    for entry in walker {
        let entry = entry.map_err(|e| {
            let at = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
            Error::from(blobsync_fs::Error::io(at, e.into()))
        })?;
        let path = ItemPath::from_native(root, entry.path())?;
        let file_type = entry.file_type();

        if file_type.is_dir() {
            states.push(ItemState::directory(path, modified_time(entry.path())));
        } else if file_type.is_file() {
            match fingerprint_file(entry.path(), &path, hashes)? {
                Some((fingerprint, modified)) => {
                    states.push(ItemState::file(path, fingerprint, Some(modified)));
                }
                None => tracing::debug!(%path, "file vanished during scan"),
            }
        } else {
            tracing::debug!(%path, "skipping entry that is neither file nor directory");
        }
    }

    let seen: std::collections::HashSet<&ItemPath> = states.iter().map(|s| &s.path).collect();
    lock(hashes).retain(|path, _| seen.contains(path));

    Ok(states)
}

fn admit_entry(root: &Path, excluded: &[PathBuf], filter: &ScopeFilter, entry: &DirEntry) -> bool {
    if entry.depth() == 0 {
        return true;
    }
    // Temp files are in flight; a marker name would read back as a directory
    let name = entry.file_name().to_string_lossy();
    if io::is_temp_file_name(&name) || name == StatePath::DirectoryMarker.as_str() {
        return false;
    }
    if excluded.iter().any(|dir| entry.path() == dir) {
        return false;
    }
    match ItemPath::from_native(root, entry.path()) {
        Ok(path) => filter.admits(&path, entry.file_type().is_dir()),
        Err(_) => false,
    }
}

/// Fingerprint a regular file, reusing the cached hash while size and mtime
/// are unchanged. Returns `None` when the file disappeared.
fn fingerprint_file(
    full: &Path,
    path: &ItemPath,
    hashes: &HashCache,
) -> Result<Option<(Fingerprint, DateTime<Utc>)>> {
    let metadata = match fs::metadata(full) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(blobsync_fs::Error::io(full, e).into()),
    };
    let modified = metadata
        .modified()
        .map_err(|e| blobsync_fs::Error::io(full, e))?;
    let size = metadata.len();

    let cached = lock(hashes)
        .get(path)
        .filter(|c| c.size == size && c.modified == modified)
        .map(|c| c.tag.clone());

    let fingerprint = match cached {
        Some(tag) => Fingerprint::new(size, tag),
        None => {
            let (hashed, tag) = match checksum::compute_file_checksum(full) {
                Ok(result) => result,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
                Err(e) => return Err(blobsync_fs::Error::io(full, e).into()),
            };
            lock(hashes).insert(
                path.clone(),
                CachedHash {
                    size,
                    modified,
                    tag: tag.clone(),
                },
            );
            Fingerprint::new(hashed, tag)
        }
    };

    Ok(Some((fingerprint, DateTime::<Utc>::from(modified))))
}

/// Current fingerprint of whatever sits at `full`, if anything.
fn current_fingerprint(full: &Path, path: &ItemPath, hashes: &HashCache) -> Result<Option<Fingerprint>> {
    match fs::symlink_metadata(full) {
        Ok(metadata) if metadata.is_dir() => Ok(Some(Fingerprint::directory())),
        Ok(_) => Ok(fingerprint_file(full, path, hashes)?.map(|(fingerprint, _)| fingerprint)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(blobsync_fs::Error::io(full, e).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn path(s: &str) -> ItemPath {
        ItemPath::new(s).unwrap()
    }

    #[tokio::test]
    async fn open_rejects_missing_root() {
        let dir = tempdir().unwrap();
        let result = LocalReplica::open(dir.path().join("missing"));
        assert!(matches!(result, Err(Error::LocalRootMissing { .. })));
    }

    #[tokio::test]
    async fn scan_skips_excluded_and_temp_entries() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join(".blobsync/knowledge")).unwrap();
        fs::write(dir.path().join(".blobsync/replicas.toml"), "x").unwrap();
        fs::write(dir.path().join(".notes.txt.1-0.blobsync-tmp"), "partial").unwrap();
        fs::write(dir.path().join("notes.txt"), "hello").unwrap();

        let replica = LocalReplica::open(dir.path()).unwrap().excluding(".blobsync");
        let states = replica.scan(&ScopeFilter::admit_all()).await.unwrap();

        let paths: Vec<_> = states.iter().map(|s| s.path.to_string()).collect();
        assert_eq!(paths, vec!["notes.txt"]);
    }

    #[tokio::test]
    async fn scan_skips_files_named_like_directory_markers() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("docs")).unwrap();
        fs::write(dir.path().join("docs/.blobsync-dir"), "user data").unwrap();
        fs::write(dir.path().join(".blobsync-dir"), "user data").unwrap();

        let replica = LocalReplica::open(dir.path()).unwrap();
        let states = replica.scan(&ScopeFilter::admit_all()).await.unwrap();

        let paths: Vec<_> = states.iter().map(|s| s.path.to_string()).collect();
        assert_eq!(paths, vec!["docs"]);
    }

    #[tokio::test]
    async fn write_requires_matching_precondition() {
        let dir = tempdir().unwrap();
        let replica = LocalReplica::open(dir.path()).unwrap();
        let target = path("docs/readme.txt");

        let created = replica
            .write(&target, Bytes::from_static(b"v1"), None)
            .await
            .unwrap();

        let again = replica.write(&target, Bytes::from_static(b"v2"), None).await;
        assert!(matches!(again, Err(Error::Precondition { .. })));

        let stale = Fingerprint::new(2, "sha256:stale");
        let mismatch = replica
            .write(&target, Bytes::from_static(b"v2"), Some(&stale))
            .await;
        assert!(matches!(mismatch, Err(Error::Precondition { .. })));

        replica
            .write(&target, Bytes::from_static(b"v2"), Some(&created.fingerprint))
            .await
            .unwrap();
        assert_eq!(fs::read(dir.path().join("docs/readme.txt")).unwrap(), b"v2");
    }

    #[tokio::test]
    async fn read_detects_changed_source() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "one").unwrap();
        let replica = LocalReplica::open(dir.path()).unwrap();

        let states = replica.scan(&ScopeFilter::admit_all()).await.unwrap();
        let fingerprint = states[0].fingerprint.clone();
        fs::write(dir.path().join("a.txt"), "two!").unwrap();

        let result = replica.read(&path("a.txt"), &fingerprint).await;
        assert!(matches!(result, Err(Error::Precondition { .. })));
    }

    #[tokio::test]
    async fn remove_dir_keeps_non_empty_directories() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("d")).unwrap();
        fs::write(dir.path().join("d/new.txt"), "fresh").unwrap();
        let replica = LocalReplica::open(dir.path()).unwrap();

        assert!(replica.remove_dir(&path("d")).await.is_err());
        assert!(dir.path().join("d/new.txt").exists());
        replica.remove_dir(&path("missing")).await.unwrap();
    }
}
