//! Persistent knowledge and replica identity
//!
//! Layout under the state directory:
//!
//! ```text
//! <state_dir>/
//!   replicas.toml          side -> { id, endpoint }
//!   knowledge.lock         advisory lock serializing writers
//!   knowledge/<id>.toml    one knowledge vector per replica
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use blobsync_fs::io::{self, FileLock, RobustnessConfig};
use blobsync_fs::StatePath;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{KnowledgeUpdate, KnowledgeVector, ReplicaId};
use crate::model::Side;
use crate::{Error, Result};

/// Identity of one replica as persisted in `replicas.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaRecord {
    pub id: ReplicaId,
    /// Canonical endpoint the identifier is bound to
    pub endpoint: String,
    pub created: DateTime<Utc>,
}

/// All known replica identities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaRegistry {
    version: String,
    /// Keyed by side name so the file stays readable
    #[serde(default)]
    replicas: BTreeMap<String, ReplicaRecord>,
}

impl Default for ReplicaRegistry {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            replicas: BTreeMap::new(),
        }
    }
}

impl ReplicaRegistry {
    pub fn get(&self, side: Side) -> Option<&ReplicaRecord> {
        self.replicas.get(side.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ReplicaRecord)> {
        self.replicas.iter().map(|(side, record)| (side.as_str(), record))
    }
}

/// A serialized vector waiting to replace its file.
#[derive(Debug)]
struct PendingWrite {
    path: PathBuf,
    content: String,
    /// File content before the commit, `None` when the file did not exist
    previous: Option<String>,
}

/// File-backed store of knowledge vectors.
///
/// Commits are serialized in-process by a mutex and across processes by an
/// exclusive lock on `knowledge.lock`; every file is replaced atomically.
#[derive(Debug)]
pub struct KnowledgeStore {
    state_dir: PathBuf,
    robustness: RobustnessConfig,
    commit_guard: Mutex<()>,
}

impl KnowledgeStore {
    /// Open (creating if needed) the store rooted at `state_dir`.
    pub fn open(state_dir: impl Into<PathBuf>) -> Result<Self> {
        Self::with_robustness(state_dir, RobustnessConfig::default())
    }

    pub fn with_robustness(
        state_dir: impl Into<PathBuf>,
        robustness: RobustnessConfig,
    ) -> Result<Self> {
        let state_dir = state_dir.into();
        let knowledge_dir = state_dir.join(StatePath::KnowledgeDir);
        std::fs::create_dir_all(&knowledge_dir)
            .map_err(|e| blobsync_fs::Error::io(&knowledge_dir, e))?;

        Ok(Self {
            state_dir,
            robustness,
            commit_guard: Mutex::new(()),
        })
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    fn lock_path(&self) -> PathBuf {
        self.state_dir.join(StatePath::LockFile)
    }

    fn registry_path(&self) -> PathBuf {
        self.state_dir.join(StatePath::ReplicasFile)
    }

    fn vector_path(&self, id: ReplicaId) -> PathBuf {
        self.state_dir
            .join(StatePath::KnowledgeDir)
            .join(format!("{id}.toml"))
    }

    /// Read the replica registry; empty when nothing has been persisted.
    pub fn replicas(&self) -> Result<ReplicaRegistry> {
        let _lock = FileLock::shared(&self.lock_path(), self.robustness)?;
        self.read_registry()
    }

    fn read_registry(&self) -> Result<ReplicaRegistry> {
        let path = self.registry_path();
        if !path.exists() {
            return Ok(ReplicaRegistry::default());
        }
        Ok(toml::from_str(&io::read_text(&path)?)?)
    }

    /// Return the identifier of the replica on `side` serving `endpoint`.
    ///
    /// A persisted identifier is reused only while its endpoint matches;
    /// otherwise a fresh identifier is minted and persisted, and knowledge
    /// held under the old one is discarded. Knowledge of the other side
    /// describes what it shares with the replaced peer, so it is discarded
    /// too.
    pub fn resolve_replica(&self, side: Side, endpoint: &str) -> Result<ReplicaId> {
        let _guard = self.commit_guard.lock().unwrap_or_else(|p| p.into_inner());
        let _lock = FileLock::exclusive(&self.lock_path(), self.robustness)?;

        let mut registry = self.read_registry()?;
        if let Some(record) = registry.get(side) {
            if record.endpoint == endpoint {
                return Ok(record.id);
            }
            tracing::info!(
                %side,
                previous = %record.endpoint,
                current = %endpoint,
                "replica endpoint changed, discarding its knowledge"
            );
            self.discard_vector(record.id)?;
        }
        if let Some(peer) = registry.get(side.opposite()) {
            self.discard_vector(peer.id)?;
        }

        let record = ReplicaRecord {
            id: ReplicaId::new(),
            endpoint: endpoint.to_string(),
            created: Utc::now(),
        };
        let id = record.id;
        registry.replicas.insert(side.as_str().to_string(), record);

        let content = toml::to_string_pretty(&registry)?;
        io::write_atomic(&self.registry_path(), content.as_bytes(), self.robustness)?;

        tracing::info!(%side, %id, %endpoint, "minted replica identifier");
        Ok(id)
    }

    fn discard_vector(&self, id: ReplicaId) -> Result<()> {
        let stale = self.vector_path(id);
        if stale.exists() {
            std::fs::remove_file(&stale).map_err(|e| blobsync_fs::Error::io(&stale, e))?;
            tracing::debug!(replica = %id, "discarded knowledge");
        }
        Ok(())
    }

    /// Load the knowledge vector of `id`, or a zero-tick vector if none exists.
    pub fn load(&self, id: ReplicaId) -> Result<KnowledgeVector> {
        let _lock = FileLock::shared(&self.lock_path(), self.robustness)?;
        self.read_vector(id)
    }

    fn read_vector(&self, id: ReplicaId) -> Result<KnowledgeVector> {
        let path = self.vector_path(id);
        if !path.exists() {
            return Ok(KnowledgeVector::new(id));
        }

        let vector: KnowledgeVector = toml::from_str(&io::read_text(&path)?)?;
        if vector.replica_id() != id {
            return Err(Error::Knowledge {
                message: format!(
                    "{} holds knowledge for replica {}, expected {id}",
                    path.display(),
                    vector.replica_id()
                ),
            });
        }
        Ok(vector)
    }

    /// Commit `updates` on top of `vector` and persist the result.
    ///
    /// An empty update set is a no-op. The commit is refused when another
    /// writer has advanced the persisted vector since `vector` was loaded.
    pub fn commit(
        &self,
        vector: &KnowledgeVector,
        updates: &[KnowledgeUpdate],
    ) -> Result<KnowledgeVector> {
        let mut committed = self.commit_all(&[(vector, updates)])?;
        Ok(committed.remove(0))
    }

    /// Commit several vectors as one unit.
    ///
    /// Every vector is checked and serialized before anything is written,
    /// so a stale or unserializable vector leaves all of them untouched. If
    /// a later write fails, files already replaced are restored.
    pub fn commit_all(
        &self,
        commits: &[(&KnowledgeVector, &[KnowledgeUpdate])],
    ) -> Result<Vec<KnowledgeVector>> {
        if commits.iter().all(|(_, updates)| updates.is_empty()) {
            return Ok(commits.iter().map(|(vector, _)| (*vector).clone()).collect());
        }

        let _guard = self.commit_guard.lock().unwrap_or_else(|p| p.into_inner());
        let _lock = FileLock::exclusive(&self.lock_path(), self.robustness)?;

        let mut next = Vec::with_capacity(commits.len());
        let mut pending = Vec::new();
        for (vector, updates) in commits {
            if updates.is_empty() {
                next.push((*vector).clone());
                continue;
            }

            let persisted = self.read_vector(vector.replica_id())?;
            if persisted.tick() > vector.tick() {
                return Err(Error::Knowledge {
                    message: format!(
                        "knowledge for replica {} advanced to tick {} since it was loaded at tick {}",
                        vector.replica_id(),
                        persisted.tick(),
                        vector.tick()
                    ),
                });
            }

            let mut applied = (*vector).clone();
            applied.apply(updates);
            let path = self.vector_path(applied.replica_id());
            let previous = path.exists().then(|| io::read_text(&path)).transpose()?;
            pending.push(PendingWrite {
                content: toml::to_string_pretty(&applied)?,
                path,
                previous,
            });
            tracing::debug!(
                replica = %applied.replica_id(),
                tick = applied.tick(),
                updates = updates.len(),
                "committing knowledge"
            );
            next.push(applied);
        }

        for (index, write) in pending.iter().enumerate() {
            if let Err(e) = io::write_atomic(&write.path, write.content.as_bytes(), self.robustness)
            {
                self.restore(&pending[..index]);
                return Err(e.into());
            }
        }
        Ok(next)
    }

    /// Put back the prior content of vectors replaced by a failed commit.
    fn restore(&self, written: &[PendingWrite]) {
        for write in written {
            let path = &write.path;
            let restored = match &write.previous {
                Some(content) => io::write_atomic(path, content.as_bytes(), self.robustness),
                None => std::fs::remove_file(path).map_err(|e| blobsync_fs::Error::io(path, e)),
            };
            if let Err(e) = restored {
                tracing::error!(path = %path.display(), error = %e, "could not roll back knowledge");
            }
        }
    }
}
