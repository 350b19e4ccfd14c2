//! Object-store container replica
//!
//! Files map to objects under an optional key prefix. Directories have no
//! native representation, so a directory exists when it holds a zero-byte
//! marker object or when any object key runs through it.
//!
//! Keys carry item names verbatim: a key is parsed from the item path, never
//! percent-encoded, so listing a key yields the name it was written under.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use blobsync_fs::{ItemPath, StatePath};
use bytes::Bytes;
use chrono::Utc;
use futures::TryStreamExt;
use object_store::azure::MicrosoftAzureBuilder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::{
    GetOptions, ObjectMeta, ObjectStore, PutMode, PutOptions, PutPayload, PutResult,
    UpdateVersion,
};
use uuid::Uuid;

use super::azure::AzureContainer;
use super::{Replica, check_precondition};
use crate::config::{Backend, RemoteConfig};
use crate::filter::ScopeFilter;
use crate::model::{Fingerprint, ItemState, Side, Snapshot};
use crate::{Error, Result};

/// Storage account name that selects the local Azure storage emulator.
pub const AZURE_EMULATOR_ACCOUNT: &str = "devstoreaccount1";

/// A container in an object store.
#[derive(Debug, Clone)]
pub struct ObjectStoreReplica {
    store: Arc<dyn ObjectStore>,
    /// Identifies the store instance; replica identity is bound to it
    instance: String,
    prefix: String,
    conditional_writes: bool,
    quote_tags: bool,
    provision: Option<AzureContainer>,
}

impl ObjectStoreReplica {
    /// Wrap a store; conditional writes are assumed to be supported.
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        let instance = store.to_string();
        Self {
            store,
            instance,
            prefix: String::new(),
            conditional_writes: true,
            quote_tags: false,
            provision: None,
        }
    }

    /// A fresh in-memory container.
    ///
    /// Every instance gets its own endpoint: an empty store must never be
    /// mistaken for one whose contents were recorded by an earlier run.
    pub fn in_memory() -> Self {
        let mut replica = Self::new(Arc::new(InMemory::new()));
        replica.instance = format!("memory://{}", Uuid::new_v4());
        replica
    }

    /// Keep every item under `prefix` inside the container.
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = prefix.trim_matches('/').to_string();
        self
    }

    /// Use `PutMode::Create`/`PutMode::Update` for writes.
    ///
    /// When disabled, preconditions are checked with a `head` request right
    /// before an unconditional put, which leaves a short race window.
    pub fn with_conditional_writes(mut self, enabled: bool) -> Self {
        self.conditional_writes = enabled;
        self
    }

    /// Build the replica described by the `[remote]` configuration section.
    ///
    /// A missing filesystem container is created here; an Azure container
    /// is created by [`ensure_container`](Self::ensure_container).
    pub fn from_config(config: &RemoteConfig) -> Result<Self> {
        let replica = match config.backend {
            Backend::Azure => {
                let account = config.account_name.as_deref().ok_or_else(|| Error::Config {
                    message: "the azure backend requires remote.account_name".into(),
                })?;

                let emulator = account == AZURE_EMULATOR_ACCOUNT;
                let mut builder = MicrosoftAzureBuilder::new()
                    .with_account(account)
                    .with_container_name(&config.container);
                if emulator {
                    builder = builder.with_use_emulator(true);
                }
                if let Some(key) = &config.account_key {
                    builder = builder.with_access_key(key);
                }

                let store = builder.build().map_err(|e| Error::Config {
                    message: format!("azure backend: {e}"),
                })?;
                let mut replica = Self::new(Arc::new(store));
                replica.quote_tags = true;
                replica.provision = Some(AzureContainer::new(
                    account,
                    config.account_key.as_deref(),
                    &config.container,
                    emulator,
                ));
                replica
            }
            Backend::Filesystem => {
                let root: PathBuf = config
                    .root
                    .as_ref()
                    .ok_or_else(|| Error::Config {
                        message: "the filesystem backend requires remote.root".into(),
                    })?
                    .join(&config.container);
                std::fs::create_dir_all(&root).map_err(|e| blobsync_fs::Error::io(&root, e))?;
                Self::new(Arc::new(LocalFileSystem::new_with_prefix(&root)?))
                    .with_conditional_writes(false)
            }
            Backend::Memory => Self::in_memory(),
        };

        Ok(replica.with_prefix(config.prefix.as_deref().unwrap_or_default()))
    }

    /// Entity tag as sent in a precondition header.
    ///
    /// Fingerprints hold tags unquoted; HTTP backends expect them quoted.
    fn wire_tag(&self, tag: &str) -> String {
        if self.quote_tags {
            format!("\"{tag}\"")
        } else {
            tag.to_string()
        }
    }

    /// Create the container when the backend needs it done over the wire.
    pub async fn ensure_container(&self) -> Result<()> {
        match &self.provision {
            Some(container) => container.ensure().await,
            None => Ok(()),
        }
    }

    /// List at most one object to prove the container is reachable.
    pub async fn check_reachable(&self) -> Result<()> {
        let prefix = self.prefix_path()?;
        let mut listing = self.store.list(prefix.as_ref());
        listing.try_next().await.map_err(|e| Error::ReplicaUnavailable {
            side: Side::Remote,
            message: e.to_string(),
        })?;
        Ok(())
    }

    fn prefix_path(&self) -> Result<Option<ObjectPath>> {
        if self.prefix.is_empty() {
            return Ok(None);
        }
        let prefix = ObjectPath::parse(&self.prefix).map_err(|e| Error::Config {
            message: format!("invalid remote prefix '{}': {e}", self.prefix),
        })?;
        Ok(Some(prefix))
    }

    /// Object key of `path`; segments are parsed, not encoded.
    fn location(&self, path: &ItemPath) -> Result<ObjectPath> {
        let key = if self.prefix.is_empty() {
            path.as_str().to_string()
        } else {
            format!("{}/{}", self.prefix, path)
        };
        ObjectPath::parse(&key).map_err(|e| map_error(path, e.into()))
    }

    fn marker(&self, dir: &ItemPath) -> Result<ObjectPath> {
        Ok(self.location(dir)?.child(StatePath::DirectoryMarker.as_str()))
    }

    fn item_path(&self, location: &ObjectPath) -> Option<ItemPath> {
        let key = location.as_ref();
        let relative = if self.prefix.is_empty() {
            key
        } else {
            key.strip_prefix(self.prefix.as_str())?.strip_prefix('/')?
        };
        ItemPath::new(relative).ok()
    }

    fn fingerprint(meta: &ObjectMeta) -> Fingerprint {
        let tag = version_tag(meta.e_tag.as_deref(), meta.version.as_deref())
            .unwrap_or_else(|| format!("modified:{}", meta.last_modified.to_rfc3339()));
        Fingerprint::new(meta.size as u64, tag)
    }

    async fn current(&self, path: &ItemPath) -> Result<Option<Fingerprint>> {
        match self.store.head(&self.location(path)?).await {
            Ok(meta) => Ok(Some(Self::fingerprint(&meta))),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(map_error(path, e)),
        }
    }
}

/// Version tag of an object: its entity tag, else its version id.
///
/// Listings and response headers disagree on quoting entity tags, so quotes
/// are dropped.
fn version_tag(e_tag: Option<&str>, version: Option<&str>) -> Option<String> {
    e_tag
        .or(version)
        .map(|tag| tag.trim_matches('"').to_string())
}

fn map_error(path: &ItemPath, err: object_store::Error) -> Error {
    match err {
        object_store::Error::NotFound { .. } => Error::NotFound {
            path: path.to_string(),
        },
        object_store::Error::AlreadyExists { .. } => {
            Error::precondition(path, "target appeared since it was scanned")
        }
        object_store::Error::Precondition { .. } | object_store::Error::NotModified { .. } => {
            Error::precondition(path, "target changed since it was scanned")
        }
        other => Error::Store(other),
    }
}

#[async_trait]
impl Replica for ObjectStoreReplica {
    fn side(&self) -> Side {
        Side::Remote
    }

    fn endpoint(&self) -> String {
        format!("{}/{}", self.instance, self.prefix)
    }

    async fn scan(&self, filter: &ScopeFilter) -> Result<Vec<ItemState>> {
        let prefix = self.prefix_path()?;
        let mut listing = self.store.list(prefix.as_ref());
        let mut items = Snapshot::new();
        let marker = StatePath::DirectoryMarker.as_str();

        while let Some(meta) = listing.try_next().await? {
            let Some(path) = self.item_path(&meta.location) else {
                tracing::debug!(key = %meta.location, "skipping object without a valid item path");
                continue;
            };

            if path.file_name() == marker {
                if let Some(dir) = path.parent()
                    && filter.admits(&dir, true)
                {
                    items.insert(dir.clone(), ItemState::directory(dir, Some(meta.last_modified)));
                }
                continue;
            }

            if !filter.admits(&path, false) {
                continue;
            }

            for ancestor in path.ancestors() {
                if filter.admits(&ancestor, true) {
                    items
                        .entry(ancestor.clone())
                        .or_insert_with(|| ItemState::directory(ancestor, None));
                }
            }
            let state = ItemState::file(path.clone(), Self::fingerprint(&meta), Some(meta.last_modified));
            items.insert(path, state);
        }

        tracing::debug!(endpoint = %self.endpoint(), items = items.len(), "remote scan complete");
        Ok(items.into_values().collect())
    }

    async fn read(&self, path: &ItemPath, expected: &Fingerprint) -> Result<Bytes> {
        let options = GetOptions {
            if_match: self.conditional_writes.then(|| self.wire_tag(&expected.tag)),
            ..Default::default()
        };

        let result = self
            .store
            .get_opts(&self.location(path)?, options)
            .await
            .map_err(|e| map_error(path, e))?;
        if Self::fingerprint(&result.meta) != *expected {
            return Err(Error::precondition(path, "source changed since it was scanned"));
        }

        result.bytes().await.map_err(|e| map_error(path, e))
    }

    async fn write(
        &self,
        path: &ItemPath,
        content: Bytes,
        expected: Option<&Fingerprint>,
    ) -> Result<ItemState> {
        let location = self.location(path)?;

        let mode = if self.conditional_writes {
            match expected {
                None => PutMode::Create,
                Some(fingerprint) => PutMode::Update(UpdateVersion {
                    e_tag: Some(self.wire_tag(&fingerprint.tag)),
                    version: None,
                }),
            }
        } else {
            let current = self.current(path).await?;
            check_precondition(path, expected, current.as_ref())?;
            PutMode::Overwrite
        };

        let options = PutOptions {
            mode,
            ..Default::default()
        };
        let size = content.len() as u64;
        let written = self
            .store
            .put_opts(&location, PutPayload::from(content), options)
            .await
            .map_err(|e| map_error(path, e))?;

        // The put response names the version we wrote; a later head could
        // already see someone else's
        let PutResult { e_tag, version } = written;
        if let Some(tag) = version_tag(e_tag.as_deref(), version.as_deref()) {
            return Ok(ItemState::file(
                path.clone(),
                Fingerprint::new(size, tag),
                Some(Utc::now()),
            ));
        }

        let meta = self
            .store
            .head(&location)
            .await
            .map_err(|e| map_error(path, e))?;
        Ok(ItemState::file(
            path.clone(),
            Self::fingerprint(&meta),
            Some(meta.last_modified),
        ))
    }

    async fn remove(&self, path: &ItemPath, expected: Option<&Fingerprint>) -> Result<()> {
        let Some(current) = self.current(path).await? else {
            return Ok(());
        };
        if let Some(expected) = expected
            && *expected != current
        {
            return Err(Error::precondition(path, "target changed since it was scanned"));
        }

        match self.store.delete(&self.location(path)?).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(map_error(path, e)),
        }
    }

    async fn create_dir(&self, path: &ItemPath) -> Result<ItemState> {
        self.store
            .put(&self.marker(path)?, PutPayload::from_static(b""))
            .await
            .map_err(|e| map_error(path, e))?;
        Ok(ItemState::directory(path.clone(), None))
    }

    async fn remove_dir(&self, path: &ItemPath) -> Result<()> {
        let marker = self.marker(path)?;

        // Any other key below the directory keeps it alive
        let location = self.location(path)?;
        let mut children = self.store.list(Some(&location));
        while let Some(meta) = children.try_next().await.map_err(|e| map_error(path, e))? {
            if meta.location != marker {
                return Err(Error::Transfer {
                    path: path.to_string(),
                    reason: "directory is not empty".into(),
                });
            }
        }

        match self.store.delete(&marker).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(map_error(path, e)),
        }
    }
}
