//! Shared harness: a real local tree paired with an in-memory container.

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use blobsync_core::{
    KnowledgeStore, LocalReplica, ObjectStoreReplica, Replica, ScopeFilter, SyncOptions,
    SyncOrchestrator,
};
use blobsync_test_utils::TestTree;
use futures::TryStreamExt;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use tempfile::TempDir;

pub const PREFIX: &str = "site";
pub const MARKER: &str = ".blobsync-dir";

pub struct Harness {
    pub tree: TestTree,
    pub store: Arc<dyn ObjectStore>,
    pub orchestrator: SyncOrchestrator,
    _state: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(ScopeFilter::admit_all(), SyncOptions::default())
    }

    pub fn with(filter: ScopeFilter, options: SyncOptions) -> Self {
        let tree = TestTree::new();
        let state = TempDir::new().unwrap();
        let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        Self::assemble(tree, state, store, filter, options, None)
    }

    /// Keep knowledge inside the synchronized tree, as the CLI does.
    pub fn with_state_in_tree() -> Self {
        let tree = TestTree::new();
        let state = TempDir::new().unwrap();
        let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        Self::assemble(
            tree,
            state,
            store,
            ScopeFilter::admit_all(),
            SyncOptions::default(),
            Some(".blobsync"),
        )
    }

    /// Pair a real local tree with any remote replica.
    pub fn with_remote(remote: Arc<dyn Replica>) -> (TestTree, SyncOrchestrator, TempDir) {
        let tree = TestTree::new();
        let state = TempDir::new().unwrap();
        let local = LocalReplica::open(tree.root()).unwrap();
        let knowledge = KnowledgeStore::open(state.path()).unwrap();
        let orchestrator = SyncOrchestrator::new(
            Arc::new(local),
            remote,
            Arc::new(knowledge),
            ScopeFilter::admit_all(),
            SyncOptions::default(),
        );
        (tree, orchestrator, state)
    }

    fn assemble(
        tree: TestTree,
        state: TempDir,
        store: Arc<dyn ObjectStore>,
        filter: ScopeFilter,
        options: SyncOptions,
        state_in_tree: Option<&str>,
    ) -> Self {
        let mut local = LocalReplica::open(tree.root()).unwrap();
        let state_dir = match state_in_tree {
            Some(name) => {
                local = local.excluding(name);
                tree.path(name)
            }
            None => state.path().to_path_buf(),
        };
        let remote = ObjectStoreReplica::new(Arc::clone(&store)).with_prefix(PREFIX);
        let knowledge = KnowledgeStore::open(state_dir).unwrap();

        let orchestrator = SyncOrchestrator::new(
            Arc::new(local),
            Arc::new(remote),
            Arc::new(knowledge),
            filter,
            options,
        );
        Self {
            tree,
            store,
            orchestrator,
            _state: state,
        }
    }

    /// Raw object key, the way the replica writes it.
    fn key(relative: &str) -> ObjectPath {
        ObjectPath::parse(format!("{PREFIX}/{relative}")).unwrap()
    }

    pub async fn put_remote(&self, relative: &str, content: &str) {
        self.store
            .put(&Self::key(relative), PutPayload::from(content.to_string()))
            .await
            .unwrap();
    }

    pub async fn delete_remote(&self, relative: &str) {
        self.store.delete(&Self::key(relative)).await.unwrap();
    }

    pub async fn remote_text(&self, relative: &str) -> Option<String> {
        match self.store.get(&Self::key(relative)).await {
            Ok(result) => {
                let bytes = result.bytes().await.unwrap();
                Some(String::from_utf8(bytes.to_vec()).unwrap())
            }
            Err(object_store::Error::NotFound { .. }) => None,
            Err(e) => panic!("unexpected store error: {e}"),
        }
    }

    /// Every object key under the prefix, relative to it.
    pub async fn remote_keys(&self) -> BTreeSet<String> {
        let prefix = ObjectPath::from(PREFIX);
        self.store
            .list(Some(&prefix))
            .map_ok(|meta| {
                meta.location
                    .as_ref()
                    .trim_start_matches(&format!("{PREFIX}/"))
                    .to_string()
            })
            .try_collect()
            .await
            .unwrap()
    }

    /// Remote files, directory markers left out.
    pub async fn remote_files(&self) -> BTreeSet<String> {
        self.remote_keys()
            .await
            .into_iter()
            .filter(|key| !key.ends_with(MARKER))
            .collect()
    }

    /// Local files relative to the tree root.
    pub fn local_files(&self) -> BTreeSet<String> {
        local_files(self.tree.root())
    }
}

pub fn local_files(root: &Path) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    collect(root, root, &mut out);
    out
}

fn collect(root: &Path, dir: &Path, out: &mut BTreeSet<String>) {
    for entry in fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
            collect(root, &path, out);
        } else {
            let relative = path.strip_prefix(root).unwrap();
            out.insert(relative.to_string_lossy().replace('\\', "/"));
        }
    }
}
