//! End-to-end passes over a real local tree and an in-memory container.

mod common;

use std::collections::BTreeSet;
use std::sync::Arc;

use blobsync_core::{ResolutionReason, ScopeFilter, ScopeFilterSpec, Side, SyncOptions};
use blobsync_test_utils::{Fault, MemoryReplica};
use common::Harness;
use pretty_assertions::assert_eq;

fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn readme_and_notes_meet_in_the_middle() {
    let h = Harness::new();
    h.tree.write("docs/readme.txt", "read me");
    h.put_remote("notes.txt", "take note").await;

    let result = h.orchestrator.run_once().await.unwrap();

    assert!(result.is_clean(), "unexpected errors: {:?}", result.errors);
    assert_eq!(h.local_files(), set(&["docs/readme.txt", "notes.txt"]));
    assert_eq!(h.remote_files().await, set(&["docs/readme.txt", "notes.txt"]));
    assert_eq!(h.tree.read("notes.txt"), "take note");
    assert_eq!(h.remote_text("docs/readme.txt").await.as_deref(), Some("read me"));
    assert!(h.remote_keys().await.contains("docs/.blobsync-dir"));
}

#[tokio::test]
async fn second_pass_transfers_nothing() {
    let h = Harness::new();
    h.tree.write("a/b/c.txt", "c");
    h.tree.mkdir("empty");
    h.put_remote("x/y.txt", "y").await;

    h.orchestrator.run_once().await.unwrap();
    let second = h.orchestrator.run_once().await.unwrap();

    assert_eq!(second.transfers(), 0);
    assert_eq!(second.committed, 0);
    assert!(second.conflicts.is_empty());
    assert!(h.tree.path("x").is_dir());
    assert!(h.remote_keys().await.contains("empty/.blobsync-dir"));
}

#[tokio::test]
async fn awkward_names_survive_repeated_passes() {
    let h = Harness::new();
    h.tree.write("café.txt", "1");
    h.tree.write("a b.txt", "2");
    h.tree.write("docs/100%.txt", "3");
    h.put_remote("~$x.docx", "4").await;
    h.put_remote("docs/[1].txt", "5").await;
    let names = set(&["café.txt", "a b.txt", "docs/100%.txt", "~$x.docx", "docs/[1].txt"]);

    let first = h.orchestrator.run_once().await.unwrap();
    assert!(first.is_clean(), "unexpected errors: {:?}", first.errors);
    let second = h.orchestrator.run_once().await.unwrap();

    assert_eq!(second.transfers(), 0);
    assert_eq!(h.local_files(), names);
    assert_eq!(h.remote_files().await, names);
    assert_eq!(h.remote_text("docs/100%.txt").await.as_deref(), Some("3"));
    assert_eq!(h.tree.read("docs/[1].txt"), "5");
}

#[tokio::test]
async fn local_file_named_like_a_marker_stays_local() {
    let h = Harness::new();
    h.tree.write("docs/.blobsync-dir", "user content");
    h.tree.write("docs/page.txt", "p");

    h.orchestrator.run_once().await.unwrap();
    let second = h.orchestrator.run_once().await.unwrap();

    assert_eq!(second.transfers(), 0);
    assert_eq!(h.tree.read("docs/.blobsync-dir"), "user content");
    assert_eq!(h.remote_files().await, set(&["docs/page.txt"]));
}

#[tokio::test]
async fn edits_and_deletes_flow_both_ways() {
    let h = Harness::new();
    h.tree.write("local.txt", "1");
    h.put_remote("remote.txt", "1").await;
    h.orchestrator.run_once().await.unwrap();

    h.tree.write("local.txt", "2");
    h.delete_remote("remote.txt").await;

    let result = h.orchestrator.run_once().await.unwrap();

    assert!(result.is_clean());
    assert_eq!(result.uploaded, 1);
    assert_eq!(result.downloaded, 1);
    assert_eq!(h.remote_text("local.txt").await.as_deref(), Some("2"));
    h.tree.assert_not_exists("remote.txt");
}

#[tokio::test]
async fn removed_local_directory_is_removed_remotely() {
    let h = Harness::new();
    h.tree.write("old/deep/file.txt", "x");
    h.tree.write("keep.txt", "k");
    h.orchestrator.run_once().await.unwrap();

    h.tree.remove("old");
    let result = h.orchestrator.run_once().await.unwrap();

    assert!(result.is_clean(), "unexpected errors: {:?}", result.errors);
    assert_eq!(h.remote_keys().await, set(&["keep.txt"]));
}

#[tokio::test]
async fn older_local_edit_loses_to_remote_edit() {
    let h = Harness::new();
    h.tree.write("doc.txt", "base");
    h.orchestrator.run_once().await.unwrap();

    h.tree.write("doc.txt", "local edit");
    h.tree.set_mtime("doc.txt", 1_000);
    h.put_remote("doc.txt", "remote edit").await;

    let result = h.orchestrator.run_once().await.unwrap();

    assert_eq!(result.conflicts.len(), 1);
    assert_eq!(result.conflicts[0].winner, Side::Remote);
    assert_eq!(result.conflicts[0].reason, ResolutionReason::LaterModification);
    assert_eq!(h.tree.read("doc.txt"), "remote edit");
}

#[tokio::test]
async fn newer_local_edit_beats_remote_edit() {
    let h = Harness::new();
    h.tree.write("doc.txt", "base");
    h.orchestrator.run_once().await.unwrap();

    h.put_remote("doc.txt", "remote edit").await;
    h.tree.write("doc.txt", "local edit");
    // Year 2096
    h.tree.set_mtime("doc.txt", 4_000_000_000);

    let result = h.orchestrator.run_once().await.unwrap();

    assert_eq!(result.conflicts.len(), 1);
    assert_eq!(result.conflicts[0].winner, Side::Local);
    assert_eq!(h.remote_text("doc.txt").await.as_deref(), Some("local edit"));
}

#[tokio::test]
async fn filter_keeps_out_of_scope_items_in_place() {
    let spec = ScopeFilterSpec {
        exclude_subdirectories: vec!["cache".into()],
        include_file_name_patterns: vec!["*.html".into(), "*.css".into()],
        exclude_directories: false,
    };
    let h = Harness::with(ScopeFilter::from_spec(&spec).unwrap(), SyncOptions::default());
    h.tree.write("index.html", "<html>");
    h.tree.write("style/site.CSS", "body {}");
    h.tree.write("draft.md", "draft");
    h.tree.write("cache/page.html", "cached");
    h.put_remote("cache/remote.html", "remote cached").await;
    h.put_remote("remote.log", "log").await;

    let result = h.orchestrator.run_once().await.unwrap();

    assert!(result.is_clean());
    assert_eq!(
        h.remote_files().await,
        set(&["cache/remote.html", "index.html", "remote.log", "style/site.CSS"])
    );
    h.tree.assert_exists("draft.md");
    h.tree.assert_not_exists("cache/remote.html");
    h.tree.assert_not_exists("remote.log");

    let again = h.orchestrator.run_once().await.unwrap();
    assert_eq!(again.transfers(), 0);
}

#[tokio::test]
async fn root_files_only_when_directories_are_excluded() {
    let spec = ScopeFilterSpec {
        exclude_directories: true,
        ..ScopeFilterSpec::default()
    };
    let h = Harness::with(ScopeFilter::from_spec(&spec).unwrap(), SyncOptions::default());
    h.tree.write("top.txt", "t");
    h.tree.write("nested/inner.txt", "i");

    h.orchestrator.run_once().await.unwrap();

    assert_eq!(h.remote_keys().await, set(&["top.txt"]));
}

#[tokio::test]
async fn state_directory_and_temp_files_are_never_uploaded() {
    let h = Harness::with_state_in_tree();
    h.tree.write("page.html", "p");
    h.tree.write(".page.html.123-0.blobsync-tmp", "partial");

    h.orchestrator.run_once().await.unwrap();
    h.tree.write("second.html", "s");
    h.orchestrator.run_once().await.unwrap();

    assert_eq!(h.remote_keys().await, set(&["page.html", "second.html"]));
    h.tree.assert_exists(".blobsync/replicas.toml");
}

#[tokio::test]
async fn failed_upload_does_not_block_others() {
    let remote = Arc::new(MemoryReplica::new(Side::Remote));
    let (tree, orchestrator, _state) = Harness::with_remote(remote.clone());
    tree.write("good.txt", "good");
    tree.write("bad.txt", "bad");
    remote.inject_fault("bad.txt", Fault::Permanent);

    let first = orchestrator.run_once().await.unwrap();

    assert_eq!(first.uploaded, 1);
    assert_eq!(first.errors.len(), 1);
    assert_eq!(first.errors[0].path.as_str(), "bad.txt");
    assert_eq!(remote.text("good.txt").as_deref(), Some("good"));

    remote.clear_faults();
    let second = orchestrator.run_once().await.unwrap();

    assert!(second.is_clean());
    assert_eq!(second.uploaded, 1);
    assert_eq!(remote.text("bad.txt").as_deref(), Some("bad"));
}
