//! Property checks: one pass brings arbitrary trees into agreement.

mod common;

use std::collections::BTreeMap;

use common::Harness;
use pretty_assertions::assert_eq;
use proptest::prelude::*;

/// Names that stores and URLs treat specially.
const AWKWARD: &[&str] = &["café.txt", "a b.txt", "100%.txt", "~$x.docx", "[1].txt", "naïve #2.md"];

fn file_name() -> impl Strategy<Value = String> {
    prop_oneof![
        prop::sample::select(AWKWARD).prop_map(str::to_string),
        "[a-c]{1,2}/".prop_flat_map(|dir| {
            prop::sample::select(AWKWARD).prop_map(move |name| format!("{dir}{name}"))
        }),
        "[a-c]{1,3}\\.txt",
        "[a-c]{1,2}/[a-c]{1,3}\\.txt",
        "[a-c]{1,2}/[d-e]{1,2}/[a-c]{1,2}\\.md",
    ]
}

fn tree() -> impl Strategy<Value = BTreeMap<String, String>> {
    prop::collection::btree_map(file_name(), "[a-z]{0,16}", 0..8)
}

/// No path may be a file on one side and a directory on the other.
fn consistent(local: &BTreeMap<String, String>, remote: &BTreeMap<String, String>) -> bool {
    let all: Vec<&String> = local.keys().chain(remote.keys()).collect();
    !all
        .iter()
        .any(|a| all.iter().any(|b| b.starts_with(&format!("{a}/"))))
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn one_pass_converges_and_second_is_quiet(local in tree(), remote in tree()) {
        prop_assume!(consistent(&local, &remote));

        runtime().block_on(async {
            let h = Harness::new();
            for (path, content) in &local {
                h.tree.write(path, content);
            }
            for (path, content) in &remote {
                h.put_remote(path, content).await;
            }

            let first = h.orchestrator.run_once().await.unwrap();
            assert!(first.is_clean(), "errors: {:?}", first.errors);
            assert_eq!(h.local_files(), h.remote_files().await);

            // Paths only on one side keep their content
            for (path, content) in local.iter().filter(|(p, _)| !remote.contains_key(*p)) {
                assert_eq!(h.remote_text(path).await.as_deref(), Some(content.as_str()));
            }
            for (path, content) in remote.iter().filter(|(p, _)| !local.contains_key(*p)) {
                assert_eq!(&h.tree.read(path), content);
            }

            let second = h.orchestrator.run_once().await.unwrap();
            assert_eq!(second.transfers(), 0);
            assert_eq!(second.committed, 0);
        });
    }
}
