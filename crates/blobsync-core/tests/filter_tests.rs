//! Property tests for scope filtering

use blobsync_core::{ScopeFilter, ScopeFilterSpec};
use blobsync_fs::ItemPath;
use proptest::prelude::*;

fn segment() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9]{0,6}"
}

fn item_path() -> impl Strategy<Value = ItemPath> {
    prop::collection::vec(segment(), 1..5)
        .prop_map(|segments| ItemPath::new(segments.join("/")).unwrap())
}

proptest! {
    #[test]
    fn admit_all_admits_everything(path in item_path(), is_dir in any::<bool>()) {
        prop_assert!(ScopeFilter::admit_all().admits(&path, is_dir));
    }

    #[test]
    fn excluded_prefix_rejects_whole_subtree(prefix in item_path(), rest in item_path(), is_dir in any::<bool>()) {
        let filter = ScopeFilter::from_spec(&ScopeFilterSpec {
            exclude_subdirectories: vec![prefix.to_string()],
            ..ScopeFilterSpec::default()
        }).unwrap();

        prop_assert!(!filter.admits(&prefix, true));
        let nested = ItemPath::new(format!("{prefix}/{rest}")).unwrap();
        prop_assert!(!filter.admits(&nested, is_dir));
    }

    #[test]
    fn sibling_with_shared_name_prefix_is_admitted(prefix in item_path(), suffix in "[a-z0-9]{1,4}") {
        let filter = ScopeFilter::from_spec(&ScopeFilterSpec {
            exclude_subdirectories: vec![prefix.to_string()],
            ..ScopeFilterSpec::default()
        }).unwrap();

        let sibling = ItemPath::new(format!("{prefix}{suffix}")).unwrap();
        prop_assert!(filter.admits(&sibling, false));
    }

    #[test]
    fn exclude_directories_keeps_only_root_files(path in item_path()) {
        let filter = ScopeFilter::from_spec(&ScopeFilterSpec {
            exclude_directories: true,
            ..ScopeFilterSpec::default()
        }).unwrap();

        prop_assert!(!filter.admits(&path, true));
        prop_assert_eq!(filter.admits(&path, false), path.depth() == 1);
    }

    #[test]
    fn name_patterns_never_hide_directories(path in item_path(), stem in segment()) {
        let filter = ScopeFilter::from_spec(&ScopeFilterSpec {
            include_file_name_patterns: vec!["*.html".into()],
            ..ScopeFilterSpec::default()
        }).unwrap();

        prop_assert!(filter.admits(&path, true));
        let page = ItemPath::new(format!("{path}/{stem}.HTML")).unwrap();
        prop_assert!(filter.admits(&page, false));
        let other = ItemPath::new(format!("{path}/{stem}.txt")).unwrap();
        prop_assert!(!filter.admits(&other, false));
    }
}
