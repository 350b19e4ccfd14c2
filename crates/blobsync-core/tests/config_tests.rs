//! Tests for sync configuration loading and validation

use std::fs;
use std::time::Duration;

use blobsync_core::config::{Backend, IntervalSetting, SyncConfig};
use blobsync_core::{Error, Interval, TieBreak};
use pretty_assertions::assert_eq;
use rstest::rstest;
use tempfile::TempDir;

const FULL: &str = r#"
[local]
path = "/srv/site"
state_dir = ".state"

[remote]
backend = "azure"
container = "site-backup"
prefix = "prod"
account_name = "devstoreaccount1"
account_key = "a2V5"

[filter]
exclude_subdirectories = ["cache"]
exclude_paths = "cache, logs/tmp"
include_file_name_patterns = ["*.html"]

[schedule]
interval_seconds = 30
max_workers = 8
tie_break = "local"
"#;

fn minimal(schedule: &str) -> String {
    format!(
        r#"
[local]
path = "/srv/site"

[remote]
backend = "memory"
container = "c"

{schedule}
"#
    )
}

#[test]
fn parses_every_section() {
    let config = SyncConfig::parse(FULL).unwrap();

    assert_eq!(config.remote.backend, Backend::Azure);
    assert_eq!(config.remote.prefix.as_deref(), Some("prod"));
    assert_eq!(config.schedule.max_workers, 8);
    assert_eq!(config.schedule.tie_break, TieBreak::Local);
    assert_eq!(
        config.interval().unwrap(),
        Interval::Every(Duration::from_secs(30))
    );
    assert_eq!(config.state_dir(), std::path::PathBuf::from("/srv/site/.state"));
    config.validate().unwrap();
}

#[test]
fn legacy_exclude_paths_merge_without_duplicates() {
    let config = SyncConfig::parse(FULL).unwrap();

    let spec = config.filter.to_spec();
    assert_eq!(spec.exclude_subdirectories, vec!["cache", "logs/tmp"]);
}

#[test]
fn defaults_apply_when_sections_are_missing() {
    let config = SyncConfig::parse(&minimal("")).unwrap();

    assert_eq!(config.schedule.interval_seconds, IntervalSetting::Seconds(60));
    assert_eq!(config.schedule.max_workers, 4);
    assert_eq!(config.schedule.tie_break, TieBreak::Remote);
    assert!(config.scope_filter().unwrap().is_unrestricted());
    assert_eq!(
        config.state_dir(),
        std::path::PathBuf::from("/srv/site/.blobsync")
    );
}

#[rstest]
#[case("interval_seconds = -1", Interval::Once)]
#[case("interval_seconds = 0", Interval::Paused)]
#[case("interval_seconds = \"-5\"", Interval::Paused)]
#[case("interval_seconds = \"120\"", Interval::Every(Duration::from_secs(120)))]
fn interval_forms(#[case] line: &str, #[case] expected: Interval) {
    let config = SyncConfig::parse(&minimal(&format!("[schedule]\n{line}"))).unwrap();
    assert_eq!(config.interval().unwrap(), expected);
}

#[rstest]
#[case("[schedule]\ninterval_seconds = \"often\"")]
#[case("[schedule]\nmax_workers = 0")]
#[case("[filter]\ninclude_file_name_patterns = [\"a/*.html\"]")]
#[case("[filter]\nexclude_subdirectories = [\"../outside\"]")]
fn invalid_values_fail_validation(#[case] section: &str) {
    let config = SyncConfig::parse(&minimal(section)).unwrap();
    assert!(config.validate().is_err());
}

#[test]
fn backend_specific_settings_are_required() {
    let mut config = SyncConfig::parse(&minimal("")).unwrap();
    config.remote.backend = Backend::Filesystem;

    let err = config.validate().unwrap_err();
    assert!(matches!(err, Error::Config { .. }));
    assert!(err.to_string().contains("remote.root"));
}

#[test]
fn load_resolves_relative_paths_against_config_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("blobsync.toml");
    fs::write(
        &path,
        r#"
[local]
path = "site"

[remote]
backend = "filesystem"
container = "backup"
root = "mirror"
"#,
    )
    .unwrap();

    let config = SyncConfig::load(&path).unwrap();

    assert_eq!(config.local.path, dir.path().join("site"));
    assert_eq!(config.remote.root, Some(dir.path().join("mirror")));
}

#[test]
fn load_accepts_json() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("blobsync.json");
    fs::write(
        &path,
        r#"{
  "local": { "path": "/srv/site" },
  "remote": { "backend": "memory", "container": "c" },
  "schedule": { "interval_seconds": -1 }
}"#,
    )
    .unwrap();

    let config = SyncConfig::load(&path).unwrap();
    assert_eq!(config.interval().unwrap(), Interval::Once);
}
