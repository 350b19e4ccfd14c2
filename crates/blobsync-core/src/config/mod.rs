//! Configuration of a synchronized pair
//!
//! The configuration file is read through [`blobsync_fs::ConfigStore`], so
//! TOML, JSON and YAML are all accepted:
//!
//! ```toml
//! [local]
//! path = "/srv/site"
//!
//! [remote]
//! backend = "azure"
//! container = "site-backup"
//! account_name = "devstoreaccount1"
//!
//! [filter]
//! exclude_subdirectories = ["cache"]
//! include_file_name_patterns = ["*.html"]
//!
//! [schedule]
//! interval_seconds = 60
//! ```

mod settings;

pub use settings::{
    Backend, FilterConfig, IntervalSetting, LocalConfig, RemoteConfig, ScheduleConfig, SyncConfig,
};
