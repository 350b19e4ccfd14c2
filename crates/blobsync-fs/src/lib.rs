//! Filesystem primitives for blobsync
//!
//! Provides replica-neutral item paths, crash-safe I/O with advisory locking,
//! content fingerprints, and format-agnostic configuration loading.

pub mod checksum;
pub mod config;
pub mod constants;
pub mod error;
pub mod io;
pub mod path;

pub use config::ConfigStore;
pub use constants::StatePath;
pub use error::{Error, Result};
pub use io::{FileLock, RobustnessConfig};
pub use path::ItemPath;
