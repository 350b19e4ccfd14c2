//! Command implementations

mod check_config;
mod reset;
mod run;
mod status;

pub use check_config::run_check_config;
pub use reset::run_reset;
pub use run::run_sync;
pub use status::run_status;

use std::path::Path;

use blobsync_core::SyncConfig;

use crate::error::{CliError, Result};

/// Load the configuration file, reporting a missing file plainly.
pub(crate) fn load_config(path: &Path) -> Result<SyncConfig> {
    if !path.exists() {
        return Err(CliError::user(format!(
            "configuration file not found: {} (set --config or BLOBSYNC_CONFIG)",
            path.display()
        )));
    }
    Ok(SyncConfig::load(path)?)
}
