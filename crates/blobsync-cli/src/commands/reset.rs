//! Reset command implementation

use std::path::Path;

use colored::Colorize;

use super::load_config;
use crate::error::{CliError, Result};

/// Delete the state directory named by the configuration.
///
/// Without knowledge the next pass treats every item as new on both sides,
/// so identical content converges but diverging content becomes a conflict.
pub fn run_reset(path: &Path, yes: bool) -> Result<()> {
    let config = load_config(path)?;
    let state_dir = config.state_dir();

    if !state_dir.exists() {
        println!("{} nothing to reset at {}", "ok:".green(), state_dir.display());
        return Ok(());
    }
    if !yes {
        return Err(CliError::user(format!(
            "refusing to delete {} without --yes",
            state_dir.display()
        )));
    }

    std::fs::remove_dir_all(&state_dir)?;
    tracing::info!(state_dir = %state_dir.display(), "sync state deleted");
    println!("{} removed {}", "ok:".green(), state_dir.display());
    Ok(())
}
