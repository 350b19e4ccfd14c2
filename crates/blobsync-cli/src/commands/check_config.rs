//! Check-config command implementation

use std::path::Path;

use colored::Colorize;

use super::load_config;
use crate::error::Result;

/// Load and validate the configuration, then print what it describes.
pub fn run_check_config(path: &Path) -> Result<()> {
    let config = load_config(path)?;
    config.validate()?;

    println!("{} {}", "Configuration OK:".green().bold(), path.display());
    println!();
    println!("{}:     {}", "Local".dimmed(), config.local.path.display());
    if !config.local.path.is_dir() {
        println!("           {}", "directory does not exist yet".yellow());
    }
    println!("{}:     {}", "State".dimmed(), config.state_dir().display());

    let prefix = config.remote.prefix.as_deref().unwrap_or_default();
    println!(
        "{}:    {:?} container {}{}",
        "Remote".dimmed(),
        config.remote.backend,
        config.remote.container.cyan(),
        if prefix.is_empty() {
            String::new()
        } else {
            format!(" under {prefix}")
        }
    );
    println!("{}:  {}", "Interval".dimmed(), config.interval()?);
    println!(
        "{}:   {}, tie-break {:?}",
        "Workers".dimmed(),
        config.schedule.max_workers,
        config.schedule.tie_break
    );

    let filter = config.filter.to_spec();
    if !filter.exclude_subdirectories.is_empty() {
        println!(
            "{}:  {}",
            "Excluded".dimmed(),
            filter.exclude_subdirectories.join(", ")
        );
    }
    if !filter.include_file_name_patterns.is_empty() {
        println!(
            "{}:  {}",
            "Included".dimmed(),
            filter.include_file_name_patterns.join(", ")
        );
    }
    if filter.exclude_directories {
        println!("{}: root files only", "Directories".dimmed());
    }

    Ok(())
}
