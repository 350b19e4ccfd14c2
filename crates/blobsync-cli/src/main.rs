//! blobsync CLI
//!
//! Runs and inspects the synchronization of one local directory with one
//! blob container, as described by a configuration file.

mod cli;
mod commands;
mod error;
mod logging;

use clap::Parser;
use colored::Colorize;

use cli::{Cli, Commands};
use error::Result;

fn main() {
    if let Err(e) = run() {
        eprintln!("{}: {}", "error".red().bold(), e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    tracing::debug!(config = %cli.config.display(), "starting");

    match cli.command {
        Some(cmd) => execute_command(&cli.config, cmd),
        None => {
            // No command provided - show help hint
            println!("{} keeps a directory and a blob container in sync", "blobsync".green().bold());
            println!();
            println!("Run {} for available commands.", "blobsync --help".cyan());
            Ok(())
        }
    }
}

fn execute_command(config: &std::path::Path, cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Run { once } => commands::run_sync(config, once),
        Commands::Status { json } => commands::run_status(config, json),
        Commands::CheckConfig => commands::run_check_config(config),
        Commands::Reset { yes } => commands::run_reset(config, yes),
    }
}
