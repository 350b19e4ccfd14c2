//! CLI argument parsing using clap derive

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// blobsync - Keep a local directory and a blob container in sync
#[derive(Parser, Debug)]
#[command(name = "blobsync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (.toml, .json or .yaml)
    #[arg(
        short,
        long,
        global = true,
        env = "BLOBSYNC_CONFIG",
        default_value = "blobsync.toml"
    )]
    pub config: PathBuf,

    /// The command to run
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Synchronize until shut down
    ///
    /// Runs passes on the configured interval. Ctrl-C or SIGTERM stops after
    /// the pass in flight; SIGHUP reloads the interval from the config file.
    Run {
        /// Run a single pass and exit
        #[arg(long)]
        once: bool,
    },

    /// Show replica identities and knowledge
    Status {
        /// Output as JSON for scripting
        #[arg(long)]
        json: bool,
    },

    /// Load and validate the configuration file
    CheckConfig,

    /// Delete all sync state; the next run starts from scratch
    Reset {
        /// Confirm deletion
        #[arg(long)]
        yes: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_run_once() {
        let cli = Cli::try_parse_from(["blobsync", "run", "--once"]).unwrap();
        assert_eq!(cli.command, Some(Commands::Run { once: true }));
        assert!(!cli.verbose);
    }

    #[test]
    fn parse_global_config_after_subcommand() {
        let cli =
            Cli::try_parse_from(["blobsync", "status", "--config", "/etc/blobsync.toml", "-v"])
                .unwrap();
        assert_eq!(cli.config, PathBuf::from("/etc/blobsync.toml"));
        assert!(cli.verbose);
        assert_eq!(cli.command, Some(Commands::Status { json: false }));
    }

    #[test]
    fn parse_reset_yes() {
        let cli = Cli::try_parse_from(["blobsync", "reset", "--yes"]).unwrap();
        assert_eq!(cli.command, Some(Commands::Reset { yes: true }));
    }

    #[test]
    fn parse_check_config() {
        let cli = Cli::try_parse_from(["blobsync", "check-config"]).unwrap();
        assert_eq!(cli.command, Some(Commands::CheckConfig));
    }
}
