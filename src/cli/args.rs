//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// lease-proxy - Read content through an auto-refreshing lease proxy
///
/// Serves files through a read proxy backed by an in-memory leaser, which
/// can be told to revoke its leases to exercise transparent refetching.
#[derive(Parser, Debug)]
#[command(name = "lease-proxy")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "LEASE_PROXY_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Read a file through a read proxy
    Cat(CatArgs),

    /// Show or edit configuration
    Config(ConfigArgs),
}

/// Arguments for the cat command
#[derive(Parser, Debug)]
pub struct CatArgs {
    /// File to serve as proxied content
    pub path: PathBuf,

    /// Start reading at this byte offset
    #[arg(long, default_value = "0")]
    pub offset: u64,

    /// Stop after this many bytes
    #[arg(long)]
    pub length: Option<u64>,

    /// Bytes per read (default: from config)
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Revoke all leases after every N reads (default: from config)
    #[arg(long)]
    pub revoke_every: Option<u64>,

    /// Print a SHA-256 digest instead of the content
    #[arg(long)]
    pub digest: bool,

    /// Print the summary as JSON on stdout
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Set a configuration value
    Set {
        /// Configuration key (e.g., read.chunk_size)
        key: String,
        /// Value to set
        value: String,
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
    fn parse_cat() {
        let cli = Cli::parse_from([
            "lease-proxy",
            "cat",
            "data.bin",
            "--offset",
            "10",
            "--revoke-every",
            "2",
            "--digest",
        ]);

        match cli.command {
            Commands::Cat(args) => {
                assert_eq!(args.path, PathBuf::from("data.bin"));
                assert_eq!(args.offset, 10);
                assert_eq!(args.revoke_every, Some(2));
                assert!(args.digest);
                assert!(!args.json);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
