//! lease-proxy - Auto-refreshing read proxies over evictable cached content
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use lease_proxy::cli::{Cli, Commands};
use lease_proxy::config::ConfigManager;
use lease_proxy::error::AppResult;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> AppResult<()> {
    let cli = Cli::parse();

    // Load configuration first; it decides the log format
    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let config = config_manager.load().await?;

    // Initialize logging: 0 = warn, 1 = info, 2+ = debug
    let level = match (cli.verbose, config.general.verbose) {
        (0, false) => 0,
        (0, true) => 1,
        (n, _) => n,
    };
    let filter = match level {
        0 => EnvFilter::new("lease_proxy=warn"),
        1 => EnvFilter::new("lease_proxy=info"),
        _ => EnvFilter::new("lease_proxy=debug"),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if config.general.log_format == "json" {
        subscriber.json().init();
    } else {
        subscriber.without_time().init();
    }

    debug!("Using config at {}", config_manager.path().display());

    // Dispatch to command
    match cli.command {
        Commands::Cat(args) => lease_proxy::cli::commands::cat(args, &config).await,
        Commands::Config(args) => {
            lease_proxy::cli::commands::config(args, &config_manager, &config).await
        }
    }
}
