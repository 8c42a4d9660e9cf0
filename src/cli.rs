use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use common::config::Configuration;

/// Erase payer/member claim partitions listed in delete-request files.
#[derive(Parser, Debug)]
#[command(name = "claimscrub", version)]
pub struct Cli {
    #[arg(long, help = "Configuration file path")]
    pub config: Option<PathBuf>,

    #[arg(short, long, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(short, long, help = "Enable quiet mode (minimal output)")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, Default)]
pub enum Commands {
    /// Process the pending delete-request files (default behavior)
    #[default]
    Run,
    /// Show current configuration and exit
    Config {
        #[arg(long, help = "Show configuration in JSON format")]
        json: bool,
    },
    /// Validate configuration and backend wiring, then exit
    Validate,
}

/// Initialize logging based on CLI arguments.
pub fn init_logging(cli: &Cli) {
    let level = if cli.quiet {
        "warn"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };

    // SAFETY: Setting RUST_LOG environment variable is safe for logging configuration
    unsafe {
        std::env::set_var("RUST_LOG", level);
    }
    tracing_subscriber::fmt::init();
}

/// Load configuration with optional override from the CLI.
pub fn load_config(config_path: Option<&Path>) -> Result<Configuration> {
    match config_path {
        Some(path) => {
            log::info!("loading configuration from: {}", path.display());
            Configuration::load_from_path(path).context("failed to load configuration")
        }
        None => Configuration::load().context("failed to load configuration"),
    }
}
