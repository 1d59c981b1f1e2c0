//! pixcache CLI
//!
//! Drives the image cache from the command line: resolve images, prefetch
//! variants, inspect and maintain a cache directory.

mod commands;
mod error;
mod runner;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use commands::cache::{ClearArgs, EvictArgs};
use commands::config::ConfigCommands;
use commands::image::{GetArgs, PrefetchArgs};
use error::CliError;
use runner::CliRunner;

#[derive(Parser)]
#[command(name = "pixcache")]
#[command(version = pixcache::VERSION)]
#[command(about = "Multi-tier image cache: memory, disk, CDN", long_about = None)]
struct Cli {
    /// Config file to use instead of ~/.pixcache/config.ini
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve an image to a local file and print its path
    Get(GetArgs),

    /// Fetch image variants in the background and report each outcome
    Prefetch(PrefetchArgs),

    /// Show cache statistics
    Stats,

    /// Clear cached images (both tiers unless --memory or --disk is given)
    Clear(ClearArgs),

    /// Evict least recently used images down to a target size
    Evict(EvictArgs),

    /// Inspect or create the configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        e.exit();
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    if let Commands::Config { command } = cli.command {
        return commands::config::run(command, cli.config.as_deref());
    }

    let runner = CliRunner::new(cli.config.as_deref())?;
    tracing::debug!(config = %runner.config_path().display(), "Configuration loaded");

    match cli.command {
        Commands::Get(args) => commands::image::run_get(&runner, args).await,
        Commands::Prefetch(args) => commands::image::run_prefetch(&runner, args).await,
        Commands::Stats => commands::cache::run_stats(&runner).await,
        Commands::Clear(args) => commands::cache::run_clear(&runner, args).await,
        Commands::Evict(args) => commands::cache::run_evict(&runner, args).await,
        Commands::Config { .. } => Ok(()),
    }
}
