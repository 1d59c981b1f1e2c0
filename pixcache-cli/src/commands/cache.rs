//! Cache maintenance commands: `stats`, `clear`, `evict`.

use clap::Args;
use pixcache::config::{format_size, parse_size};
use pixcache::service::ClearOptions;

use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for `clear`. No flags clears both tiers.
#[derive(Debug, Args)]
pub struct ClearArgs {
    /// Clear the memory tier
    #[arg(long)]
    pub memory: bool,

    /// Clear the disk tier and its metadata
    #[arg(long)]
    pub disk: bool,
}

impl ClearArgs {
    pub fn to_options(&self) -> ClearOptions {
        if !self.memory && !self.disk {
            return ClearOptions::default();
        }
        ClearOptions {
            memory: self.memory,
            disk: self.disk,
        }
    }
}

/// Arguments for `evict`.
#[derive(Debug, Args)]
pub struct EvictArgs {
    /// Target disk usage, e.g. 256MB or 1GB
    #[arg(value_parser = parse_target)]
    pub target: u64,
}

fn parse_target(s: &str) -> Result<u64, String> {
    parse_size(s).map_err(|e| e.to_string())
}

pub async fn run_stats(runner: &CliRunner) -> Result<(), CliError> {
    runner.log_startup("stats");
    let cache = runner.open_cache().await?;

    println!("Cache: {}", cache.config().cache_dir.display());
    println!(
        "Budget: {} memory, {} disk",
        format_size(cache.config().max_memory_bytes),
        format_size(cache.config().max_disk_bytes)
    );
    println!();
    println!("{}", cache.get_stats());

    cache.shutdown().await;
    Ok(())
}

pub async fn run_clear(runner: &CliRunner, args: ClearArgs) -> Result<(), CliError> {
    runner.log_startup("clear");
    let cache = runner.open_cache().await?;
    let options = args.to_options();
    let before = cache.get_stats();

    cache
        .clear_cache(options)
        .await
        .map_err(CliError::Maintenance)?;
    cache.shutdown().await;

    if options.disk {
        println!(
            "Disk tier cleared: {} files, {}",
            before.disk_entries,
            format_size(before.disk_bytes)
        );
    }
    if options.memory {
        println!("Memory tier cleared");
    }
    Ok(())
}

pub async fn run_evict(runner: &CliRunner, args: EvictArgs) -> Result<(), CliError> {
    runner.log_startup("evict");
    let cache = runner.open_cache().await?;

    let result = cache.evict_lru(args.target).await;
    cache.shutdown().await;

    println!(
        "Evicted {} files, freed {} ({} -> {})",
        result.files_deleted,
        format_size(result.bytes_freed),
        format_size(result.size_before),
        format_size(result.size_after)
    );
    if result.size_after > args.target {
        println!(
            "Could not reach {}: remaining entries failed to delete",
            format_size(args.target)
        );
    }
    Ok(())
}
