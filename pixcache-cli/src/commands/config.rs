//! Configuration CLI commands: `config path`, `config show`, `config init`.

use std::path::{Path, PathBuf};

use clap::Subcommand;
use pixcache::config::{config_file_path, format_duration, format_size, ConfigFile};

use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Show the configuration file path
    Path,

    /// Show the effective settings (file values over defaults)
    Show,

    /// Write a commented config file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Run a config subcommand against `config_path` or the default location.
pub fn run(command: ConfigCommands, config_path: Option<&Path>) -> Result<(), CliError> {
    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(config_file_path);

    match command {
        ConfigCommands::Path => {
            println!("{}", path.display());
            Ok(())
        }
        ConfigCommands::Show => run_show(&path),
        ConfigCommands::Init { force } => run_init(path, force),
    }
}

fn run_show(path: &Path) -> Result<(), CliError> {
    let config = ConfigFile::load_from(path)?;
    let source = if path.exists() {
        path.display().to_string()
    } else {
        format!("{} (not found, using defaults)", path.display())
    };

    println!("Configuration: {}", source);
    println!();
    println!("[cache]");
    println!("  directory              = {}", config.cache.directory.display());
    println!("  memory_size            = {}", format_size(config.cache.memory_size));
    println!("  disk_size              = {}", format_size(config.cache.disk_size));
    println!("  disk_ttl               = {}", format_duration(config.cache.disk_ttl));
    println!("  reclaim_percent        = {}", config.cache.reclaim_percent);
    println!("  metadata_save_interval = {}", config.cache.metadata_save_interval);
    println!();
    println!("[prefetch]");
    println!("  enabled                = {}", config.prefetch.enabled);
    println!("  max_concurrent         = {}", config.prefetch.max_concurrent);
    println!();
    println!("[cdn]");
    println!(
        "  url_template           = {}",
        config.cdn.url_template.as_deref().unwrap_or("(not set)")
    );
    println!("  default_variant        = {}", config.cdn.default_variant);
    println!("  variants               = {}", config.cdn.variants.join(", "));
    println!("  fallback_enabled       = {}", config.cdn.fallback_enabled);
    println!();
    println!("[http]");
    println!("  timeout                = {}", format_duration(config.http.timeout));

    Ok(())
}

fn run_init(path: PathBuf, force: bool) -> Result<(), CliError> {
    if path.exists() && !force {
        println!("Configuration already exists at {}", path.display());
        println!("Use --force to overwrite it with defaults.");
        return Ok(());
    }

    ConfigFile::default().save_to(&path)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}
