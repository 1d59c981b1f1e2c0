//! CLI error handling with user-friendly messages.
//!
//! Centralizes error formatting and exit codes for every command.

use std::fmt;
use std::process;

use pixcache::config::ConfigFileError;
use pixcache::service::ImageCacheError;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Config file could not be read or holds an invalid value
    Config(ConfigFileError),
    /// Cache could not be opened
    CacheOpen(ImageCacheError),
    /// Resolving an image failed
    Fetch { uri: String, error: ImageCacheError },
    /// Clearing or evicting failed
    Maintenance(ImageCacheError),
}

impl CliError {
    /// Print the error plus any hints and exit with status 1.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        match self {
            CliError::Config(ConfigFileError::InvalidValue { .. }) => {
                eprintln!();
                eprintln!("Fix the value in the config file shown by: pixcache config path");
            }
            CliError::CacheOpen(ImageCacheError::Config(_)) => {
                eprintln!();
                eprintln!("Check the effective settings with: pixcache config show");
            }
            CliError::Fetch { error, .. } if error.is_retryable() => {
                eprintln!();
                eprintln!("The image could not be fetched right now. Common causes:");
                eprintln!("  1. No network connection");
                eprintln!("  2. The URI or CDN id is wrong");
                eprintln!("  3. The CDN URL template in [cdn] does not match your account");
            }
            _ => {}
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Config(e) => write!(f, "{}", e),
            CliError::CacheOpen(e) => write!(f, "Failed to open cache: {}", e),
            CliError::Fetch { uri, error } => write!(f, "Failed to get '{}': {}", uri, error),
            CliError::Maintenance(e) => write!(f, "Cache maintenance failed: {}", e),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Config(e) => Some(e),
            CliError::CacheOpen(e) => Some(e),
            CliError::Fetch { error, .. } => Some(error),
            CliError::Maintenance(e) => Some(e),
            CliError::LoggingInit(_) => None,
        }
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::Config(e)
    }
}
