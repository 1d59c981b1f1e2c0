//! File-based configuration (`~/.pixcache/config.ini`).
//!
//! ```ini
//! [cache]
//! directory = ~/.cache/pixcache
//! memory_size = 64MB
//! disk_size = 512MB
//! disk_ttl = 7d
//!
//! [cdn]
//! url_template = https://imagedelivery.net/<account>/{id}/{variant}
//! ```
//!
//! [`ConfigFile::to_cache_config`] turns the loaded file into an
//! [`ImageCacheConfig`](crate::service::ImageCacheConfig).

mod file;
mod parser;
mod settings;
mod size;
mod writer;

pub use file::{config_directory, config_file_path, ConfigFileError};
pub use settings::{CacheSettings, CdnSettings, ConfigFile, HttpSettings, PrefetchSettings};
pub use size::{format_duration, format_size, parse_duration, parse_size, ParseValueError};
