//! CLI command implementations.
//!
//! - [`image`] - resolve and prefetch images (get, prefetch)
//! - [`cache`] - cache maintenance (stats, clear, evict)
//! - [`config`] - configuration file (path, show, init)

pub mod cache;
pub mod config;
pub mod image;
