//! INI parsing: the single place where INI key names map to struct fields.

use std::path::PathBuf;
use std::str::FromStr;

use ini::{Ini, Properties};

use super::file::ConfigFileError;
use super::settings::ConfigFile;
use super::size::{parse_duration, parse_size};

/// Parse an `Ini` into a `ConfigFile`, starting from defaults and overlaying
/// whatever the INI sets.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    if let Some(section) = ini.section(Some("cache")) {
        let s = Section::new("cache", section);
        if let Some(v) = s.non_empty("directory") {
            config.cache.directory = expand_tilde(v);
        }
        if let Some(v) = s.get("memory_size") {
            config.cache.memory_size = parse_size(v)
                .map_err(|_| s.invalid("memory_size", v, "expected format like '64MB' or '1GB'"))?;
        }
        if let Some(v) = s.get("disk_size") {
            config.cache.disk_size = parse_size(v)
                .map_err(|_| s.invalid("disk_size", v, "expected format like '512MB' or '2GB'"))?;
        }
        if let Some(v) = s.get("disk_ttl") {
            config.cache.disk_ttl = parse_duration(v)
                .map_err(|_| s.invalid("disk_ttl", v, "expected format like '12h' or '7d'"))?;
        }
        if let Some(v) = s.get("reclaim_percent") {
            let percent: u8 = s.number("reclaim_percent", v)?;
            if percent == 0 || percent > 100 {
                return Err(s.invalid("reclaim_percent", v, "must be between 1 and 100"));
            }
            config.cache.reclaim_percent = percent;
        }
        if let Some(v) = s.get("metadata_save_interval") {
            config.cache.metadata_save_interval = s.number("metadata_save_interval", v)?;
        }
    }

    if let Some(section) = ini.section(Some("prefetch")) {
        let s = Section::new("prefetch", section);
        if let Some(v) = s.get("enabled") {
            config.prefetch.enabled = parse_bool(v);
        }
        if let Some(v) = s.get("max_concurrent") {
            config.prefetch.max_concurrent = s.number("max_concurrent", v)?;
        }
    }

    if let Some(section) = ini.section(Some("cdn")) {
        let s = Section::new("cdn", section);
        if let Some(v) = s.get("url_template") {
            let v = v.trim();
            config.cdn.url_template = if v.is_empty() {
                None
            } else if v.contains(crate::remote::ID_PLACEHOLDER) {
                Some(v.to_string())
            } else {
                return Err(s.invalid("url_template", v, "must contain {id}"));
            };
        }
        if let Some(v) = s.non_empty("default_variant") {
            config.cdn.default_variant = v.to_string();
        }
        if let Some(v) = s.get("variants") {
            config.cdn.variants = v
                .split(',')
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(v) = s.get("fallback_enabled") {
            config.cdn.fallback_enabled = parse_bool(v);
        }
    }

    if let Some(section) = ini.section(Some("http")) {
        let s = Section::new("http", section);
        if let Some(v) = s.get("timeout") {
            let timeout = parse_duration(v)
                .map_err(|_| s.invalid("timeout", v, "expected format like '30s' or '2m'"))?;
            if timeout.is_zero() {
                return Err(s.invalid("timeout", v, "must be greater than zero"));
            }
            config.http.timeout = timeout;
        }
    }

    Ok(config)
}

/// One INI section plus its name, for error reporting.
struct Section<'a> {
    name: &'static str,
    properties: &'a Properties,
}

impl<'a> Section<'a> {
    fn new(name: &'static str, properties: &'a Properties) -> Self {
        Self { name, properties }
    }

    fn get(&self, key: &str) -> Option<&'a str> {
        self.properties.get(key)
    }

    fn non_empty(&self, key: &str) -> Option<&'a str> {
        self.get(key).map(str::trim).filter(|v| !v.is_empty())
    }

    fn number<T: FromStr>(&self, key: &str, value: &str) -> Result<T, ConfigFileError> {
        value
            .trim()
            .parse()
            .map_err(|_| self.invalid(key, value, "must be a non-negative integer"))
    }

    fn invalid(&self, key: &str, value: &str, reason: &str) -> ConfigFileError {
        ConfigFileError::InvalidValue {
            section: self.name.to_string(),
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Accepts true/false, yes/no, 1/0, on/off (case-insensitive).
pub(super) fn parse_bool(value: &str) -> bool {
    let v = value.trim().to_lowercase();
    v == "true" || v == "1" || v == "yes" || v == "on"
}

/// Expand a leading `~/` to the home directory.
pub(super) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}
