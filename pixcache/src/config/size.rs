//! Human-readable sizes ("512MB", "2GB") and durations ("30s", "7d").

use std::time::Duration;

use thiserror::Error;

const KB: u64 = 1024;
const MB: u64 = KB * 1024;
const GB: u64 = MB * 1024;
const TB: u64 = GB * 1024;

/// Longest suffix first so "MB" wins over "B".
const SIZE_UNITS: [(&str, u64); 9] = [
    ("TB", TB),
    ("GB", GB),
    ("MB", MB),
    ("KB", KB),
    ("T", TB),
    ("G", GB),
    ("M", MB),
    ("K", KB),
    ("B", 1),
];

const DURATION_UNITS: [(&str, u64); 4] = [("d", 86_400), ("h", 3_600), ("m", 60), ("s", 1)];

/// A size or duration string that could not be parsed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseValueError {
    #[error("Invalid size '{0}' - expected format like '512MB', '2GB', or '1024KB'")]
    Size(String),

    #[error("Invalid duration '{0}' - expected format like '30s', '15m', '12h', or '7d'")]
    Duration(String),
}

/// Parse a size into bytes.
///
/// Bare numbers are bytes. Suffixes `B`, `K`/`KB`, `M`/`MB`, `G`/`GB` and
/// `T`/`TB` are binary multiples, case-insensitive, with optional space.
///
/// ```
/// use pixcache::config::parse_size;
///
/// assert_eq!(parse_size("1024").unwrap(), 1024);
/// assert_eq!(parse_size("512MB").unwrap(), 512 * 1024 * 1024);
/// assert_eq!(parse_size("2 gb").unwrap(), 2 * 1024 * 1024 * 1024);
/// ```
pub fn parse_size(s: &str) -> Result<u64, ParseValueError> {
    let trimmed = s.trim();
    let upper = trimmed.to_ascii_uppercase();

    let (number, multiplier) = SIZE_UNITS
        .iter()
        .find_map(|(suffix, multiplier)| {
            upper
                .strip_suffix(suffix)
                .map(|number| (number.trim(), *multiplier))
        })
        .unwrap_or((upper.as_str(), 1));

    number
        .parse::<u64>()
        .ok()
        .and_then(|n| n.checked_mul(multiplier))
        .ok_or_else(|| ParseValueError::Size(trimmed.to_string()))
}

/// Format bytes with the largest unit that divides them exactly.
///
/// The output always parses back to the same value with [`parse_size`].
///
/// ```
/// use pixcache::config::format_size;
///
/// assert_eq!(format_size(512 * 1024 * 1024), "512MB");
/// assert_eq!(format_size(1500), "1500B");
/// ```
pub fn format_size(bytes: u64) -> String {
    for (suffix, unit) in [("TB", TB), ("GB", GB), ("MB", MB), ("KB", KB)] {
        if bytes >= unit && bytes % unit == 0 {
            return format!("{}{}", bytes / unit, suffix);
        }
    }
    format!("{}B", bytes)
}

/// Parse a duration with an `s`, `m`, `h` or `d` suffix. Bare numbers are seconds.
///
/// ```
/// use std::time::Duration;
/// use pixcache::config::parse_duration;
///
/// assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
/// assert_eq!(parse_duration("7d").unwrap(), Duration::from_secs(7 * 86_400));
/// ```
pub fn parse_duration(s: &str) -> Result<Duration, ParseValueError> {
    let trimmed = s.trim();
    let lower = trimmed.to_ascii_lowercase();

    let (number, multiplier) = DURATION_UNITS
        .iter()
        .find_map(|(suffix, multiplier)| {
            lower
                .strip_suffix(suffix)
                .map(|number| (number.trim(), *multiplier))
        })
        .unwrap_or((lower.as_str(), 1));

    number
        .parse::<u64>()
        .ok()
        .and_then(|n| n.checked_mul(multiplier))
        .map(Duration::from_secs)
        .ok_or_else(|| ParseValueError::Duration(trimmed.to_string()))
}

/// Format a duration with the largest unit that divides it exactly.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    for (suffix, unit) in DURATION_UNITS {
        if secs >= unit && secs % unit == 0 {
            return format!("{}{}", secs / unit, suffix);
        }
    }
    format!("{}s", secs)
}
