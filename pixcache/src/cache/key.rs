//! Cache key derivation.
//!
//! Every cached image is addressed by a [`CacheKey`] derived from its source
//! URI and optional size variant. Keys double as on-disk filenames and as
//! keys in the persisted metadata map, so the derivation must be stable
//! across processes and releases.

use std::fmt;

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::xxh3_64;

/// Separates the URI from the variant section of the hashed input.
const FIELD_SEPARATOR: u8 = 0x1F;

/// Marks "no variant requested", distinct from an empty variant string.
const NO_VARIANT_TAG: u8 = 0x00;

/// Marks that a variant string follows.
const VARIANT_TAG: u8 = 0x01;

/// Length of a key in hex characters.
pub const KEY_LENGTH: usize = 16;

/// Stable identifier for a cached image.
///
/// A fixed-width lowercase hex digest, safe to use as a filename on every
/// platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Parse a key previously produced by [`KeyDeriver::derive`].
    ///
    /// Returns `None` if `s` is not a 16-character lowercase hex string.
    pub fn parse(s: &str) -> Option<Self> {
        let valid = s.len() == KEY_LENGTH
            && s
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        valid.then(|| Self(s.to_string()))
    }

    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Turns `(uri, variant)` pairs into cache keys.
///
/// Uses XXH3-64, which is fast and collision resistant enough for cache
/// addressing. This is not a security boundary.
///
/// # Example
///
/// ```
/// use pixcache::cache::KeyDeriver;
///
/// let thumb = KeyDeriver::derive("https://img.example.com/a.jpg", Some("thumbnail"));
/// let full = KeyDeriver::derive("https://img.example.com/a.jpg", None);
///
/// assert_ne!(thumb, full);
/// assert_eq!(thumb, KeyDeriver::derive("https://img.example.com/a.jpg", Some("thumbnail")));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyDeriver;

impl KeyDeriver {
    /// Derive the cache key for an image URI and optional variant.
    pub fn derive(uri: &str, variant: Option<&str>) -> CacheKey {
        let variant_len = variant.map_or(0, str::len);
        let mut input = Vec::with_capacity(uri.len() + 2 + variant_len);
        input.extend_from_slice(uri.as_bytes());
        input.push(FIELD_SEPARATOR);
        match variant {
            Some(v) => {
                input.push(VARIANT_TAG);
                input.extend_from_slice(v.as_bytes());
            }
            None => input.push(NO_VARIANT_TAG),
        }

        CacheKey(format!("{:016x}", xxh3_64(&input)))
    }
}
