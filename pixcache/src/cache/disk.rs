//! On-disk image tier.
//!
//! Stores each cached image as a flat file under the cache directory:
//!
//! ```text
//! {cache_dir}/{key}.img
//! ```
//!
//! The key is already a fixed-width hex digest, so it is used verbatim as
//! the filename. Writes land in `{key}.img.tmp` first and are renamed into
//! place, so a crashed write never leaves a partial file under the live name.
//!
//! Bookkeeping lives in [`MetadataStore`]; this tier never decides a key is
//! live on its own. A metadata entry whose file has vanished is purged on
//! the next lookup.

use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use tracing::{debug, warn};

use crate::cache::key::CacheKey;
use crate::cache::metadata::MetadataStore;
use crate::cache::types::{CacheEntry, CacheError};

/// Extension of live image files.
const IMAGE_EXTENSION: &str = "img";

/// Suffix of in-progress writes.
const TEMP_SUFFIX: &str = ".img.tmp";

/// Disk tier backed by a [`MetadataStore`].
pub struct DiskTier {
    directory: PathBuf,
    metadata: Arc<MetadataStore>,
}

impl DiskTier {
    /// Open the tier, creating the cache directory if needed.
    pub async fn open(
        directory: impl Into<PathBuf>,
        metadata: Arc<MetadataStore>,
    ) -> Result<Self, CacheError> {
        let directory = directory.into();
        tokio::fs::create_dir_all(&directory)
            .await
            .map_err(|e| CacheError::storage(&directory, e))?;
        Ok(Self {
            directory,
            metadata,
        })
    }

    /// Cache directory.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Live file path for a key.
    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.directory
            .join(format!("{}.{}", key.as_str(), IMAGE_EXTENSION))
    }

    fn temp_path_for(&self, key: &CacheKey) -> PathBuf {
        self.directory.join(format!("{}{}", key.as_str(), TEMP_SUFFIX))
    }

    /// Look up the cached file for `key`.
    ///
    /// On a hit the access is recorded in metadata. If metadata points at a
    /// file that no longer exists, the entry is purged and `None` returned.
    pub async fn read(&self, key: &CacheKey) -> Result<Option<PathBuf>, CacheError> {
        let Some(entry) = self.metadata.get(key) else {
            return Ok(None);
        };
        let Some(path) = entry.local_path else {
            return Ok(None);
        };

        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => {
                self.metadata.record_access(key).await;
                Ok(Some(path))
            }
            Ok(_) => {
                warn!(key = %key, path = %path.display(), "Cached path is not a file, purging entry");
                self.metadata.remove(key).await?;
                Ok(None)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(key = %key, path = %path.display(), "Cached file vanished, purging entry");
                self.metadata.remove(key).await?;
                Ok(None)
            }
            Err(e) => Err(CacheError::storage(path, e)),
        }
    }

    /// Persist `data` for `key` and record it in metadata.
    ///
    /// Nothing is recorded unless both the file and the metadata landed; a
    /// failed write never leaves a live entry behind.
    pub async fn write(
        &self,
        key: &CacheKey,
        source_uri: &str,
        variant: Option<&str>,
        data: &[u8],
    ) -> Result<PathBuf, CacheError> {
        let path = self.path_for(key);
        let temp_path = self.temp_path_for(key);

        if let Err(e) = tokio::fs::write(&temp_path, data).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(CacheError::storage(temp_path, e));
        }
        if let Err(e) = tokio::fs::rename(&temp_path, &path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(CacheError::storage(path, e));
        }

        let entry = CacheEntry::new(
            source_uri,
            variant.map(str::to_string),
            Some(path.clone()),
            data.len() as u64,
            Utc::now(),
        );
        if let Err(e) = self.metadata.upsert(key.clone(), entry).await {
            self.metadata.discard(key);
            let _ = tokio::fs::remove_file(&path).await;
            return Err(e);
        }

        debug!(key = %key, bytes = data.len(), "Wrote image to disk tier");
        Ok(path)
    }

    /// Read the bytes of a cached file.
    pub async fn read_bytes(&self, path: &Path) -> Result<Bytes, CacheError> {
        tokio::fs::read(path)
            .await
            .map(Bytes::from)
            .map_err(|e| CacheError::storage(path, e))
    }

    /// Delete the file and metadata entry for `key`.
    ///
    /// Idempotent: a missing file or entry is not an error. Returns the
    /// number of bytes the entry accounted for (0 if it was not live).
    pub async fn remove(&self, key: &CacheKey) -> Result<u64, CacheError> {
        let entry = self.metadata.get(key);
        let path = entry
            .as_ref()
            .and_then(|e| e.local_path.clone())
            .unwrap_or_else(|| self.path_for(key));

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(CacheError::storage(path, e)),
        }

        let removed = self.metadata.remove(key).await?;
        Ok(removed.map_or(0, |e| e.size_bytes))
    }

    /// Delete every image file and clear metadata.
    ///
    /// Individual deletion failures are logged and skipped. Returns the
    /// number of files deleted.
    pub async fn clear(&self) -> Result<usize, CacheError> {
        let mut deleted = 0;
        for path in self.image_files().await? {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => deleted += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to delete cached file");
                }
            }
        }
        self.metadata.clear().await?;
        Ok(deleted)
    }

    /// Delete files metadata does not know about, plus leftover temp files.
    ///
    /// Run at startup after metadata has loaded. Returns the number of
    /// files deleted.
    pub async fn remove_orphans(&self) -> Result<usize, CacheError> {
        let known: HashSet<CacheKey> = self.metadata.snapshot().into_keys().collect();
        let mut deleted = 0;

        for path in self.image_files().await? {
            let orphaned = match classify(&path) {
                FileKind::Temp => true,
                FileKind::Image(Some(key)) => !known.contains(&key),
                FileKind::Image(None) => true,
                FileKind::Other => false,
            };
            if !orphaned {
                continue;
            }
            match tokio::fs::remove_file(&path).await {
                Ok(()) => deleted += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to delete orphaned file");
                }
            }
        }

        if deleted > 0 {
            debug!(deleted = deleted, "Removed orphaned cache files");
        }
        Ok(deleted)
    }

    /// Image and temp files in the cache directory.
    async fn image_files(&self) -> Result<Vec<PathBuf>, CacheError> {
        let mut files = Vec::new();
        let mut dir = match tokio::fs::read_dir(&self.directory).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(files),
            Err(e) => return Err(CacheError::storage(&self.directory, e)),
        };

        while let Some(dirent) = dir
            .next_entry()
            .await
            .map_err(|e| CacheError::storage(&self.directory, e))?
        {
            let path = dirent.path();
            if !matches!(classify(&path), FileKind::Other) {
                files.push(path);
            }
        }
        Ok(files)
    }
}

enum FileKind {
    Temp,
    Image(Option<CacheKey>),
    Other,
}

fn classify(path: &Path) -> FileKind {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return FileKind::Other;
    };
    if name.ends_with(TEMP_SUFFIX) {
        return FileKind::Temp;
    }
    match name.rsplit_once('.') {
        Some((stem, IMAGE_EXTENSION)) => FileKind::Image(CacheKey::parse(stem)),
        _ => FileKind::Other,
    }
}
