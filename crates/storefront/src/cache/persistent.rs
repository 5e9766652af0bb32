//! Persistent cache tier.
//!
//! The persisted copy only seeds a cold start, so every failure here is
//! logged and absorbed by the caller. [`FileTier`] writes one JSON file per
//! key; [`DisabledTier`] is used when no cache directory is configured or
//! the directory cannot be created.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::entry::{CacheEntry, CacheKey};

/// Errors from a persistent tier.
#[derive(Debug, Error)]
pub enum TierError {
    /// Filesystem operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored entry could not be decoded.
    #[error("corrupt entry: {0}")]
    Corrupt(#[from] serde_json::Error),

    /// Tier is not available in this environment.
    #[error("persistent tier unavailable")]
    Unavailable,
}

/// A slower, durable cache tier.
#[async_trait]
pub trait PersistentTier: Send + Sync {
    /// A name for tracing.
    fn name(&self) -> &'static str;

    /// Whether writes are worth queueing at all.
    fn enabled(&self) -> bool {
        true
    }

    /// Load the entry for `key`. Expiry is the caller's concern.
    async fn load(&self, key: &CacheKey) -> Result<Option<CacheEntry>, TierError>;

    /// Store `entry` under `key`, replacing any previous one.
    async fn store(&self, key: &CacheKey, entry: &CacheEntry) -> Result<(), TierError>;

    /// Remove `key`. Removing a missing key is not an error.
    async fn remove(&self, key: &CacheKey) -> Result<(), TierError>;
}

/// Tier that stores nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledTier;

#[async_trait]
impl PersistentTier for DisabledTier {
    fn name(&self) -> &'static str {
        "disabled"
    }

    fn enabled(&self) -> bool {
        false
    }

    async fn load(&self, _key: &CacheKey) -> Result<Option<CacheEntry>, TierError> {
        Ok(None)
    }

    async fn store(&self, _key: &CacheKey, _entry: &CacheEntry) -> Result<(), TierError> {
        Err(TierError::Unavailable)
    }

    async fn remove(&self, _key: &CacheKey) -> Result<(), TierError> {
        Ok(())
    }
}

/// JSON-file tier: `<dir>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FileTier {
    dir: PathBuf,
}

impl FileTier {
    /// Open (and create if needed) the cache directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, TierError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    /// The directory holding the cache files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Delete every cache file in the directory. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read or a file cannot be removed.
    pub async fn clear(&self) -> Result<usize, TierError> {
        let mut removed = 0;
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                tokio::fs::remove_file(&path).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[async_trait]
impl PersistentTier for FileTier {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn load(&self, key: &CacheKey) -> Result<Option<CacheEntry>, TierError> {
        match tokio::fs::read(self.path(key)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn store(&self, key: &CacheKey, entry: &CacheEntry) -> Result<(), TierError> {
        let bytes = serde_json::to_vec(entry)?;
        let path = self.path(key);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(key = %key, "Persisted cache entry");
        Ok(())
    }

    async fn remove(&self, key: &CacheKey) -> Result<(), TierError> {
        match tokio::fs::remove_file(self.path(key)).await {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

/// Open a file tier at `dir`, or fall back to [`DisabledTier`].
///
/// Unavailability (no directory configured, read-only or sandboxed
/// filesystem) is logged and never reported to the caller.
pub async fn open_or_disabled(dir: Option<&Path>) -> Arc<dyn PersistentTier> {
    let Some(dir) = dir else {
        info!("No cache directory configured, using memory-only cache");
        return Arc::new(DisabledTier);
    };

    match FileTier::open(dir).await {
        Ok(tier) => {
            info!(dir = %dir.display(), "Persistent cache tier ready");
            Arc::new(tier)
        }
        Err(e) => {
            warn!(
                dir = %dir.display(),
                error = %e,
                "Persistent cache tier unavailable, falling back to memory-only"
            );
            Arc::new(DisabledTier)
        }
    }
}
