//! Incremental cache
//!
//! A get/set store for values that are expensive to recompute between
//! builds. Keys are content-addressed (sha256 of the inputs), so a key
//! changes whenever anything it was derived from changes and stale entries
//! are simply never read again.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

/// Bumped whenever the layout of cached values changes
pub const CACHE_FORMAT_VERSION: u32 = 1;

/// Content-addressed cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Hash a namespace plus an ordered list of inputs
    pub fn derive<I, P>(namespace: &str, parts: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<[u8]>,
    {
        let mut hasher = Sha256::new();
        hasher.update(CACHE_FORMAT_VERSION.to_le_bytes());
        hasher.update(env!("CARGO_PKG_VERSION").as_bytes());
        hasher.update(namespace.as_bytes());
        for part in parts {
            let part = part.as_ref();
            hasher.update((part.len() as u64).to_le_bytes());
            hasher.update(part);
        }
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_hex(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Get/set contract for persistent and in-memory caches.
///
/// Failures are non-fatal for callers: a failed `get` is a miss and a
/// failed `set` only costs a recomputation next time.
#[async_trait]
pub trait IncrementalCache: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>>;

    async fn set(&self, key: &CacheKey, value: Vec<u8>) -> Result<()>;
}

/// Read and deserialize a JSON value, treating any failure as a miss
pub async fn get_json<T, C>(cache: &C, key: &CacheKey) -> Option<T>
where
    T: for<'de> Deserialize<'de>,
    C: IncrementalCache + ?Sized,
{
    match cache.get(key).await {
        Ok(Some(bytes)) => serde_json::from_slice(&bytes)
            .map_err(|e| debug!("Discarding unreadable cache entry {}: {}", key, e))
            .ok(),
        Ok(None) => None,
        Err(e) => {
            debug!("Cache read failed for {}: {}", key, e);
            None
        }
    }
}

/// Serialize and store a JSON value, logging failures
pub async fn set_json<T, C>(cache: &C, key: &CacheKey, value: &T)
where
    T: Serialize,
    C: IncrementalCache + ?Sized,
{
    let result = match serde_json::to_vec(value) {
        Ok(bytes) => cache.set(key, bytes).await,
        Err(e) => Err(e.into()),
    };
    if let Err(e) = result {
        debug!("Cache write failed for {}: {}", key, e);
    }
}

/// Process-local cache
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<CacheKey, Vec<u8>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl IncrementalCache for MemoryCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn set(&self, key: &CacheKey, value: Vec<u8>) -> Result<()> {
        self.entries.insert(key.clone(), value);
        Ok(())
    }
}

/// One file per entry under `<dir>/<first two hex chars>/<key>`
#[derive(Debug, Clone)]
pub struct FileSystemCache {
    dir: PathBuf,
}

impl FileSystemCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        let hex = key.as_hex();
        self.dir.join(&hex[..2]).join(hex)
    }
}

#[async_trait]
impl IncrementalCache for FileSystemCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>> {
        let path = self.entry_path(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read cache entry {}", path.display())),
        }
    }

    async fn set(&self, key: &CacheKey, value: Vec<u8>) -> Result<()> {
        let path = self.entry_path(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create cache directory {}", parent.display()))?;
        }

        // Readers only ever observe complete entries
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, value)
            .await
            .with_context(|| format!("Failed to write cache entry {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("Failed to commit cache entry {}", path.display()))?;
        Ok(())
    }
}
