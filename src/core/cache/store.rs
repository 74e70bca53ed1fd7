//! Durable cache store for synthesized audio.
//!
//! Entries survive process restarts when the filesystem backend is used and
//! expire once they are older than the configured TTL. The [`CacheStore`]
//! facade never lets a storage failure reach the caller: reads degrade to a
//! miss, writes become no-ops, and the failure is logged.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bytes::Bytes;
use moka::future::Cache as MokaCache;
use moka::notification::RemovalCause;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use xxhash_rust::xxh3::xxh3_128;

use super::key::CacheKey;
use super::locks::KeyLocks;

/// Default entry lifetime: 30 days.
pub const DEFAULT_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Errors that can occur during cache operations.
#[derive(Error, Debug)]
pub enum CacheError {
    /// I/O error occurred during filesystem operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Metadata could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Backend-specific error.
    #[error("Cache backend error: {0}")]
    Backend(String),
}

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

/// Milliseconds since the UNIX epoch.
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// A persisted utterance.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub audio: Bytes,
    /// Write time in milliseconds since the UNIX epoch. Never updated after the write.
    pub stored_at_ms: u64,
}

fn is_expired(stored_at_ms: u64, ttl: Duration, now_ms: u64) -> bool {
    now_ms.saturating_sub(stored_at_ms) > ttl.as_millis() as u64
}

/// Interface every durable backend implements.
///
/// Implementations must tolerate `get`/`put`/`delete` on one key interleaving
/// with `sweep_expired` without corrupting entries.
#[async_trait]
pub trait DurableCacheStore: Send + Sync {
    /// Returns the entry, or `None` when absent or expired. Expired entries are deleted.
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>>;

    /// Upserts the entry with `stored_at = now`.
    async fn put(&self, key: &CacheKey, audio: Bytes) -> Result<()>;

    /// Removes the entry. Deleting an absent key succeeds.
    async fn delete(&self, key: &CacheKey) -> Result<()>;

    /// Removes every entry.
    async fn clear(&self) -> Result<()>;

    /// Removes every entry older than the TTL and returns how many were removed.
    async fn sweep_expired(&self) -> Result<usize>;

    /// Number of stored entries. Expired entries not yet swept may be included.
    async fn entry_count(&self) -> Result<usize>;

    /// Removes the oldest entries until at most `max_entries` remain.
    async fn evict_oldest(&self, max_entries: usize) -> Result<usize>;

    /// Returns the backend type as a string identifier.
    fn backend_type(&self) -> &str;
}

// =============================================================================
// Memory backend
// =============================================================================

/// Longest expiry handed to moka, which rejects durations beyond 1000 years.
const MAX_MEMORY_EXPIRY: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Process-local backend used when no cache path is configured or the
/// filesystem backend cannot be opened.
///
/// Entries expire `ttl` after their write, which is when `stored_at_ms` is
/// taken. moka drops them; `sweep_expired` reports how many expirations
/// happened since the previous sweep.
pub struct MemoryCacheStore {
    cache: MokaCache<CacheKey, CacheEntry>,
    expired: Arc<AtomicUsize>,
}

impl MemoryCacheStore {
    pub fn new(ttl: Duration) -> Self {
        let expired = Arc::new(AtomicUsize::new(0));
        let counter = expired.clone();
        let cache = MokaCache::builder()
            .time_to_live(ttl.min(MAX_MEMORY_EXPIRY))
            .eviction_listener(move |_key, _value, cause| {
                if cause == RemovalCause::Expired {
                    counter.fetch_add(1, Ordering::Relaxed);
                }
            })
            .build();
        Self { cache, expired }
    }

    async fn insert_entry(&self, key: &CacheKey, audio: Bytes, stored_at_ms: u64) {
        let entry = CacheEntry {
            key: key.clone(),
            audio,
            stored_at_ms,
        };
        self.cache.insert(key.clone(), entry).await;
    }
}

#[async_trait]
impl DurableCacheStore for MemoryCacheStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        Ok(self.cache.get(key).await)
    }

    async fn put(&self, key: &CacheKey, audio: Bytes) -> Result<()> {
        self.insert_entry(key, audio, now_millis()).await;
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> Result<()> {
        self.cache.invalidate(key).await;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
        Ok(())
    }

    async fn sweep_expired(&self) -> Result<usize> {
        self.cache.run_pending_tasks().await;
        Ok(self.expired.swap(0, Ordering::Relaxed))
    }

    async fn entry_count(&self) -> Result<usize> {
        self.cache.run_pending_tasks().await;
        Ok(self.cache.entry_count() as usize)
    }

    async fn evict_oldest(&self, max_entries: usize) -> Result<usize> {
        let mut by_age: Vec<(u64, Arc<CacheKey>)> = self
            .cache
            .iter()
            .map(|(key, entry)| (entry.stored_at_ms, key))
            .collect();
        if by_age.len() <= max_entries {
            return Ok(0);
        }

        by_age.sort();
        let excess = by_age.len() - max_entries;
        for (_, key) in by_age.into_iter().take(excess) {
            self.cache.invalidate(key.as_ref()).await;
        }
        self.cache.run_pending_tasks().await;
        Ok(excess)
    }

    fn backend_type(&self) -> &str {
        "memory"
    }
}

// =============================================================================
// Filesystem backend
// =============================================================================

/// Metadata stored next to each audio file.
#[derive(Debug, Serialize, Deserialize)]
struct CacheEntryMeta {
    key: String,
    stored_at_ms: u64,
    size: usize,
}

/// Filesystem backend: one audio file and one JSON metadata file per key,
/// sharded by the first two hex digits of the key hash.
pub struct FilesystemCacheStore {
    base_path: PathBuf,
    ttl: Duration,
    locks: KeyLocks,
}

impl FilesystemCacheStore {
    /// Opens (creating if needed) a store rooted at `base_path`.
    pub async fn new(base_path: PathBuf, ttl: Duration) -> Result<Self> {
        fs::create_dir_all(&base_path).await?;
        Ok(Self {
            base_path,
            ttl,
            locks: KeyLocks::new(),
        })
    }

    fn data_path(&self, key: &str) -> PathBuf {
        let hash = format!("{:032x}", xxh3_128(key.as_bytes()));
        let dir = &hash[0..2];
        self.base_path.join(dir).join(format!("{hash}.audio"))
    }

    fn meta_path(&self, key: &str) -> PathBuf {
        self.data_path(key).with_extension("meta")
    }

    async fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
        let temp_path = path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&temp_path, path).await?;
        Ok(())
    }

    /// Writes an entry with an explicit timestamp. Caller holds the key lock.
    async fn write_entry(&self, key: &str, audio: &Bytes, stored_at_ms: u64) -> Result<()> {
        let data_path = self.data_path(key);
        if let Some(parent) = data_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        Self::write_atomic(&data_path, audio).await?;

        let meta = CacheEntryMeta {
            key: key.to_string(),
            stored_at_ms,
            size: audio.len(),
        };
        let meta_json = serde_json::to_vec(&meta)?;
        Self::write_atomic(&self.meta_path(key), &meta_json).await
    }

    async fn remove_files(&self, key: &str) {
        let _ = fs::remove_file(self.data_path(key)).await;
        let _ = fs::remove_file(self.meta_path(key)).await;
    }

    async fn read_meta(path: &Path) -> Result<Option<CacheEntryMeta>> {
        match fs::read(path).await {
            Ok(data) => Ok(Some(serde_json::from_slice(&data)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Lists the metadata of every stored entry.
    async fn scan(&self) -> Result<Vec<(PathBuf, Option<CacheEntryMeta>)>> {
        let mut found = Vec::new();
        let mut shards = match fs::read_dir(&self.base_path).await {
            Ok(shards) => shards,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(found),
            Err(e) => return Err(e.into()),
        };

        while let Some(shard) = shards.next_entry().await? {
            if !shard.file_type().await?.is_dir() {
                continue;
            }
            let mut files = fs::read_dir(shard.path()).await?;
            while let Some(file) = files.next_entry().await? {
                let path = file.path();
                if path.extension().and_then(|e| e.to_str()) != Some("meta") {
                    continue;
                }
                // Unreadable metadata is reported as `None`; vanished files are skipped.
                match Self::read_meta(&path).await {
                    Ok(Some(meta)) => found.push((path, Some(meta))),
                    Ok(None) => {}
                    Err(_) => found.push((path, None)),
                }
            }
        }
        Ok(found)
    }

    /// Removes a scanned meta file that could not be parsed, plus its audio file.
    async fn remove_corrupt(meta_path: &Path) {
        warn!("Removing unreadable cache metadata {:?}", meta_path);
        let _ = fs::remove_file(meta_path.with_extension("audio")).await;
        let _ = fs::remove_file(meta_path).await;
    }
}

#[async_trait]
impl DurableCacheStore for FilesystemCacheStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        let _guard = self.locks.lock(key.as_str()).await;

        let meta = match Self::read_meta(&self.meta_path(key.as_str())).await {
            Ok(Some(meta)) => meta,
            Ok(None) => return Ok(None),
            Err(CacheError::Serialization(e)) => {
                warn!("Corrupt cache metadata for {}: {}", key, e);
                self.remove_files(key.as_str()).await;
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        // Distinct keys sharing a hash are treated as a miss.
        if meta.key != key.as_str() {
            return Ok(None);
        }

        if is_expired(meta.stored_at_ms, self.ttl, now_millis()) {
            debug!("Cache entry expired: {}", key);
            self.remove_files(key.as_str()).await;
            return Ok(None);
        }

        match fs::read(self.data_path(key.as_str())).await {
            Ok(data) => Ok(Some(CacheEntry {
                key: key.clone(),
                audio: Bytes::from(data),
                stored_at_ms: meta.stored_at_ms,
            })),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let _ = fs::remove_file(self.meta_path(key.as_str())).await;
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, key: &CacheKey, audio: Bytes) -> Result<()> {
        let _guard = self.locks.lock(key.as_str()).await;
        self.write_entry(key.as_str(), &audio, now_millis()).await
    }

    async fn delete(&self, key: &CacheKey) -> Result<()> {
        let _guard = self.locks.lock(key.as_str()).await;
        self.remove_files(key.as_str()).await;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        warn!("Clearing filesystem cache at {:?}", self.base_path);
        let _ = fs::remove_dir_all(&self.base_path).await;
        fs::create_dir_all(&self.base_path).await?;
        Ok(())
    }

    async fn sweep_expired(&self) -> Result<usize> {
        let mut removed = 0;
        for (meta_path, meta) in self.scan().await? {
            let Some(meta) = meta else {
                Self::remove_corrupt(&meta_path).await;
                continue;
            };
            if !is_expired(meta.stored_at_ms, self.ttl, now_millis()) {
                continue;
            }

            let _guard = self.locks.lock(&meta.key).await;
            // A concurrent put may have refreshed the entry since the scan.
            match Self::read_meta(&meta_path).await {
                Ok(Some(current))
                    if is_expired(current.stored_at_ms, self.ttl, now_millis()) =>
                {
                    self.remove_files(&meta.key).await;
                    removed += 1;
                }
                _ => {}
            }
        }
        Ok(removed)
    }

    async fn entry_count(&self) -> Result<usize> {
        Ok(self.scan().await?.into_iter().filter(|(_, m)| m.is_some()).count())
    }

    async fn evict_oldest(&self, max_entries: usize) -> Result<usize> {
        let mut entries: Vec<CacheEntryMeta> =
            self.scan().await?.into_iter().filter_map(|(_, m)| m).collect();
        if entries.len() <= max_entries {
            return Ok(0);
        }

        entries.sort_by_key(|m| m.stored_at_ms);
        let excess = entries.len() - max_entries;
        for meta in entries.into_iter().take(excess) {
            let _guard = self.locks.lock(&meta.key).await;
            self.remove_files(&meta.key).await;
        }
        Ok(excess)
    }

    fn backend_type(&self) -> &str {
        "filesystem"
    }
}

// =============================================================================
// Facade
// =============================================================================

/// Durable cache configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CacheConfig {
    /// Process-local storage.
    Memory {
        #[serde(default)]
        ttl_seconds: Option<u64>,
    },
    /// Storage under a directory.
    Filesystem {
        path: PathBuf,
        #[serde(default)]
        ttl_seconds: Option<u64>,
    },
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig::Memory {
            ttl_seconds: Some(DEFAULT_TTL.as_secs()),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        let seconds = match self {
            CacheConfig::Memory { ttl_seconds } | CacheConfig::Filesystem { ttl_seconds, .. } => {
                *ttl_seconds
            }
        };
        seconds.map(Duration::from_secs).unwrap_or(DEFAULT_TTL)
    }
}

/// Failure-absorbing front of a [`DurableCacheStore`].
pub struct CacheStore {
    backend: Arc<dyn DurableCacheStore>,
}

impl CacheStore {
    /// Opens the configured backend.
    ///
    /// Never fails: if the filesystem backend cannot be opened the store
    /// degrades to memory-only caching.
    pub async fn open(config: &CacheConfig) -> Self {
        let ttl = config.ttl();
        let backend: Arc<dyn DurableCacheStore> = match config {
            CacheConfig::Memory { .. } => Arc::new(MemoryCacheStore::new(ttl)),
            CacheConfig::Filesystem { path, .. } => {
                match FilesystemCacheStore::new(path.clone(), ttl).await {
                    Ok(store) => Arc::new(store),
                    Err(e) => {
                        warn!(
                            "Cache unavailable at {:?} ({}); falling back to memory-only caching",
                            path, e
                        );
                        Arc::new(MemoryCacheStore::new(ttl))
                    }
                }
            }
        };
        Self::with_backend(backend)
    }

    pub fn with_backend(backend: Arc<dyn DurableCacheStore>) -> Self {
        Self { backend }
    }

    pub async fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        match self.backend.get(key).await {
            Ok(Some(entry)) => {
                debug!("Durable cache hit: {} ({} bytes)", key, entry.audio.len());
                Some(entry)
            }
            Ok(None) => {
                debug!("Durable cache miss: {}", key);
                None
            }
            Err(e) => {
                warn!("Durable cache read failed for {}: {}", key, e);
                None
            }
        }
    }

    pub async fn put(&self, key: &CacheKey, audio: Bytes) {
        let size = audio.len();
        match self.backend.put(key, audio).await {
            Ok(()) => debug!("Stored cache entry: {} (size: {} bytes)", key, size),
            Err(e) => warn!("Durable cache write failed for {}: {}", key, e),
        }
    }

    pub async fn delete(&self, key: &CacheKey) {
        if let Err(e) = self.backend.delete(key).await {
            warn!("Durable cache delete failed for {}: {}", key, e);
        }
    }

    pub async fn clear(&self) {
        if let Err(e) = self.backend.clear().await {
            warn!("Durable cache clear failed: {}", e);
        }
    }

    pub async fn sweep_expired(&self) -> usize {
        match self.backend.sweep_expired().await {
            Ok(removed) => removed,
            Err(e) => {
                warn!("Durable cache sweep failed: {}", e);
                0
            }
        }
    }

    pub async fn evict_oldest(&self, max_entries: usize) -> usize {
        match self.backend.evict_oldest(max_entries).await {
            Ok(removed) => removed,
            Err(e) => {
                warn!("Durable cache eviction failed: {}", e);
                0
            }
        }
    }

    pub async fn entry_count(&self) -> usize {
        match self.backend.entry_count().await {
            Ok(count) => count,
            Err(e) => {
                warn!("Durable cache count failed: {}", e);
                0
            }
        }
    }

    /// Returns the backend type identifier.
    pub fn backend_type(&self) -> &str {
        self.backend.backend_type()
    }
}
