//! Two-tier audio cache.
//!
//! The durable [`CacheStore`] persists synthesized audio with a TTL; the
//! [`EphemeralCache`] keeps a bounded set of ready-to-play handles in memory.

pub mod ephemeral;
pub mod key;
pub(crate) mod locks;
pub mod maintenance;
pub mod store;

pub use ephemeral::{
    DEFAULT_EPHEMERAL_MAX_ENTRIES, DEFAULT_EVICTION_BATCH, EphemeralCache, PlaybackHandle,
};
pub use key::{Accent, CacheKey, CacheKeyError, normalize_text};
pub use maintenance::{CacheMaintenance, MaintenanceReport};
pub use store::{
    CacheConfig, CacheEntry, CacheError, CacheStore, DEFAULT_TTL, DurableCacheStore,
    FilesystemCacheStore, MemoryCacheStore, Result,
};
