//! Bounded in-process cache of ready-to-play audio handles.
//!
//! Eviction is by insertion order, not recency: once the cache holds more than
//! `max_entries` items the oldest `eviction_batch` entries are dropped and
//! their handles released. Entries never expire by age.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use super::key::CacheKey;

pub const DEFAULT_EPHEMERAL_MAX_ENTRIES: usize = 100;
pub const DEFAULT_EVICTION_BATCH: usize = 20;

/// Revocable reference to playable audio.
///
/// Clones share the same slot: releasing any clone revokes all of them and
/// drops the reference to the underlying bytes.
#[derive(Clone, Debug)]
pub struct PlaybackHandle {
    key: CacheKey,
    slot: Arc<RwLock<Option<Bytes>>>,
}

impl PlaybackHandle {
    pub fn new(key: CacheKey, audio: Bytes) -> Self {
        Self {
            key,
            slot: Arc::new(RwLock::new(Some(audio))),
        }
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Returns the audio, or `None` once released.
    pub fn audio(&self) -> Option<Bytes> {
        self.slot.read().clone()
    }

    pub fn is_released(&self) -> bool {
        self.slot.read().is_none()
    }

    /// Revokes the handle. Idempotent.
    pub fn release(&self) {
        self.slot.write().take();
    }
}

struct EphemeralState {
    entries: HashMap<CacheKey, PlaybackHandle>,
    order: VecDeque<CacheKey>,
}

/// Insertion-ordered handle cache.
pub struct EphemeralCache {
    state: Mutex<EphemeralState>,
    max_entries: usize,
    eviction_batch: usize,
}

impl EphemeralCache {
    pub fn new(max_entries: usize, eviction_batch: usize) -> Self {
        Self {
            state: Mutex::new(EphemeralState {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
            max_entries,
            eviction_batch: eviction_batch.max(1),
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<PlaybackHandle> {
        self.state.lock().entries.get(key).cloned()
    }

    /// Inserts audio and returns its handle.
    ///
    /// Replacing an existing key releases the previous handle and moves the key
    /// to the newest position.
    pub fn put(&self, key: CacheKey, audio: Bytes) -> PlaybackHandle {
        let handle = PlaybackHandle::new(key.clone(), audio);
        let mut state = self.state.lock();

        if let Some(previous) = state.entries.insert(key.clone(), handle.clone()) {
            previous.release();
            state.order.retain(|k| k != &key);
        }
        state.order.push_back(key);

        if state.entries.len() > self.max_entries {
            let batch = self.eviction_batch.min(state.order.len());
            for _ in 0..batch {
                let Some(oldest) = state.order.pop_front() else {
                    break;
                };
                if let Some(evicted) = state.entries.remove(&oldest) {
                    evicted.release();
                }
            }
            debug!(
                "Evicted {} ephemeral entries ({} remain)",
                batch,
                state.entries.len()
            );
        }

        handle
    }

    /// Releases every handle and empties the cache.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        for handle in state.entries.values() {
            handle.release();
        }
        state.entries.clear();
        state.order.clear();
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EphemeralCache {
    fn default() -> Self {
        Self::new(DEFAULT_EPHEMERAL_MAX_ENTRIES, DEFAULT_EVICTION_BATCH)
    }
}
