//! Last-wins speech request coordinator.
//!
//! Every `speak` call lands in a one-slot queue. A newer call displaces the
//! pending one (which resolves `Preempted`), cancels whatever the worker is
//! doing and stops playback. A single worker drains the slot:
//!
//! ```text
//! Idle/Playing --speak--> Queued --worker--> Resolving --ok--> Playing --done--> Idle
//!                                                 \--err--> Idle
//! ```
//!
//! Resolution checks the ephemeral cache, then the durable store (promoting a
//! hit), then the backend chain. Synthesized audio goes into the ephemeral
//! cache before playback and into the durable store in the background.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{Notify, RwLock, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::stats::{CacheStatistics, CacheStats};
use super::{CoordinatorState, SpeakOutcome, SpeechError, SpeechResult, SpeechSettings};
use crate::core::cache::{
    Accent, CacheKey, CacheMaintenance, CacheStore, EphemeralCache, MaintenanceReport,
    PlaybackHandle,
};
use crate::core::playback::{PlaybackController, PlaybackOutcome};
use crate::core::tts::{BackendChain, ChainError, ChainOutcome};

type Responder = oneshot::Sender<SpeechResult<SpeakOutcome>>;

struct PendingRequest {
    id: u64,
    text: String,
    accent: Accent,
    key: CacheKey,
    responder: Responder,
}

struct InFlight {
    id: u64,
    cancel: CancellationToken,
}

/// Slot, in-flight marker and state move together under one lock.
struct QueueState {
    pending: Option<PendingRequest>,
    in_flight: Option<InFlight>,
    state: CoordinatorState,
}

/// Everything the coordinator owns.
pub struct CoordinatorParts {
    pub ephemeral: EphemeralCache,
    pub durable: Arc<CacheStore>,
    pub chain: BackendChain,
    pub playback: Arc<PlaybackController>,
    /// Durable entry cap applied by `run_maintenance`.
    pub max_durable_entries: Option<usize>,
}

struct Inner {
    ephemeral: EphemeralCache,
    durable: Arc<CacheStore>,
    maintenance: CacheMaintenance,
    chain: BackendChain,
    playback: Arc<PlaybackController>,
    stats: CacheStatistics,
    queue: Mutex<QueueState>,
    notify: Notify,
    /// Cache reads and writes hold it shared; `clear_cache` holds it exclusively.
    cache_gate: Arc<RwLock<()>>,
    next_id: AtomicU64,
    shutdown: CancellationToken,
}

pub struct SpeechCoordinator {
    inner: Arc<Inner>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SpeechCoordinator {
    /// Builds the coordinator and starts its worker. Must be called inside a Tokio runtime.
    pub fn new(parts: CoordinatorParts) -> Self {
        let maintenance = CacheMaintenance::new(parts.durable.clone(), parts.max_durable_entries);
        let inner = Arc::new(Inner {
            ephemeral: parts.ephemeral,
            durable: parts.durable,
            maintenance,
            chain: parts.chain,
            playback: parts.playback,
            stats: CacheStatistics::new(),
            queue: Mutex::new(QueueState {
                pending: None,
                in_flight: None,
                state: CoordinatorState::Idle,
            }),
            notify: Notify::new(),
            cache_gate: Arc::new(RwLock::new(())),
            next_id: AtomicU64::new(1),
            shutdown: CancellationToken::new(),
        });

        let worker = tokio::spawn(Inner::run_worker(inner.clone()));
        Self {
            inner,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Speaks `text` in `accent`.
    ///
    /// Resolves once the utterance finishes, fails, or is superseded. A
    /// superseded request resolves `Ok(SpeakOutcome::Preempted)`.
    pub async fn speak(&self, text: &str, accent: Accent) -> SpeechResult<SpeakOutcome> {
        let key = CacheKey::derive(text, accent).map_err(|_| SpeechError::InvalidText)?;
        if self.inner.shutdown.is_cancelled() {
            return Err(SpeechError::ShutDown);
        }

        let (responder, response) = oneshot::channel();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let request = PendingRequest {
            id,
            text: text.trim().to_string(),
            accent,
            key,
            responder,
        };

        let displaced = {
            let mut queue = self.inner.queue.lock();
            // `shutdown()` drains the slot under this lock; nothing may land after it.
            if self.inner.shutdown.is_cancelled() {
                return Err(SpeechError::ShutDown);
            }
            if let Some(in_flight) = &queue.in_flight {
                debug!("Request {} preempts in-flight request {}", id, in_flight.id);
                in_flight.cancel.cancel();
            }
            queue.state = CoordinatorState::Queued;
            // Stopped under the lock so the worker cannot start the new request first.
            self.inner.playback.stop();
            queue.pending.replace(request)
        };

        if let Some(displaced) = displaced {
            debug!("Request {} displaced queued request {}", id, displaced.id);
            let _ = displaced.responder.send(Ok(SpeakOutcome::Preempted));
        }
        self.inner.notify.notify_one();

        response.await.unwrap_or(Err(SpeechError::ShutDown))
    }

    /// Speaks with the user's accent when autoplay is enabled.
    pub async fn speak_autoplay(
        &self,
        text: &str,
        settings: &SpeechSettings,
    ) -> SpeechResult<SpeakOutcome> {
        if !settings.autoplay {
            return Ok(SpeakOutcome::Skipped);
        }
        self.speak(text, settings.accent).await
    }

    /// Silences output and drops any queued request.
    pub fn stop(&self) {
        let displaced = {
            let mut queue = self.inner.queue.lock();
            if let Some(in_flight) = &queue.in_flight {
                in_flight.cancel.cancel();
            }
            if queue.in_flight.is_none() {
                queue.state = CoordinatorState::Idle;
            }
            self.inner.playback.stop();
            queue.pending.take()
        };

        if let Some(displaced) = displaced {
            let _ = displaced.responder.send(Ok(SpeakOutcome::Preempted));
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.stats.snapshot(self.inner.ephemeral.len())
    }

    pub fn state(&self) -> CoordinatorState {
        self.inner.queue.lock().state
    }

    /// Empties both cache tiers and resets the counters together.
    pub async fn clear_cache(&self) {
        let _exclusive = self.inner.cache_gate.write().await;
        self.inner.ephemeral.clear();
        self.inner.durable.clear().await;
        self.inner.stats.reset();
        info!("Speech cache cleared");
    }

    /// Waits for background durable writes started so far.
    pub async fn flush(&self) {
        let _exclusive = self.inner.cache_gate.write().await;
    }

    pub async fn clean_expired(&self) -> usize {
        self.inner.maintenance.clean_expired().await
    }

    pub async fn run_maintenance(&self) -> MaintenanceReport {
        self.inner.maintenance.run_once().await
    }

    pub fn maintenance(&self) -> CacheMaintenance {
        self.inner.maintenance.clone()
    }

    pub fn durable_store(&self) -> &Arc<CacheStore> {
        &self.inner.durable
    }

    /// Stops the worker. Pending and later requests fail with `ShutDown`.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
        let displaced = {
            let mut queue = self.inner.queue.lock();
            if let Some(in_flight) = &queue.in_flight {
                in_flight.cancel.cancel();
            }
            queue.state = CoordinatorState::Idle;
            self.inner.playback.stop();
            queue.pending.take()
        };
        if let Some(displaced) = displaced {
            let _ = displaced.responder.send(Err(SpeechError::ShutDown));
        }
    }
}

impl Drop for SpeechCoordinator {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(worker) = self.worker.lock().take() {
            worker.abort();
        }
    }
}

impl Inner {
    async fn run_worker(self: Arc<Self>) {
        debug!("Speech worker started");
        loop {
            let next = {
                let mut queue = self.queue.lock();
                match queue.pending.take() {
                    Some(request) => {
                        let cancel = CancellationToken::new();
                        queue.in_flight = Some(InFlight {
                            id: request.id,
                            cancel: cancel.clone(),
                        });
                        queue.state = CoordinatorState::Resolving;
                        Some((request, cancel))
                    }
                    None => None,
                }
            };

            let Some((request, cancel)) = next else {
                tokio::select! {
                    _ = self.shutdown.cancelled() => break,
                    _ = self.notify.notified() => {}
                }
                continue;
            };

            debug!("Speech worker resolving request {} ({})", request.id, request.key);
            let result = self.process(&request, &cancel).await;

            {
                let mut queue = self.queue.lock();
                if queue.in_flight.as_ref().is_some_and(|f| f.id == request.id) {
                    queue.in_flight = None;
                }
                queue.state = if queue.pending.is_some() {
                    CoordinatorState::Queued
                } else {
                    CoordinatorState::Idle
                };
            }

            match &result {
                Ok(outcome) => debug!("Request {} finished: {:?}", request.id, outcome),
                Err(e) => error!("Request {} failed: {}", request.id, e),
            }
            let _ = request.responder.send(result);
        }
        debug!("Speech worker exited");
    }

    fn set_state(&self, id: u64, state: CoordinatorState) {
        let mut queue = self.queue.lock();
        if queue.in_flight.as_ref().is_some_and(|f| f.id == id) {
            queue.state = state;
        }
    }

    /// Returns the cached handle with its audio, captured while the cache gate
    /// is held so a later `clear_cache` cannot take it from this request.
    async fn lookup(&self, key: &CacheKey) -> Option<(PlaybackHandle, Bytes)> {
        let _shared = self.cache_gate.read().await;

        if let Some(handle) = self.ephemeral.get(key)
            && let Some(audio) = handle.audio()
        {
            debug!("Ephemeral cache hit: {}", key);
            self.stats.record_hit();
            return Some((handle, audio));
        }

        if let Some(entry) = self.durable.get(key).await {
            debug!("Promoting durable entry {} to the ephemeral cache", key);
            self.stats.record_hit();
            let handle = self.ephemeral.put(key.clone(), entry.audio.clone());
            return Some((handle, entry.audio));
        }

        self.stats.record_miss();
        None
    }

    async fn store(&self, key: &CacheKey, audio: Bytes) -> PlaybackHandle {
        let shared = self.cache_gate.clone().read_owned().await;
        let handle = self.ephemeral.put(key.clone(), audio.clone());

        let durable = self.durable.clone();
        let key = key.clone();
        tokio::spawn(async move {
            durable.put(&key, audio).await;
            drop(shared);
        });
        handle
    }

    /// Plays audio held by this request, mapping an interrupted playback to `Preempted`.
    async fn play(
        &self,
        request: &PendingRequest,
        (handle, audio): (PlaybackHandle, Bytes),
        cancel: &CancellationToken,
        completed: SpeakOutcome,
    ) -> SpeechResult<SpeakOutcome> {
        self.set_state(request.id, CoordinatorState::Playing);
        match self.playback.play_until(audio, Some(handle), cancel).await? {
            PlaybackOutcome::Completed => Ok(completed),
            PlaybackOutcome::Interrupted => Ok(SpeakOutcome::Preempted),
        }
    }

    async fn process(
        &self,
        request: &PendingRequest,
        cancel: &CancellationToken,
    ) -> SpeechResult<SpeakOutcome> {
        if let Some(cached) = self.lookup(&request.key).await {
            return self
                .play(request, cached, cancel, SpeakOutcome::PlayedFromCache)
                .await;
        }

        if cancel.is_cancelled() {
            return Ok(SpeakOutcome::Preempted);
        }

        let resolved = self
            .chain
            .resolve(&request.text, request.accent, &self.playback, cancel)
            .await;

        match resolved {
            Ok(ChainOutcome::Synthesized { backend, audio }) => {
                // Stored even when preempted; the next request for it is a hit.
                let handle = self.store(&request.key, audio.clone()).await;
                if cancel.is_cancelled() {
                    return Ok(SpeakOutcome::Preempted);
                }
                self.play(
                    request,
                    (handle, audio),
                    cancel,
                    SpeakOutcome::PlayedSynthesized { backend },
                )
                .await
            }
            Ok(ChainOutcome::Spoken { backend, outcome }) => match outcome {
                PlaybackOutcome::Completed => Ok(SpeakOutcome::SpokenByFallback { backend }),
                PlaybackOutcome::Interrupted => Ok(SpeakOutcome::Preempted),
            },
            Err(ChainError::Cancelled) => Ok(SpeakOutcome::Preempted),
            Err(ChainError::Unavailable { attempts }) => {
                if cancel.is_cancelled() {
                    return Ok(SpeakOutcome::Preempted);
                }
                warn!(
                    "No backend could speak '{}' ({} attempts)",
                    request.text,
                    attempts.len()
                );
                Err(SpeechError::SynthesisUnavailable { attempts })
            }
        }
    }
}
