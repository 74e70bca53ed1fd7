//! In-process fakes shared by the integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use wordvoice::core::cache::{Accent, CacheStore, EphemeralCache, MemoryCacheStore};
use wordvoice::core::playback::{AudioSink, PlaybackController, PlaybackOutcome, PlaybackResult};
use wordvoice::core::speech::{CoordinatorParts, SpeechCoordinator};
use wordvoice::core::tts::{
    BackendChain, BufferedSynthesizer, PlatformSpeaker, PlatformSpeechEngine, PlatformVoice,
    SpeechBackend, TTSError, TTSResult,
};

/// Plays for a fixed time, recording what was started and what finished.
pub struct RecordingSink {
    play_for: Duration,
    started: Mutex<Vec<Bytes>>,
    completed: Mutex<Vec<Bytes>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl RecordingSink {
    pub fn new(play_for: Duration) -> Arc<Self> {
        Arc::new(Self {
            play_for,
            started: Mutex::new(Vec::new()),
            completed: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        })
    }

    pub fn started(&self) -> Vec<Bytes> {
        self.started.lock().clone()
    }

    pub fn completed(&self) -> Vec<Bytes> {
        self.completed.lock().clone()
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Waits until `count` playbacks have started.
    pub async fn wait_for_started(&self, count: usize) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while self.started.lock().len() < count {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("playback never started");
    }
}

#[async_trait]
impl AudioSink for RecordingSink {
    async fn play(&self, audio: Bytes, cancel: CancellationToken) -> PlaybackResult<PlaybackOutcome> {
        self.started.lock().push(audio.clone());
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);

        let outcome = tokio::select! {
            _ = cancel.cancelled() => PlaybackOutcome::Interrupted,
            _ = tokio::time::sleep(self.play_for) => PlaybackOutcome::Completed,
        };

        self.active.fetch_sub(1, Ordering::SeqCst);
        if outcome == PlaybackOutcome::Completed {
            self.completed.lock().push(audio);
        }
        Ok(outcome)
    }
}

/// Buffered backend returning `"{name}|{text}|{accent}"`.
pub struct FakeSynthesizer {
    name: &'static str,
    fail: bool,
    delay: Duration,
    slow_text: Option<(&'static str, Duration)>,
    calls: AtomicUsize,
    requests: Mutex<Vec<(String, Accent)>>,
}

impl FakeSynthesizer {
    pub fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self::build(name, false))
    }

    pub fn failing(name: &'static str) -> Arc<Self> {
        Arc::new(Self::build(name, true))
    }

    /// Takes `delay` whenever asked for `text`.
    pub fn slow_for(name: &'static str, text: &'static str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            slow_text: Some((text, delay)),
            ..Self::build(name, false)
        })
    }

    fn build(name: &'static str, fail: bool) -> Self {
        Self {
            name,
            fail,
            delay: Duration::ZERO,
            slow_text: None,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<(String, Accent)> {
        self.requests.lock().clone()
    }

    pub fn audio_for(&self, text: &str, accent: Accent) -> Bytes {
        Bytes::from(format!("{}|{text}|{accent}", self.name))
    }
}

#[async_trait]
impl BufferedSynthesizer for FakeSynthesizer {
    fn name(&self) -> &str {
        self.name
    }

    async fn synthesize(&self, text: &str, accent: Accent) -> TTSResult<Bytes> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push((text.to_string(), accent));

        let delay = match self.slow_text {
            Some((slow, delay)) if slow == text => delay,
            _ => self.delay,
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.fail {
            Err(TTSError::ProviderError("API error (500): scripted".into()))
        } else {
            Ok(self.audio_for(text, accent))
        }
    }
}

/// Platform engine that "speaks" for a fixed time.
pub struct FakeEngine {
    available: bool,
    speak_for: Duration,
    spoken: Mutex<Vec<(String, Option<String>)>>,
}

impl FakeEngine {
    pub fn new(speak_for: Duration) -> Arc<Self> {
        Arc::new(Self {
            available: true,
            speak_for,
            spoken: Mutex::new(Vec::new()),
        })
    }

    pub fn unavailable() -> Arc<Self> {
        Arc::new(Self {
            available: false,
            speak_for: Duration::ZERO,
            spoken: Mutex::new(Vec::new()),
        })
    }

    /// Completed utterances with the voice id used.
    pub fn spoken(&self) -> Vec<(String, Option<String>)> {
        self.spoken.lock().clone()
    }
}

#[async_trait]
impl PlatformSpeechEngine for FakeEngine {
    fn name(&self) -> &str {
        "fake-engine"
    }

    async fn list_voices(&self) -> TTSResult<Vec<PlatformVoice>> {
        Ok(vec![
            PlatformVoice::new("robot", "Robot", "xx-XX"),
            PlatformVoice::new("gb", "English (Great Britain)", "en-GB"),
            PlatformVoice::new("us", "English (America)", "en-US"),
            PlatformVoice::new("au", "English (Australia)", "en-AU"),
        ])
    }

    async fn speak(
        &self,
        text: &str,
        voice: Option<&PlatformVoice>,
        cancel: CancellationToken,
    ) -> TTSResult<PlaybackOutcome> {
        if !self.available {
            return Err(TTSError::ProviderNotReady("no speech engine".into()));
        }
        let outcome = tokio::select! {
            _ = cancel.cancelled() => PlaybackOutcome::Interrupted,
            _ = tokio::time::sleep(self.speak_for) => PlaybackOutcome::Completed,
        };
        if outcome == PlaybackOutcome::Completed {
            self.spoken
                .lock()
                .push((text.to_string(), voice.map(|v| v.id.clone())));
        }
        Ok(outcome)
    }
}

pub fn memory_store() -> Arc<CacheStore> {
    Arc::new(CacheStore::with_backend(Arc::new(MemoryCacheStore::new(
        Duration::from_secs(60),
    ))))
}

pub fn buffered(synth: &Arc<FakeSynthesizer>) -> SpeechBackend {
    SpeechBackend::Buffered(synth.clone())
}

pub fn direct(engine: &Arc<FakeEngine>) -> SpeechBackend {
    SpeechBackend::Direct(Arc::new(PlatformSpeaker::new(engine.clone())))
}

/// Coordinator over `store` with a default ephemeral cache.
pub fn coordinator(
    backends: Vec<SpeechBackend>,
    sink: Arc<RecordingSink>,
    store: Arc<CacheStore>,
) -> SpeechCoordinator {
    coordinator_with(backends, sink, store, EphemeralCache::default())
}

pub fn coordinator_with(
    backends: Vec<SpeechBackend>,
    sink: Arc<RecordingSink>,
    store: Arc<CacheStore>,
    ephemeral: EphemeralCache,
) -> SpeechCoordinator {
    SpeechCoordinator::new(CoordinatorParts {
        ephemeral,
        durable: store,
        chain: BackendChain::new(backends),
        playback: Arc::new(PlaybackController::new(sink)),
        max_durable_entries: None,
    })
}
