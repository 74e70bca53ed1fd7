//! Ordered synthesis backends.
//!
//! Backends are tried in order until one succeeds. A buffered backend hands
//! back bytes for the caller to cache and play; a direct backend speaks on
//! its own through the playback controller and its output is never cached.

use std::sync::Arc;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::base::{BufferedSynthesizer, DirectSpeaker, TTSError};
use crate::core::cache::Accent;
use crate::core::playback::{PlaybackController, PlaybackOutcome};

#[derive(Clone)]
pub enum SpeechBackend {
    Buffered(Arc<dyn BufferedSynthesizer>),
    Direct(Arc<dyn DirectSpeaker>),
}

impl SpeechBackend {
    pub fn name(&self) -> &str {
        match self {
            SpeechBackend::Buffered(b) => b.name(),
            SpeechBackend::Direct(d) => d.name(),
        }
    }
}

/// One failed attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendFailure {
    pub backend: String,
    pub error: TTSError,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChainOutcome {
    /// A buffered backend produced the utterance.
    Synthesized { backend: String, audio: Bytes },
    /// A direct backend spoke the utterance itself.
    Spoken {
        backend: String,
        outcome: PlaybackOutcome,
    },
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ChainError {
    #[error("all synthesis backends failed ({} attempted)", .attempts.len())]
    Unavailable { attempts: Vec<BackendFailure> },

    #[error("synthesis cancelled")]
    Cancelled,
}

#[derive(Clone, Default)]
pub struct BackendChain {
    backends: Vec<SpeechBackend>,
}

impl BackendChain {
    pub fn new(backends: Vec<SpeechBackend>) -> Self {
        Self { backends }
    }

    pub fn push(&mut self, backend: SpeechBackend) {
        self.backends.push(backend);
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.backends.iter().map(SpeechBackend::name).collect()
    }

    /// Bytes from the first buffered backend that succeeds. Direct backends are skipped.
    pub async fn synthesize(&self, text: &str, accent: Accent) -> Result<(String, Bytes), ChainError> {
        let mut attempts = Vec::new();
        for backend in &self.backends {
            let SpeechBackend::Buffered(synth) = backend else {
                continue;
            };
            match synth.synthesize(text, accent).await {
                Ok(audio) => return Ok((synth.name().to_string(), audio)),
                Err(error) => {
                    warn!("Backend {} failed for '{}': {}", synth.name(), text, error);
                    attempts.push(BackendFailure {
                        backend: synth.name().to_string(),
                        error,
                    });
                }
            }
        }
        Err(ChainError::Unavailable { attempts })
    }

    /// Walks every backend, letting direct backends speak through `playback`.
    ///
    /// Dropping an in-flight buffered request on `cancel` closes its connection.
    pub async fn resolve(
        &self,
        text: &str,
        accent: Accent,
        playback: &PlaybackController,
        cancel: &CancellationToken,
    ) -> Result<ChainOutcome, ChainError> {
        let mut attempts = Vec::new();

        for backend in &self.backends {
            if cancel.is_cancelled() {
                return Err(ChainError::Cancelled);
            }

            let result = match backend {
                SpeechBackend::Buffered(synth) => {
                    let synthesized = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(ChainError::Cancelled),
                        result = synth.synthesize(text, accent) => result,
                    };
                    synthesized.map(|audio| ChainOutcome::Synthesized {
                        backend: synth.name().to_string(),
                        audio,
                    })
                }
                SpeechBackend::Direct(speaker) => {
                    debug!("Falling back to direct speech via {}", speaker.name());
                    playback
                        .speak_direct(speaker.as_ref(), text, accent, cancel)
                        .await
                        .map(|outcome| ChainOutcome::Spoken {
                            backend: speaker.name().to_string(),
                            outcome,
                        })
                }
            };

            match result {
                Ok(outcome) => return Ok(outcome),
                Err(error) => {
                    warn!("Backend {} failed for '{}': {}", backend.name(), text, error);
                    attempts.push(BackendFailure {
                        backend: backend.name().to_string(),
                        error,
                    });
                }
            }
        }

        Err(ChainError::Unavailable { attempts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::playback::{AudioSink, PlaybackResult};
    use crate::core::tts::base::TTSResult;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct ScriptedSynth {
        name: &'static str,
        fail: bool,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl ScriptedSynth {
        fn new(name: &'static str, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                name,
                fail,
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            })
        }

        fn slow(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                fail: false,
                delay: Duration::from_secs(10),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl BufferedSynthesizer for ScriptedSynth {
        fn name(&self) -> &str {
            self.name
        }

        async fn synthesize(&self, text: &str, _accent: Accent) -> TTSResult<Bytes> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.fail {
                Err(TTSError::ProviderError("scripted failure".into()))
            } else {
                Ok(Bytes::from(format!("{}:{text}", self.name)))
            }
        }
    }

    struct CountingSpeaker {
        fail: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DirectSpeaker for CountingSpeaker {
        fn name(&self) -> &str {
            "platform"
        }

        async fn speak(
            &self,
            _text: &str,
            _accent: Accent,
            _cancel: CancellationToken,
        ) -> TTSResult<PlaybackOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(TTSError::ProviderNotReady("no engine".into()))
            } else {
                Ok(PlaybackOutcome::Completed)
            }
        }
    }

    struct SilentSink;

    #[async_trait]
    impl AudioSink for SilentSink {
        async fn play(&self, _: Bytes, _: CancellationToken) -> PlaybackResult<PlaybackOutcome> {
            Ok(PlaybackOutcome::Completed)
        }
    }

    fn controller() -> PlaybackController {
        PlaybackController::new(Arc::new(SilentSink))
    }

    fn speaker(fail: bool) -> Arc<CountingSpeaker> {
        Arc::new(CountingSpeaker {
            fail,
            calls: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn test_first_success_short_circuits() {
        let primary = ScriptedSynth::new("primary", false);
        let secondary = ScriptedSynth::new("secondary", false);
        let chain = BackendChain::new(vec![
            SpeechBackend::Buffered(primary.clone()),
            SpeechBackend::Buffered(secondary.clone()),
        ]);

        let outcome = chain
            .resolve("hi", Accent::Us, &controller(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ChainOutcome::Synthesized {
                backend: "primary".into(),
                audio: Bytes::from("primary:hi"),
            }
        );
        assert_eq!(secondary.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failure_falls_through_to_direct() {
        let primary = ScriptedSynth::new("primary", true);
        let fallback = speaker(false);
        let chain = BackendChain::new(vec![
            SpeechBackend::Buffered(primary.clone()),
            SpeechBackend::Direct(fallback.clone()),
        ]);

        let outcome = chain
            .resolve("hi", Accent::Uk, &controller(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ChainOutcome::Spoken {
                backend: "platform".into(),
                outcome: PlaybackOutcome::Completed,
            }
        );
        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_all_failures_are_reported() {
        let chain = BackendChain::new(vec![
            SpeechBackend::Buffered(ScriptedSynth::new("primary", true)),
            SpeechBackend::Direct(speaker(true)),
        ]);

        let err = chain
            .resolve("hi", Accent::Au, &controller(), &CancellationToken::new())
            .await
            .unwrap_err();
        let ChainError::Unavailable { attempts } = err else {
            panic!("expected Unavailable");
        };
        let names: Vec<_> = attempts.iter().map(|a| a.backend.as_str()).collect();
        assert_eq!(names, vec!["primary", "platform"]);
    }

    #[tokio::test]
    async fn test_empty_chain_is_unavailable() {
        let chain = BackendChain::default();
        assert!(chain.is_empty());
        assert_eq!(
            chain
                .resolve("hi", Accent::Us, &controller(), &CancellationToken::new())
                .await,
            Err(ChainError::Unavailable { attempts: vec![] })
        );
    }

    #[tokio::test]
    async fn test_cancel_drops_inflight_synthesis() {
        let slow = ScriptedSynth::slow("slow");
        let fallback = speaker(false);
        let chain = BackendChain::new(vec![
            SpeechBackend::Buffered(slow.clone()),
            SpeechBackend::Direct(fallback.clone()),
        ]);
        let cancel = CancellationToken::new();

        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                cancel.cancel();
            })
        };

        let result = tokio::time::timeout(
            Duration::from_secs(1),
            chain.resolve("hi", Accent::Us, &controller(), &cancel),
        )
        .await
        .unwrap();
        canceller.await.unwrap();

        assert_eq!(result, Err(ChainError::Cancelled));
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_synthesize_skips_direct_backends() {
        let chain = BackendChain::new(vec![
            SpeechBackend::Direct(speaker(false)),
            SpeechBackend::Buffered(ScriptedSynth::new("buffered", false)),
        ]);
        let (backend, audio) = chain.synthesize("x", Accent::Us).await.unwrap();
        assert_eq!(backend, "buffered");
        assert_eq!(audio, Bytes::from("buffered:x"));
        assert_eq!(chain.names(), vec!["platform", "buffered"]);
    }
}
