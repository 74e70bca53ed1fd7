use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::core::cache::{CacheStore, EphemeralCache};
#[cfg(not(feature = "rodio-playback"))]
use crate::core::playback::CommandAudioSink;
#[cfg(feature = "rodio-playback")]
use crate::core::playback::RodioSink;
use crate::core::playback::{AudioSink, PlaybackController};
use crate::core::speech::{CoordinatorParts, SpeechCoordinator};
use crate::core::tts::{
    AzureSynthesizer, AzureTTSConfig, BackendChain, CommandSpeechEngine, PlatformSpeaker,
    PlatformSpeechEngine, SpeechBackend, resolve_credentials,
};
use crate::errors::app_error::AppResult;
use crate::utils::req_manager::{ReqManager, ReqManagerConfig};

/// Everything a running process shares: the HTTP pool, the durable store and
/// the coordinator built on top of them.
pub struct CoreState {
    pub config: AppConfig,
    pub req_manager: Arc<ReqManager>,
    pub cache: Arc<CacheStore>,
    pub playback: Arc<PlaybackController>,
    pub coordinator: Arc<SpeechCoordinator>,
    /// Backend names in the order they are tried.
    pub backends: Vec<String>,
    maintenance_token: CancellationToken,
    maintenance_task: Mutex<Option<JoinHandle<()>>>,
}

impl CoreState {
    /// Wires the coordinator from configuration, using the configured audio
    /// output and fallback speech command.
    pub async fn build(config: &AppConfig) -> AppResult<Arc<Self>> {
        let sink = Self::audio_sink(config)?;
        let fallback: Arc<dyn PlatformSpeechEngine> =
            Arc::new(CommandSpeechEngine::new(config.fallback_tts_command.clone()));
        Self::build_with(config, sink, fallback).await
    }

    /// Wires the coordinator around a caller-supplied sink and fallback engine.
    pub async fn build_with(
        config: &AppConfig,
        sink: Arc<dyn AudioSink>,
        fallback: Arc<dyn PlatformSpeechEngine>,
    ) -> AppResult<Arc<Self>> {
        let req_manager = Arc::new(ReqManager::with_config(
            ReqManagerConfig::with_request_timeout(config.request_timeout()),
        )?);

        let cache = Arc::new(CacheStore::open(&config.cache_config()).await);
        info!("Durable speech cache: {}", cache.backend_type());

        let chain = Self::build_chain(config, &req_manager, fallback).await;
        let backends: Vec<String> = chain.names().into_iter().map(str::to_string).collect();
        info!("Synthesis backends: {:?}", backends);

        let playback = Arc::new(PlaybackController::new(sink));
        let coordinator = Arc::new(SpeechCoordinator::new(CoordinatorParts {
            ephemeral: EphemeralCache::new(
                config.ephemeral_max_entries,
                config.ephemeral_eviction_batch,
            ),
            durable: cache.clone(),
            chain,
            playback: playback.clone(),
            max_durable_entries: config.cache_max_entries,
        }));

        let maintenance_token = CancellationToken::new();
        let maintenance_task = config.sweep_interval().map(|interval| {
            info!("Cache maintenance every {:?}", interval);
            coordinator
                .maintenance()
                .spawn_periodic(interval, maintenance_token.clone())
        });

        Ok(Arc::new(Self {
            config: config.clone(),
            req_manager,
            cache,
            playback,
            coordinator,
            backends,
            maintenance_token,
            maintenance_task: Mutex::new(maintenance_task),
        }))
    }

    /// Primary backend first when credentials resolve, fallback last.
    async fn build_chain(
        config: &AppConfig,
        req_manager: &Arc<ReqManager>,
        fallback: Arc<dyn PlatformSpeechEngine>,
    ) -> BackendChain {
        let mut chain = BackendChain::default();

        let credentials = resolve_credentials(
            req_manager,
            config.azure_speech_subscription_key.as_deref(),
            &config.azure_speech_region,
            config.speech_credentials_url.as_deref(),
        )
        .await;

        match credentials {
            Some(credentials) => {
                let azure_config = AzureTTSConfig::new(credentials.key, credentials.region)
                    .with_voices(config.azure_voices.clone());
                match AzureSynthesizer::new(azure_config, req_manager.clone()) {
                    Ok(synth) => chain.push(SpeechBackend::Buffered(Arc::new(synth))),
                    Err(e) => warn!("Azure synthesis disabled: {}", e),
                }
            }
            None => info!("No speech credentials; using on-device speech only"),
        }

        chain.push(SpeechBackend::Direct(Arc::new(PlatformSpeaker::new(fallback))));
        chain
    }

    #[cfg(feature = "rodio-playback")]
    fn audio_sink(_config: &AppConfig) -> AppResult<Arc<dyn AudioSink>> {
        info!("Playing audio through the default output device");
        Ok(Arc::new(RodioSink::new()))
    }

    #[cfg(not(feature = "rodio-playback"))]
    fn audio_sink(config: &AppConfig) -> AppResult<Arc<dyn AudioSink>> {
        let sink = CommandAudioSink::new(&config.audio_player_command)?;
        info!("Playing audio through '{}'", sink.program());
        Ok(Arc::new(sink))
    }

    /// Stops maintenance and the coordinator, then waits for pending cache writes.
    pub async fn shutdown(&self) {
        self.maintenance_token.cancel();
        let task = self.maintenance_task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
        self.coordinator.stop();
        self.coordinator.flush().await;
        self.coordinator.shutdown();
        info!("Speech core shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cache::{Accent, DEFAULT_TTL};
    use crate::core::playback::{PlaybackOutcome, PlaybackResult};
    use crate::core::tts::{AzureVoices, PlatformVoice, TTSResult};
    use async_trait::async_trait;
    use bytes::Bytes;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct NullSink;

    #[async_trait]
    impl AudioSink for NullSink {
        async fn play(&self, _: Bytes, _: CancellationToken) -> PlaybackResult<PlaybackOutcome> {
            Ok(PlaybackOutcome::Completed)
        }
    }

    struct QuietEngine;

    #[async_trait]
    impl PlatformSpeechEngine for QuietEngine {
        fn name(&self) -> &str {
            "quiet"
        }

        async fn list_voices(&self) -> TTSResult<Vec<PlatformVoice>> {
            Ok(vec![PlatformVoice::new("en-us", "English (America)", "en-US")])
        }

        async fn speak(
            &self,
            _text: &str,
            _voice: Option<&PlatformVoice>,
            _cancel: CancellationToken,
        ) -> TTSResult<PlaybackOutcome> {
            Ok(PlaybackOutcome::Completed)
        }
    }

    fn config() -> AppConfig {
        AppConfig {
            cache_path: None,
            cache_ttl_seconds: DEFAULT_TTL.as_secs(),
            cache_max_entries: None,
            cache_sweep_interval_seconds: None,
            ephemeral_max_entries: 10,
            ephemeral_eviction_batch: 2,
            azure_speech_subscription_key: None,
            azure_speech_region: "eastus".to_string(),
            azure_voices: AzureVoices::default(),
            speech_credentials_url: None,
            tts_request_timeout_seconds: 5,
            fallback_tts_command: "quiet".to_string(),
            audio_player_command: "cat".to_string(),
            default_accent: Accent::Us,
            autoplay: true,
        }
    }

    async fn build(config: &AppConfig) -> Arc<CoreState> {
        CoreState::build_with(config, Arc::new(NullSink), Arc::new(QuietEngine))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_without_credentials_only_fallback() {
        let state = build(&config()).await;
        assert_eq!(state.backends, vec!["quiet"]);
        assert_eq!(state.cache.backend_type(), "memory");
        state.shutdown().await;
    }

    #[tokio::test]
    async fn test_static_key_adds_primary_backend() {
        let config = AppConfig {
            azure_speech_subscription_key: Some("static-key".to_string()),
            ..config()
        };
        let state = build(&config).await;
        assert_eq!(state.backends, vec!["azure", "quiet"]);
        state.shutdown().await;
    }

    #[tokio::test]
    async fn test_fetched_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/speech"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"key": "fetched", "region": "uksouth"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let config = AppConfig {
            speech_credentials_url: Some(format!("{}/speech", server.uri())),
            ..config()
        };
        let state = build(&config).await;
        assert_eq!(state.backends, vec!["azure", "quiet"]);
        state.shutdown().await;
    }

    #[tokio::test]
    async fn test_unreachable_credentials_endpoint_degrades() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/speech"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let config = AppConfig {
            speech_credentials_url: Some(format!("{}/speech", server.uri())),
            ..config()
        };
        let state = build(&config).await;
        assert_eq!(state.backends, vec!["quiet"]);
        state.shutdown().await;
    }

    #[tokio::test]
    async fn test_filesystem_cache_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig {
            cache_path: Some(dir.path().to_path_buf()),
            ..config()
        };
        let state = build(&config).await;
        assert_eq!(state.cache.backend_type(), "filesystem");
        state.shutdown().await;
    }

    #[tokio::test]
    async fn test_periodic_maintenance_stops_on_shutdown() {
        let config = AppConfig {
            cache_sweep_interval_seconds: Some(1),
            ..config()
        };
        let state = build(&config).await;
        assert!(state.maintenance_task.lock().is_some());
        tokio::time::timeout(std::time::Duration::from_secs(2), state.shutdown())
            .await
            .unwrap();
        assert!(state.maintenance_task.lock().is_none());
    }
}
