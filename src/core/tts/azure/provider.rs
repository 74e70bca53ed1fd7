//! Azure Text-to-Speech REST synthesizer.
//!
//! One POST per utterance:
//! - Authentication: `Ocp-Apim-Subscription-Key` header
//! - Content-Type: `application/ssml+xml`
//! - Output format: `X-Microsoft-OutputFormat` header
//!
//! The whole response body is the encoded utterance.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, error};

use super::config::{AZURE_OUTPUT_FORMAT_HEADER, AZURE_SUBSCRIPTION_KEY_HEADER, AzureTTSConfig};
use crate::core::cache::Accent;
use crate::core::tts::base::{BufferedSynthesizer, TTSError, TTSResult};
use crate::utils::req_manager::ReqManager;

/// Primary synthesis backend.
pub struct AzureSynthesizer {
    config: AzureTTSConfig,
    req_manager: Arc<ReqManager>,
}

impl AzureSynthesizer {
    pub fn new(config: AzureTTSConfig, req_manager: Arc<ReqManager>) -> TTSResult<Self> {
        if config.subscription_key.trim().is_empty() {
            return Err(TTSError::InvalidConfiguration(
                "Azure subscription key is empty".to_string(),
            ));
        }
        if config.endpoint.is_none() && config.region.trim().is_empty() {
            return Err(TTSError::InvalidConfiguration(
                "Azure region is empty".to_string(),
            ));
        }
        Ok(Self {
            config,
            req_manager,
        })
    }

    pub fn config(&self) -> &AzureTTSConfig {
        &self.config
    }

    fn build_http_request(
        &self,
        client: &reqwest::Client,
        text: &str,
        accent: Accent,
    ) -> reqwest::RequestBuilder {
        client
            .post(self.config.build_tts_url())
            .header(AZURE_SUBSCRIPTION_KEY_HEADER, &self.config.subscription_key)
            .header("Content-Type", "application/ssml+xml")
            .header(AZURE_OUTPUT_FORMAT_HEADER, &self.config.output_format)
            .body(self.config.build_ssml_for(text, accent))
    }
}

#[async_trait]
impl BufferedSynthesizer for AzureSynthesizer {
    fn name(&self) -> &str {
        "azure"
    }

    async fn synthesize(&self, text: &str, accent: Accent) -> TTSResult<Bytes> {
        let guard = self
            .req_manager
            .acquire()
            .await
            .map_err(|e| TTSError::NetworkError(format!("Failed to acquire client: {e}")))?;

        let request = self.build_http_request(guard.client(), text, accent);
        let response = guard.send(request).await.map_err(|e| {
            if e.is_timeout() {
                TTSError::TimeoutError(e.to_string())
            } else {
                TTSError::NetworkError(format!("Request failed: {e}"))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            error!("Azure TTS API error ({}): {}", status, error_body);
            return Err(TTSError::ProviderError(format!(
                "API error ({status}): {error_body}"
            )));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| TTSError::NetworkError(format!("Failed to read body: {e}")))?;
        if audio.is_empty() {
            return Err(TTSError::AudioGenerationFailed(
                "Azure returned an empty body".to_string(),
            ));
        }

        debug!(
            "Azure synthesized '{}' ({}) into {} bytes",
            text,
            accent,
            audio.len()
        );
        Ok(audio)
    }
}
