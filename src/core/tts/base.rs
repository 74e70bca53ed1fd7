//! # Synthesis backend traits
//!
//! Two kinds of backend feed the backend chain:
//!
//! - [`BufferedSynthesizer`]: returns the complete encoded utterance as bytes.
//!   The result is cacheable and played through the playback controller.
//! - [`DirectSpeaker`]: speaks through the platform's own audio output and
//!   produces no bytes. Its utterances are never cached.
//!
//! ```rust,ignore
//! use wordvoice::core::tts::{BufferedSynthesizer, TTSResult};
//! use wordvoice::core::cache::Accent;
//!
//! struct Silence;
//!
//! #[async_trait::async_trait]
//! impl BufferedSynthesizer for Silence {
//!     fn name(&self) -> &str { "silence" }
//!     async fn synthesize(&self, _text: &str, _accent: Accent) -> TTSResult<bytes::Bytes> {
//!         Ok(bytes::Bytes::from_static(&[0; 16]))
//!     }
//! }
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::core::cache::Accent;
use crate::core::playback::PlaybackOutcome;

/// TTS-specific error types
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TTSError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Provider not ready: {0}")]
    ProviderNotReady(String),

    #[error("Audio generation failed: {0}")]
    AudioGenerationFailed(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Timeout error: {0}")]
    TimeoutError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Result type for TTS operations
pub type TTSResult<T> = Result<T, TTSError>;

/// A backend that turns text into a complete encoded audio buffer.
#[async_trait]
pub trait BufferedSynthesizer: Send + Sync {
    /// Short name used in logs and outcomes.
    fn name(&self) -> &str;

    /// Synthesizes `text` with the voice mapped to `accent`.
    async fn synthesize(&self, text: &str, accent: Accent) -> TTSResult<Bytes>;
}

/// A backend whose only operation is speaking aloud.
#[async_trait]
pub trait DirectSpeaker: Send + Sync {
    fn name(&self) -> &str;

    /// Speaks `text` and returns when speech ends or `cancel` fires.
    async fn speak(
        &self,
        text: &str,
        accent: Accent,
        cancel: CancellationToken,
    ) -> TTSResult<PlaybackOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoSynth;

    #[async_trait]
    impl BufferedSynthesizer for EchoSynth {
        fn name(&self) -> &str {
            "echo"
        }

        async fn synthesize(&self, text: &str, accent: Accent) -> TTSResult<Bytes> {
            if text.is_empty() {
                return Err(TTSError::AudioGenerationFailed("empty".into()));
            }
            Ok(Bytes::from(format!("{text}:{accent}")))
        }
    }

    #[tokio::test]
    async fn test_buffered_synthesizer_as_trait_object() {
        let synth: Box<dyn BufferedSynthesizer> = Box::new(EchoSynth);
        assert_eq!(synth.name(), "echo");
        assert_eq!(
            synth.synthesize("hi", Accent::Uk).await.unwrap(),
            Bytes::from("hi:uk")
        );
        assert!(synth.synthesize("", Accent::Uk).await.is_err());
    }

    #[test]
    fn test_error_display() {
        let err = TTSError::ProviderError("API error (401): denied".into());
        assert_eq!(err.to_string(), "Provider error: API error (401): denied");
        let err = TTSError::NetworkError("refused".into());
        assert_eq!(err.to_string(), "Network error: refused");
    }
}
