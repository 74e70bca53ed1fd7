//! Request coordination for spoken words.

mod coordinator;
pub mod stats;

use serde::Deserialize;

pub use coordinator::{CoordinatorParts, SpeechCoordinator};
pub use stats::{CacheStatistics, CacheStats};

use crate::core::cache::Accent;
use crate::core::playback::PlaybackError;
use crate::core::tts::BackendFailure;

/// How a `speak` request ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeakOutcome {
    /// Played audio from the ephemeral or durable cache.
    PlayedFromCache,
    /// Synthesized, cached and played.
    PlayedSynthesized { backend: String },
    /// Spoken by a direct backend; nothing was cached.
    SpokenByFallback { backend: String },
    /// Superseded by a newer request or stopped before finishing.
    Preempted,
    /// Autoplay is disabled.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SpeechError {
    #[error("text is empty")]
    InvalidText,

    #[error("speech synthesis unavailable: every backend failed ({} attempted)", .attempts.len())]
    SynthesisUnavailable { attempts: Vec<BackendFailure> },

    #[error(transparent)]
    Playback(#[from] PlaybackError),

    #[error("speech coordinator shut down")]
    ShutDown,
}

pub type SpeechResult<T> = Result<T, SpeechError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Idle,
    Queued,
    /// Looking up caches or waiting on a backend.
    Resolving,
    Playing,
}

/// User preferences consumed by `speak_autoplay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SpeechSettings {
    pub accent: Accent,
    pub autoplay: bool,
}

impl Default for SpeechSettings {
    fn default() -> Self {
        Self {
            accent: Accent::Us,
            autoplay: true,
        }
    }
}
