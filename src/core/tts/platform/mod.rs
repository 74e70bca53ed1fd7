//! On-device fallback speech.
//!
//! Platform engines speak directly to the audio device and hand back no audio
//! buffer, so this backend never feeds the cache.

mod command;
mod voices;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub use command::{CommandSpeechEngine, DEFAULT_SPEECH_COMMAND, parse_voice_table};
pub use voices::{PlatformVoice, rank_voices, select_voice};

use crate::core::cache::Accent;
use crate::core::playback::PlaybackOutcome;
use crate::core::tts::base::{DirectSpeaker, TTSResult};

/// A speech engine provided by the operating system.
#[async_trait]
pub trait PlatformSpeechEngine: Send + Sync {
    fn name(&self) -> &str;

    async fn list_voices(&self) -> TTSResult<Vec<PlatformVoice>>;

    /// Speaks `text`; `None` uses the engine's default voice.
    async fn speak(
        &self,
        text: &str,
        voice: Option<&PlatformVoice>,
        cancel: CancellationToken,
    ) -> TTSResult<PlaybackOutcome>;
}

/// Adapts a [`PlatformSpeechEngine`] to the backend chain.
///
/// The voice list is read once and reused for the life of the speaker.
pub struct PlatformSpeaker {
    engine: Arc<dyn PlatformSpeechEngine>,
    voices: OnceCell<Vec<PlatformVoice>>,
}

impl PlatformSpeaker {
    pub fn new(engine: Arc<dyn PlatformSpeechEngine>) -> Self {
        Self {
            engine,
            voices: OnceCell::new(),
        }
    }

    async fn voices(&self) -> &[PlatformVoice] {
        self.voices
            .get_or_init(|| async {
                match self.engine.list_voices().await {
                    Ok(voices) => voices,
                    Err(e) => {
                        warn!("Could not list {} voices: {}", self.engine.name(), e);
                        Vec::new()
                    }
                }
            })
            .await
    }
}

#[async_trait]
impl DirectSpeaker for PlatformSpeaker {
    fn name(&self) -> &str {
        self.engine.name()
    }

    async fn speak(
        &self,
        text: &str,
        accent: Accent,
        cancel: CancellationToken,
    ) -> TTSResult<PlaybackOutcome> {
        let voice = select_voice(self.voices().await, accent);
        match voice {
            Some(v) => debug!("Fallback voice for {}: {} ({})", accent, v.name, v.locale),
            None => debug!("No {} voice for {}; using engine default", self.name(), accent),
        }
        self.engine.speak(text, voice, cancel).await
    }
}
