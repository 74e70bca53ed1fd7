//! Playback controller.
//!
//! Owns the single sounding resource. Starting any playback first stops the
//! current one, so two utterances never overlap.

mod command_sink;
#[cfg(feature = "rodio-playback")]
mod rodio_sink;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub use command_sink::{CommandAudioSink, DEFAULT_PLAYER_COMMAND};
#[cfg(feature = "rodio-playback")]
pub use rodio_sink::RodioSink;

use crate::core::cache::{Accent, PlaybackHandle};
use crate::core::tts::{DirectSpeaker, TTSResult};

/// How a playback ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    Completed,
    /// Stopped before the end by `stop()` or a newer playback.
    Interrupted,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PlaybackError {
    #[error("Audio device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Could not decode audio: {0}")]
    Decode(String),

    #[error("Playback handle was released")]
    HandleRevoked,

    #[error("Playback failed: {0}")]
    Failed(String),
}

pub type PlaybackResult<T> = Result<T, PlaybackError>;

/// Audio output device.
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Plays encoded audio, returning early with `Interrupted` once `cancel` fires.
    async fn play(&self, audio: Bytes, cancel: CancellationToken) -> PlaybackResult<PlaybackOutcome>;
}

struct PlaybackSession {
    id: u64,
    cancel: CancellationToken,
    /// Cached handle being played, if the audio came from the cache.
    handle: Option<PlaybackHandle>,
}

pub struct PlaybackController {
    sink: Arc<dyn AudioSink>,
    session: Mutex<Option<PlaybackSession>>,
    next_id: AtomicU64,
}

impl PlaybackController {
    pub fn new(sink: Arc<dyn AudioSink>) -> Self {
        Self {
            sink,
            session: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Halts the current playback, if any. Idempotent.
    pub fn stop(&self) {
        if let Some(session) = self.session.lock().take() {
            debug!("Stopping playback session {}", session.id);
            session.cancel.cancel();
        }
    }

    pub fn is_playing(&self) -> bool {
        self.session.lock().is_some()
    }

    /// Cached handle currently playing, if the audio came from the cache.
    pub fn current_handle(&self) -> Option<PlaybackHandle> {
        self.session.lock().as_ref().and_then(|s| s.handle.clone())
    }

    /// Replaces the current session. The new session is also cancelled by `parent`.
    fn begin(
        &self,
        handle: Option<PlaybackHandle>,
        parent: Option<&CancellationToken>,
    ) -> (u64, CancellationToken) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = parent.map_or_else(CancellationToken::new, CancellationToken::child_token);
        let previous = self.session.lock().replace(PlaybackSession {
            id,
            cancel: cancel.clone(),
            handle,
        });
        if let Some(previous) = previous {
            debug!("Playback session {} replaced by {}", previous.id, id);
            previous.cancel.cancel();
        }
        (id, cancel)
    }

    fn finish(&self, id: u64) {
        let mut session = self.session.lock();
        if session.as_ref().is_some_and(|s| s.id == id) {
            *session = None;
        }
    }

    /// Plays raw audio, resolving when it completes or is interrupted.
    pub async fn play(&self, audio: Bytes) -> PlaybackResult<PlaybackOutcome> {
        self.run(audio, None, None).await
    }

    /// Plays a cached handle.
    pub async fn play_from_handle(
        &self,
        handle: &PlaybackHandle,
    ) -> PlaybackResult<PlaybackOutcome> {
        let audio = handle.audio().ok_or(PlaybackError::HandleRevoked)?;
        self.run(audio, Some(handle.clone()), None).await
    }

    /// Plays audio the caller already holds until it ends, `stop()` is called
    /// or `cancel` fires. `handle` only marks which cached entry is sounding, so
    /// releasing it does not cut this playback.
    ///
    /// A `cancel` that already fired yields `Interrupted` without sounding.
    pub async fn play_until(
        &self,
        audio: Bytes,
        handle: Option<PlaybackHandle>,
        cancel: &CancellationToken,
    ) -> PlaybackResult<PlaybackOutcome> {
        if cancel.is_cancelled() {
            return Ok(PlaybackOutcome::Interrupted);
        }
        self.run(audio, handle, Some(cancel)).await
    }

    /// Lets a direct speaker own the output for one utterance.
    pub async fn speak_direct(
        &self,
        speaker: &dyn DirectSpeaker,
        text: &str,
        accent: Accent,
        cancel: &CancellationToken,
    ) -> TTSResult<PlaybackOutcome> {
        if cancel.is_cancelled() {
            return Ok(PlaybackOutcome::Interrupted);
        }
        let (id, session) = self.begin(None, Some(cancel));
        let result = speaker.speak(text, accent, session).await;
        self.finish(id);
        result
    }

    async fn run(
        &self,
        audio: Bytes,
        handle: Option<PlaybackHandle>,
        parent: Option<&CancellationToken>,
    ) -> PlaybackResult<PlaybackOutcome> {
        let (id, cancel) = self.begin(handle, parent);
        debug!("Playback session {} started ({} bytes)", id, audio.len());
        let result = self.sink.play(audio, cancel).await;
        self.finish(id);
        result
    }
}
