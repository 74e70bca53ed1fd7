pub mod cache;
pub mod playback;
pub mod speech;
pub mod state;
pub mod tts;

// Re-export commonly used types for convenience
pub use cache::{Accent, CacheKey, CacheStore, EphemeralCache, PlaybackHandle};
pub use playback::{AudioSink, PlaybackController, PlaybackError, PlaybackOutcome};
pub use speech::{
    CacheStats, CoordinatorState, SpeakOutcome, SpeechCoordinator, SpeechError, SpeechResult,
    SpeechSettings,
};
pub use tts::{BackendChain, BufferedSynthesizer, DirectSpeaker, SpeechBackend, TTSError, TTSResult};

pub use state::CoreState;
