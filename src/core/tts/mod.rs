pub mod azure;
mod base;
pub mod chain;
pub mod credentials;
pub mod platform;

pub use azure::{AzureSynthesizer, AzureTTSConfig, AzureVoices};
pub use base::{BufferedSynthesizer, DirectSpeaker, TTSError, TTSResult};
pub use chain::{BackendChain, BackendFailure, ChainError, ChainOutcome, SpeechBackend};
pub use credentials::{SpeechCredentials, fetch_credentials, resolve_credentials};
pub use platform::{
    CommandSpeechEngine, PlatformSpeaker, PlatformSpeechEngine, PlatformVoice, rank_voices,
    select_voice,
};
