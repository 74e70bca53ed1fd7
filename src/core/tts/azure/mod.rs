//! Microsoft Azure Text-to-Speech backend.
//!
//! - TTS endpoint: `https://{region}.tts.speech.microsoft.com/cognitiveservices/v1`
//! - Required headers: `Ocp-Apim-Subscription-Key`, `Content-Type: application/ssml+xml`,
//!   `X-Microsoft-OutputFormat`

mod config;
mod provider;

pub use config::{
    AZURE_OUTPUT_FORMAT_HEADER, AZURE_SUBSCRIPTION_KEY_HEADER, AzureTTSConfig, AzureVoices,
    DEFAULT_AZURE_REGION, DEFAULT_OUTPUT_FORMAT, build_ssml, escape_xml,
};
pub use provider::AzureSynthesizer;
