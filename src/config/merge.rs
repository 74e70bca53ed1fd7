use std::env;
use std::path::PathBuf;

use super::AppConfig;
use super::utils::{env_bool, env_parsed};
use super::yaml::YamlConfig;
use crate::core::cache::{
    Accent, DEFAULT_EPHEMERAL_MAX_ENTRIES, DEFAULT_EVICTION_BATCH, DEFAULT_TTL,
};
use crate::core::playback::DEFAULT_PLAYER_COMMAND;
use crate::core::tts::azure::DEFAULT_AZURE_REGION;
use crate::core::tts::platform::DEFAULT_SPEECH_COMMAND;

const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 10;

/// Merge YAML configuration with environment variables
///
/// Priority order (highest to lowest):
/// 1. YAML configuration values
/// 2. Environment variables
/// 3. Default values
///
/// Validation is left to the caller.
pub fn merge_config(
    yaml_config: Option<YamlConfig>,
) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let yaml = yaml_config.unwrap_or_default();

    // YAML > ENV > Default for strings
    macro_rules! get_value {
        ($env_var:expr, $yaml_value:expr, $default:expr) => {
            $yaml_value
                .or_else(|| env::var($env_var).ok().filter(|v| !v.trim().is_empty()))
                .unwrap_or_else(|| $default.to_string())
        };
    }

    // YAML > ENV for optional strings
    macro_rules! get_optional {
        ($env_var:expr, $yaml_value:expr) => {
            $yaml_value.or_else(|| env::var($env_var).ok().filter(|v| !v.trim().is_empty()))
        };
    }

    // YAML > ENV for parsed values; a malformed env value is an error
    macro_rules! get_parsed {
        ($env_var:expr, $yaml_value:expr) => {
            match $yaml_value {
                Some(value) => Some(value),
                None => env_parsed($env_var)?,
            }
        };
    }

    let cache = yaml.cache.unwrap_or_default();
    let ephemeral = yaml.ephemeral.unwrap_or_default();
    let providers = yaml.providers.unwrap_or_default();
    let fallback = yaml.fallback.unwrap_or_default();
    let playback = yaml.playback.unwrap_or_default();
    let speech = yaml.speech.unwrap_or_default();

    // Durable cache
    let cache_path = get_optional!("CACHE_PATH", cache.path).map(PathBuf::from);
    let cache_ttl_seconds =
        get_parsed!("CACHE_TTL_SECONDS", cache.ttl_seconds).unwrap_or(DEFAULT_TTL.as_secs());
    let cache_max_entries = get_parsed!("CACHE_MAX_ENTRIES", cache.max_entries);
    let cache_sweep_interval_seconds = get_parsed!(
        "CACHE_SWEEP_INTERVAL_SECONDS",
        cache.sweep_interval_seconds
    );

    // Ephemeral cache
    let ephemeral_max_entries = get_parsed!("EPHEMERAL_MAX_ENTRIES", ephemeral.max_entries)
        .unwrap_or(DEFAULT_EPHEMERAL_MAX_ENTRIES);
    let ephemeral_eviction_batch =
        get_parsed!("EPHEMERAL_EVICTION_BATCH", ephemeral.eviction_batch)
            .unwrap_or(DEFAULT_EVICTION_BATCH);

    // Primary backend
    let azure_speech_subscription_key = get_optional!(
        "AZURE_SPEECH_SUBSCRIPTION_KEY",
        providers.azure_speech_subscription_key
    );
    let azure_speech_region = get_value!(
        "AZURE_SPEECH_REGION",
        providers.azure_speech_region,
        DEFAULT_AZURE_REGION
    );
    let speech_credentials_url =
        get_optional!("SPEECH_CREDENTIALS_URL", providers.speech_credentials_url);
    let tts_request_timeout_seconds = get_parsed!(
        "TTS_REQUEST_TIMEOUT_SECONDS",
        providers.request_timeout_seconds
    )
    .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECONDS);
    let azure_voices = providers.azure_voices.unwrap_or_default();

    // Fallback backend and output
    let fallback_tts_command =
        get_value!("FALLBACK_TTS_COMMAND", fallback.command, DEFAULT_SPEECH_COMMAND);
    let audio_player_command = get_value!(
        "AUDIO_PLAYER_COMMAND",
        playback.player_command,
        DEFAULT_PLAYER_COMMAND
    );

    // User preferences
    let accent_raw = get_value!("DEFAULT_ACCENT", speech.default_accent, Accent::Us.code());
    let default_accent = accent_raw
        .parse::<Accent>()
        .map_err(|e| format!("Invalid DEFAULT_ACCENT '{accent_raw}': {e}"))?;
    let autoplay = match speech.autoplay {
        Some(value) => value,
        None => env_bool("AUTOPLAY")?.unwrap_or(true),
    };

    Ok(AppConfig {
        cache_path,
        cache_ttl_seconds,
        cache_max_entries,
        cache_sweep_interval_seconds,
        ephemeral_max_entries,
        ephemeral_eviction_batch,
        azure_speech_subscription_key,
        azure_speech_region,
        azure_voices,
        speech_credentials_url,
        tts_request_timeout_seconds,
        fallback_tts_command,
        audio_player_command,
        default_accent,
        autoplay,
    })
}
