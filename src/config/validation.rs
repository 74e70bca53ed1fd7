use super::AppConfig;

/// Validate a merged configuration
///
/// Checks that:
/// - the durable TTL is positive
/// - the ephemeral cache holds at least one entry and evicts between 1 and
///   `max_entries` entries at a time
/// - a region accompanies a statically configured key
/// - the fallback and player commands are not blank
pub fn validate(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    validate_cache(config)?;
    validate_ephemeral(config.ephemeral_max_entries, config.ephemeral_eviction_batch)?;
    validate_credentials(config)?;

    if config.fallback_tts_command.trim().is_empty() {
        return Err("FALLBACK_TTS_COMMAND cannot be empty".into());
    }
    if config.audio_player_command.trim().is_empty() {
        return Err("AUDIO_PLAYER_COMMAND cannot be empty".into());
    }
    if config.tts_request_timeout_seconds == 0 {
        return Err("TTS_REQUEST_TIMEOUT_SECONDS must be greater than 0".into());
    }

    Ok(())
}

fn validate_cache(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    if config.cache_ttl_seconds == 0 {
        return Err("CACHE_TTL_SECONDS must be greater than 0".into());
    }
    if config.cache_max_entries == Some(0) {
        return Err("CACHE_MAX_ENTRIES must be greater than 0 when set".into());
    }
    if config.cache_sweep_interval_seconds == Some(0) {
        return Err("CACHE_SWEEP_INTERVAL_SECONDS must be greater than 0 when set".into());
    }
    Ok(())
}

/// Validate ephemeral cache sizing
pub fn validate_ephemeral(
    max_entries: usize,
    eviction_batch: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    if max_entries == 0 {
        return Err("EPHEMERAL_MAX_ENTRIES must be greater than 0".into());
    }
    if eviction_batch == 0 || eviction_batch > max_entries {
        return Err(format!(
            "EPHEMERAL_EVICTION_BATCH must be between 1 and EPHEMERAL_MAX_ENTRIES ({max_entries}), got {eviction_batch}"
        )
        .into());
    }
    Ok(())
}

fn validate_credentials(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    if config.has_static_credentials() && config.azure_speech_region.trim().is_empty() {
        return Err(
            "AZURE_SPEECH_REGION is required when AZURE_SPEECH_SUBSCRIPTION_KEY is set".into(),
        );
    }
    if let Some(url) = &config.speech_credentials_url
        && !(url.starts_with("http://") || url.starts_with("https://"))
    {
        return Err(format!("SPEECH_CREDENTIALS_URL must be an http(s) URL: {url}").into());
    }
    Ok(())
}
