//! Configuration for wordvoice.
//!
//! Settings come from YAML files and environment variables. The split mirrors
//! the concerns involved:
//!
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Merging YAML and environment configurations
//! - `validation`: Configuration validation logic
//! - `utils`: Utility functions for configuration parsing
//!
//! # Example
//! ```rust,no_run
//! use wordvoice::config::AppConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = AppConfig::from_env()?;
//!
//! // Load from YAML file with environment variable fallbacks
//! let config = AppConfig::from_file(&PathBuf::from("wordvoice.yaml"))?;
//! println!("Caching under {:?}", config.cache_path);
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::time::Duration;

use crate::core::cache::{Accent, CacheConfig};
use crate::core::speech::SpeechSettings;
use crate::core::tts::AzureVoices;

mod env;
mod merge;
mod utils;
mod validation;
mod yaml;

pub use utils::parse_bool;

/// Application configuration
///
/// Contains everything needed to wire the speech coordinator:
/// - Durable and ephemeral cache settings
/// - Azure credentials (static or fetched)
/// - Fallback speech engine and audio player commands
/// - User speech preferences
#[derive(Debug, Clone)]
pub struct AppConfig {
    // Durable cache (filesystem when a path is set, memory otherwise)
    pub cache_path: Option<PathBuf>,
    pub cache_ttl_seconds: u64,
    pub cache_max_entries: Option<usize>,
    pub cache_sweep_interval_seconds: Option<u64>,

    // Ephemeral cache
    pub ephemeral_max_entries: usize,
    pub ephemeral_eviction_batch: usize,

    // Primary backend
    pub azure_speech_subscription_key: Option<String>,
    pub azure_speech_region: String,
    pub azure_voices: AzureVoices,
    pub speech_credentials_url: Option<String>,
    pub tts_request_timeout_seconds: u64,

    // Fallback backend and output
    pub fallback_tts_command: String,
    pub audio_player_command: String,

    // User preferences
    pub default_accent: Accent,
    pub autoplay: bool,
}

impl AppConfig {
    /// Load configuration from a YAML file with environment variable fallbacks
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables
    /// 3. Default values
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, a value has an
    /// invalid format, or validation fails.
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        // .env is not loaded here; the YAML file is the source of truth.
        let yaml_config = yaml::YamlConfig::from_file(path)?;
        let config = merge::merge_config(Some(yaml_config))?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Durable store settings.
    pub fn cache_config(&self) -> CacheConfig {
        match &self.cache_path {
            Some(path) => CacheConfig::Filesystem {
                path: path.clone(),
                ttl_seconds: Some(self.cache_ttl_seconds),
            },
            None => CacheConfig::Memory {
                ttl_seconds: Some(self.cache_ttl_seconds),
            },
        }
    }

    pub fn speech_settings(&self) -> SpeechSettings {
        SpeechSettings {
            accent: self.default_accent,
            autoplay: self.autoplay,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.tts_request_timeout_seconds)
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        self.cache_sweep_interval_seconds.map(Duration::from_secs)
    }

    /// Whether Azure credentials are configured statically.
    pub fn has_static_credentials(&self) -> bool {
        self.azure_speech_subscription_key
            .as_deref()
            .is_some_and(|key| !key.trim().is_empty())
    }
}
