use serde::Deserialize;
use std::path::PathBuf;

use crate::core::tts::AzureVoices;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Environment
/// variables fill in whatever the file leaves out.
///
/// # Example YAML structure
/// ```yaml
/// cache:
///   path: "/var/cache/wordvoice"
///   ttl_seconds: 2592000
///   max_entries: 5000
///   sweep_interval_seconds: 3600
///
/// ephemeral:
///   max_entries: 100
///   eviction_batch: 20
///
/// providers:
///   azure_speech_subscription_key: "your-azure-key"
///   azure_speech_region: "eastus"
///   speech_credentials_url: "https://config.example.com/speech"
///   request_timeout_seconds: 10
///   azure_voices:
///     us: "en-US-JennyNeural"
///     uk: "en-GB-SoniaNeural"
///     au: "en-AU-NatashaNeural"
///
/// fallback:
///   command: "espeak-ng"
///
/// playback:
///   player_command: "mpg123 -q -"
///
/// speech:
///   default_accent: "uk"
///   autoplay: true
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub cache: Option<CacheYaml>,
    pub ephemeral: Option<EphemeralYaml>,
    pub providers: Option<ProvidersYaml>,
    pub fallback: Option<FallbackYaml>,
    pub playback: Option<PlaybackYaml>,
    pub speech: Option<SpeechYaml>,
}

/// Durable cache configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct CacheYaml {
    pub path: Option<String>,
    pub ttl_seconds: Option<u64>,
    pub max_entries: Option<usize>,
    pub sweep_interval_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct EphemeralYaml {
    pub max_entries: Option<usize>,
    pub eviction_batch: Option<usize>,
}

/// Primary backend settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ProvidersYaml {
    /// Azure Speech Services subscription key from Azure Portal
    /// (Azure Portal → Speech resource → Keys and Endpoint → Key 1 or Key 2)
    pub azure_speech_subscription_key: Option<String>,
    /// Azure region where the Speech resource is deployed (e.g., "eastus", "westus2")
    pub azure_speech_region: Option<String>,
    pub azure_voices: Option<AzureVoices>,
    /// Endpoint returning `{"key": ..., "region": ...}` when no key is configured.
    pub speech_credentials_url: Option<String>,
    pub request_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct FallbackYaml {
    pub command: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PlaybackYaml {
    pub player_command: Option<String>,
}

/// User preferences from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SpeechYaml {
    pub default_accent: Option<String>,
    pub autoplay: Option<bool>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if:
    /// - The file cannot be read
    /// - The YAML is malformed
    /// - Fields have invalid types
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;

        let config: YamlConfig = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse YAML config: {e}"))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_yaml_config_full() {
        let yaml = r#"
cache:
  path: "/tmp/cache"
  ttl_seconds: 3600
  max_entries: 500
  sweep_interval_seconds: 60

ephemeral:
  max_entries: 50
  eviction_batch: 5

providers:
  azure_speech_subscription_key: "azure-key"
  azure_speech_region: "westeurope"
  speech_credentials_url: "https://config.example.com/speech"
  request_timeout_seconds: 4
  azure_voices:
    uk: "en-GB-RyanNeural"

fallback:
  command: "say"

playback:
  player_command: "ffplay -nodisp -autoexit -"

speech:
  default_accent: "uk"
  autoplay: false
"#;

        let config: YamlConfig = serde_yaml::from_str(yaml).unwrap();

        let cache = config.cache.as_ref().unwrap();
        assert_eq!(cache.path, Some("/tmp/cache".to_string()));
        assert_eq!(cache.ttl_seconds, Some(3600));
        assert_eq!(cache.max_entries, Some(500));
        assert_eq!(cache.sweep_interval_seconds, Some(60));

        let ephemeral = config.ephemeral.as_ref().unwrap();
        assert_eq!(ephemeral.max_entries, Some(50));
        assert_eq!(ephemeral.eviction_batch, Some(5));

        let providers = config.providers.as_ref().unwrap();
        assert_eq!(
            providers.azure_speech_region,
            Some("westeurope".to_string())
        );
        let voices = providers.azure_voices.as_ref().unwrap();
        assert_eq!(voices.uk, "en-GB-RyanNeural");
        assert_eq!(voices.us, "en-US-JennyNeural");

        assert_eq!(
            config.fallback.as_ref().unwrap().command,
            Some("say".to_string())
        );
        assert_eq!(
            config.playback.as_ref().unwrap().player_command,
            Some("ffplay -nodisp -autoexit -".to_string())
        );

        let speech = config.speech.as_ref().unwrap();
        assert_eq!(speech.default_accent, Some("uk".to_string()));
        assert_eq!(speech.autoplay, Some(false));
    }

    #[test]
    fn test_yaml_config_partial() {
        let yaml = r#"
speech:
  autoplay: true
"#;

        let config: YamlConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.cache.is_none());
        assert!(config.providers.is_none());
        assert_eq!(config.speech.as_ref().unwrap().autoplay, Some(true));
        assert!(config.speech.as_ref().unwrap().default_accent.is_none());
    }

    #[test]
    fn test_yaml_config_empty() {
        let config: YamlConfig = serde_yaml::from_str("{}").unwrap();
        assert!(config.cache.is_none());
        assert!(config.ephemeral.is_none());
        assert!(config.speech.is_none());
    }

    #[test]
    fn test_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.yaml");
        fs::write(&path, "cache:\n  ttl_seconds: 90\n").unwrap();

        let config = YamlConfig::from_file(&path).unwrap();
        assert_eq!(config.cache.unwrap().ttl_seconds, Some(90));
    }

    #[test]
    fn test_from_file_not_found() {
        let result = YamlConfig::from_file(&PathBuf::from("/nonexistent/wordvoice.yaml"));
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to read config file")
        );
    }

    #[test]
    fn test_from_file_invalid_yaml() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.yaml");
        fs::write(&path, "cache:\n  ttl_seconds: [not, a, number]\n").unwrap();

        let result = YamlConfig::from_file(&path);
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to parse YAML config")
        );
    }
}
