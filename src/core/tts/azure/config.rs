//! Azure Text-to-Speech configuration and SSML generation.

use serde::Deserialize;

use crate::core::cache::Accent;

/// HTTP header carrying the requested output format.
pub const AZURE_OUTPUT_FORMAT_HEADER: &str = "X-Microsoft-OutputFormat";

/// HTTP header carrying the subscription key.
pub const AZURE_SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

/// Compressed output; utterances are short single words so size beats latency.
pub const DEFAULT_OUTPUT_FORMAT: &str = "audio-24khz-48kbitrate-mono-mp3";

pub const DEFAULT_AZURE_REGION: &str = "eastus";

/// Escapes XML special characters in text for safe inclusion in SSML.
///
/// # Example
///
/// ```rust
/// use wordvoice::core::tts::azure::escape_xml;
///
/// assert_eq!(escape_xml("salt & pepper"), "salt &amp; pepper");
/// assert_eq!(escape_xml("<b>"), "&lt;b&gt;");
/// ```
pub fn escape_xml(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => result.push_str("&amp;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '"' => result.push_str("&quot;"),
            '\'' => result.push_str("&apos;"),
            _ => result.push(c),
        }
    }
    result
}

/// Wraps text in an SSML document for the given voice.
///
/// # Example
///
/// ```rust
/// use wordvoice::core::tts::azure::build_ssml;
///
/// let ssml = build_ssml("tomato", "en-GB-SoniaNeural", "en-GB");
/// assert!(ssml.contains("xml:lang='en-GB'"));
/// assert!(ssml.contains("<voice name='en-GB-SoniaNeural'>tomato</voice>"));
/// ```
pub fn build_ssml(text: &str, voice_name: &str, language: &str) -> String {
    let escaped = escape_xml(text);
    format!(
        "<speak version='1.0' xmlns='http://www.w3.org/2001/10/synthesis' xml:lang='{language}'>\
         <voice name='{voice_name}'>{escaped}</voice></speak>"
    )
}

/// Neural voice used for each accent.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AzureVoices {
    pub us: String,
    pub uk: String,
    pub au: String,
}

impl Default for AzureVoices {
    fn default() -> Self {
        Self {
            us: "en-US-JennyNeural".to_string(),
            uk: "en-GB-SoniaNeural".to_string(),
            au: "en-AU-NatashaNeural".to_string(),
        }
    }
}

impl AzureVoices {
    pub fn voice_for(&self, accent: Accent) -> &str {
        match accent {
            Accent::Us => &self.us,
            Accent::Uk => &self.uk,
            Accent::Au => &self.au,
        }
    }
}

/// Settings for the Azure REST synthesis endpoint.
#[derive(Debug, Clone)]
pub struct AzureTTSConfig {
    pub subscription_key: String,

    /// Speech resource region, e.g. `eastus`.
    pub region: String,

    pub voices: AzureVoices,

    /// Value of the `X-Microsoft-OutputFormat` header.
    pub output_format: String,

    /// Full synthesis URL overriding the regional endpoint.
    pub endpoint: Option<String>,
}

impl AzureTTSConfig {
    pub fn new(subscription_key: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            subscription_key: subscription_key.into(),
            region: region.into(),
            voices: AzureVoices::default(),
            output_format: DEFAULT_OUTPUT_FORMAT.to_string(),
            endpoint: None,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_voices(mut self, voices: AzureVoices) -> Self {
        self.voices = voices;
        self
    }

    /// Format: `https://{region}.tts.speech.microsoft.com/cognitiveservices/v1`
    pub fn build_tts_url(&self) -> String {
        match &self.endpoint {
            Some(endpoint) => endpoint.clone(),
            None => format!(
                "https://{}.tts.speech.microsoft.com/cognitiveservices/v1",
                self.region
            ),
        }
    }

    pub fn build_ssml_for(&self, text: &str, accent: Accent) -> String {
        build_ssml(text, self.voices.voice_for(accent), accent.locale())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_xml_all_specials() {
        assert_eq!(
            escape_xml(r#"a&b<c>d"e'f"#),
            "a&amp;b&lt;c&gt;d&quot;e&apos;f"
        );
        assert_eq!(escape_xml("plain"), "plain");
    }

    #[test]
    fn test_default_voices_per_accent() {
        let voices = AzureVoices::default();
        assert_eq!(voices.voice_for(Accent::Us), "en-US-JennyNeural");
        assert_eq!(voices.voice_for(Accent::Uk), "en-GB-SoniaNeural");
        assert_eq!(voices.voice_for(Accent::Au), "en-AU-NatashaNeural");
    }

    #[test]
    fn test_build_tts_url_regional_and_override() {
        let config = AzureTTSConfig::new("key", "westeurope");
        assert_eq!(
            config.build_tts_url(),
            "https://westeurope.tts.speech.microsoft.com/cognitiveservices/v1"
        );

        let config = config.with_endpoint("http://127.0.0.1:9999/tts");
        assert_eq!(config.build_tts_url(), "http://127.0.0.1:9999/tts");
    }

    #[test]
    fn test_ssml_uses_accent_voice_and_locale() {
        let config = AzureTTSConfig::new("key", "eastus");
        let ssml = config.build_ssml_for("G'day", Accent::Au);
        assert!(ssml.contains("xml:lang='en-AU'"));
        assert!(ssml.contains("en-AU-NatashaNeural"));
        assert!(ssml.contains("G&apos;day"));
    }

    #[test]
    fn test_voices_deserialize_with_partial_override() {
        let voices: AzureVoices = serde_json::from_str(r#"{"uk": "en-GB-RyanNeural"}"#).unwrap();
        assert_eq!(voices.uk, "en-GB-RyanNeural");
        assert_eq!(voices.us, "en-US-JennyNeural");
    }
}
