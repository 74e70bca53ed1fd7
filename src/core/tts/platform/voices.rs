//! Voice selection for platform speech engines.
//!
//! Candidates are ranked in tiers:
//!
//! 1. locale equals the accent's locale (case, `_` and `-` insensitive)
//! 2. the voice name mentions the accent's region
//! 3. the locale shares the accent's language prefix
//!
//! Inside a tier, names carrying a quality marker sort first. Remaining ties
//! keep the engine's order. Voices matching no tier are dropped.

use crate::core::cache::Accent;

const QUALITY_KEYWORDS: [&str; 5] = ["neural", "natural", "premium", "enhanced", "google"];

/// A voice reported by a platform engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformVoice {
    /// Identifier passed back to the engine when speaking.
    pub id: String,
    pub name: String,
    pub locale: String,
}

impl PlatformVoice {
    pub fn new(id: impl Into<String>, name: impl Into<String>, locale: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            locale: locale.into(),
        }
    }
}

fn normalize_locale(locale: &str) -> String {
    locale.trim().to_lowercase().replace('_', "-")
}

fn language_prefix(locale: &str) -> &str {
    locale.split('-').next().unwrap_or(locale)
}

fn name_tokens(name: &str) -> Vec<String> {
    name.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn mentions_region(voice: &PlatformVoice, accent: Accent) -> bool {
    let lowered = voice.name.to_lowercase().replace('_', " ");
    let tokens = name_tokens(&voice.name);
    accent.region_keywords().iter().any(|keyword| {
        if keyword.contains(' ') {
            lowered.contains(keyword)
        } else {
            tokens.iter().any(|t| t == keyword)
        }
    })
}

fn tier(voice: &PlatformVoice, accent: Accent) -> Option<u8> {
    let locale = normalize_locale(&voice.locale);
    let wanted = normalize_locale(accent.locale());

    if locale == wanted {
        Some(0)
    } else if mentions_region(voice, accent) {
        Some(1)
    } else if !locale.is_empty() && language_prefix(&locale) == language_prefix(&wanted) {
        Some(2)
    } else {
        None
    }
}

fn is_quality(voice: &PlatformVoice) -> bool {
    let name = voice.name.to_lowercase();
    QUALITY_KEYWORDS.iter().any(|k| name.contains(k))
}

/// Orders the usable voices for `accent`, best first.
pub fn rank_voices(voices: &[PlatformVoice], accent: Accent) -> Vec<&PlatformVoice> {
    let mut ranked: Vec<(u8, bool, &PlatformVoice)> = voices
        .iter()
        .filter_map(|v| tier(v, accent).map(|t| (t, !is_quality(v), v)))
        .collect();
    // Stable sort keeps engine order for equal keys.
    ranked.sort_by_key(|(tier, not_quality, _)| (*tier, *not_quality));
    ranked.into_iter().map(|(_, _, v)| v).collect()
}

/// Best voice for `accent`, if any qualifies.
pub fn select_voice(voices: &[PlatformVoice], accent: Accent) -> Option<&PlatformVoice> {
    rank_voices(voices, accent).into_iter().next()
}
