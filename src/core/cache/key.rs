//! Cache key derivation for pronounced words.
//!
//! A [`CacheKey`] is a pure function of the normalized text and the accent:
//!
//! - surrounding whitespace is trimmed
//! - internal whitespace runs collapse to a single space
//! - the text is lowercased
//!
//! The key string is `"{normalized}_{accent}"`. The accent suffix always has the
//! same width, so two distinct `(text, accent)` pairs never map to the same key.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Errors produced while deriving keys or parsing accents.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheKeyError {
    #[error("text is empty after normalization")]
    EmptyText,

    #[error("unknown accent: {0} (expected us, uk or au)")]
    UnknownAccent(String),
}

/// Regional pronunciation variant selecting a distinct voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Accent {
    #[default]
    Us,
    Uk,
    Au,
}

impl Accent {
    /// Short code used in cache keys and configuration.
    pub fn code(&self) -> &'static str {
        match self {
            Accent::Us => "us",
            Accent::Uk => "uk",
            Accent::Au => "au",
        }
    }

    /// BCP-47 locale for the accent.
    pub fn locale(&self) -> &'static str {
        match self {
            Accent::Us => "en-US",
            Accent::Uk => "en-GB",
            Accent::Au => "en-AU",
        }
    }

    /// Lowercase words that identify the accent's region inside voice names.
    pub fn region_keywords(&self) -> &'static [&'static str] {
        match self {
            Accent::Us => &["united states", "america", "american", "us"],
            Accent::Uk => &[
                "united kingdom",
                "great britain",
                "british",
                "england",
                "uk",
                "gb",
            ],
            Accent::Au => &["australia", "aussie", "au"],
        }
    }
}

impl fmt::Display for Accent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Accent {
    type Err = CacheKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "us" | "en-us" => Ok(Accent::Us),
            "uk" | "gb" | "en-gb" => Ok(Accent::Uk),
            "au" | "en-au" => Ok(Accent::Au),
            _ => Err(CacheKeyError::UnknownAccent(s.to_string())),
        }
    }
}

/// Normalizes text the way cache keys see it.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Stable identifier of one synthesized utterance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derives the key for `(text, accent)`.
    ///
    /// Fails only when the text is empty after normalization.
    pub fn derive(text: &str, accent: Accent) -> Result<Self, CacheKeyError> {
        let normalized = normalize_text(text);
        if normalized.is_empty() {
            return Err(CacheKeyError::EmptyText);
        }
        Ok(Self(format!("{normalized}_{}", accent.code())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
