use std::env;
use std::str::FromStr;

/// Parse a boolean value from a string, supporting multiple formats
///
/// Accepts: "true", "false", "1", "0", "yes", "no" (case insensitive)
pub fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

/// Reads `name` from the environment and parses it.
///
/// Unset or blank variables are `Ok(None)`; a value that does not parse is an error.
pub fn env_parsed<T>(name: &str) -> Result<Option<T>, String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| format!("Invalid {name} environment variable '{raw}': {e}")),
        _ => Ok(None),
    }
}

/// Like [`env_parsed`] for booleans in any [`parse_bool`] form.
pub fn env_bool(name: &str) -> Result<Option<bool>, String> {
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => parse_bool(&raw)
            .map(Some)
            .ok_or_else(|| format!("Invalid {name} environment variable '{raw}': expected a boolean")),
        _ => Ok(None),
    }
}
