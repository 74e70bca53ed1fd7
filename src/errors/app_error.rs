use std::fmt;

use crate::core::playback::PlaybackError;
use crate::core::speech::SpeechError;
use crate::utils::req_manager::ReqManagerError;

/// Application error type
#[derive(Debug)]
pub enum AppError {
    /// Configuration could not be loaded or is invalid.
    Config(String),
    /// A component could not be started.
    Startup(String),
    /// A spoken request failed.
    Speech(SpeechError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(msg) => write!(f, "Configuration error: {msg}"),
            AppError::Startup(msg) => write!(f, "Startup failed: {msg}"),
            AppError::Speech(err) => write!(f, "Speech failed: {err}"),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Speech(err) => Some(err),
            _ => None,
        }
    }
}

impl From<Box<dyn std::error::Error>> for AppError {
    fn from(err: Box<dyn std::error::Error>) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<ReqManagerError> for AppError {
    fn from(err: ReqManagerError) -> Self {
        AppError::Startup(format!("HTTP client: {err}"))
    }
}

impl From<PlaybackError> for AppError {
    fn from(err: PlaybackError) -> Self {
        AppError::Startup(format!("audio output: {err}"))
    }
}

impl From<SpeechError> for AppError {
    fn from(err: SpeechError) -> Self {
        AppError::Speech(err)
    }
}

// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;
