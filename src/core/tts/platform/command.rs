use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::PlatformSpeechEngine;
use super::voices::PlatformVoice;
use crate::core::playback::PlaybackOutcome;
use crate::core::tts::base::{TTSError, TTSResult};

pub const DEFAULT_SPEECH_COMMAND: &str = "espeak-ng";

/// Speaks through an `espeak-ng` compatible command line program.
pub struct CommandSpeechEngine {
    program: String,
}

impl CommandSpeechEngine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl Default for CommandSpeechEngine {
    fn default() -> Self {
        Self::new(DEFAULT_SPEECH_COMMAND)
    }
}

/// Parses the table printed by `--voices`.
///
/// ```text
/// Pty Language       Age/Gender VoiceName          File          Other Languages
///  5  en-us           --/M      English_(America)  gmw/en-US
/// ```
pub fn parse_voice_table(output: &str) -> Vec<PlatformVoice> {
    output
        .lines()
        .skip(1)
        .filter_map(|line| {
            let columns: Vec<&str> = line.split_whitespace().collect();
            if columns.len() < 4 {
                return None;
            }
            Some(PlatformVoice::new(columns[1], columns[3], columns[1]))
        })
        .collect()
}

#[async_trait]
impl PlatformSpeechEngine for CommandSpeechEngine {
    fn name(&self) -> &str {
        &self.program
    }

    async fn list_voices(&self) -> TTSResult<Vec<PlatformVoice>> {
        let output = Command::new(&self.program)
            .arg("--voices")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| TTSError::ProviderNotReady(format!("{}: {e}", self.program)))?;

        if !output.status.success() {
            return Err(TTSError::ProviderError(format!(
                "{} --voices exited with {}",
                self.program, output.status
            )));
        }

        Ok(parse_voice_table(&String::from_utf8_lossy(&output.stdout)))
    }

    async fn speak(
        &self,
        text: &str,
        voice: Option<&PlatformVoice>,
        cancel: CancellationToken,
    ) -> TTSResult<PlaybackOutcome> {
        let mut command = Command::new(&self.program);
        if let Some(voice) = voice {
            command.arg("-v").arg(&voice.id);
        }
        // Text goes through stdin so words starting with '-' are never read as flags.
        command
            .arg("--stdin")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|e| TTSError::ProviderNotReady(format!("{}: {e}", self.program)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(text.as_bytes())
                .await
                .map_err(|e| TTSError::InternalError(format!("writing to {}: {e}", self.program)))?;
        }

        let finished = tokio::select! {
            status = child.wait() => Some(status),
            _ = cancel.cancelled() => None,
        };

        match finished {
            Some(status) => {
                let status = status
                    .map_err(|e| TTSError::InternalError(format!("{}: {e}", self.program)))?;
                if status.success() {
                    Ok(PlaybackOutcome::Completed)
                } else {
                    Err(TTSError::AudioGenerationFailed(format!(
                        "{} exited with {status}",
                        self.program
                    )))
                }
            }
            None => {
                debug!("Interrupting {}", self.program);
                let _ = child.kill().await;
                Ok(PlaybackOutcome::Interrupted)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_voice_table() {
        let output = "\
Pty Language       Age/Gender VoiceName          File                 Other Languages
 5  en-gb           --/M      English_(Great_Britain) gmw/en          (en 2)
 2  en-us           --/M      English_(America)  gmw/en-US            (en 3)
 5  fr-fr           --/M      French_(France)    roa/fr
";
        let voices = parse_voice_table(output);
        assert_eq!(voices.len(), 3);
        assert_eq!(voices[0].id, "en-gb");
        assert_eq!(voices[0].name, "English_(Great_Britain)");
        assert_eq!(voices[1].locale, "en-us");
    }

    #[test]
    fn test_parse_ignores_short_lines() {
        assert!(parse_voice_table("header\n\n  junk\n").is_empty());
    }

    #[tokio::test]
    async fn test_missing_program_is_not_ready() {
        let engine = CommandSpeechEngine::new("wordvoice-no-such-speech-program");
        assert!(matches!(
            engine.list_voices().await,
            Err(TTSError::ProviderNotReady(_))
        ));
        assert!(matches!(
            engine.speak("hello", None, CancellationToken::new()).await,
            Err(TTSError::ProviderNotReady(_))
        ));
    }
}
