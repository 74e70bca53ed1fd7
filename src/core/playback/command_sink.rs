use std::process::Stdio;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{AudioSink, PlaybackError, PlaybackOutcome, PlaybackResult};

pub const DEFAULT_PLAYER_COMMAND: &str = "mpg123 -q -";

/// Plays audio by piping it into an external player such as `mpg123 -q -`.
#[derive(Debug, Clone)]
pub struct CommandAudioSink {
    program: String,
    args: Vec<String>,
}

impl CommandAudioSink {
    /// Splits `command_line` on whitespace; the first word is the program.
    pub fn new(command_line: &str) -> PlaybackResult<Self> {
        let mut words = command_line.split_whitespace().map(str::to_string);
        let program = words
            .next()
            .ok_or_else(|| PlaybackError::DeviceUnavailable("empty player command".into()))?;
        Ok(Self {
            program,
            args: words.collect(),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

#[async_trait]
impl AudioSink for CommandAudioSink {
    async fn play(&self, audio: Bytes, cancel: CancellationToken) -> PlaybackResult<PlaybackOutcome> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PlaybackError::DeviceUnavailable(format!("{}: {e}", self.program)))?;

        let writer = child.stdin.take().map(|mut stdin| {
            let program = self.program.clone();
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(&audio).await {
                    warn!("Writing audio to {} failed: {}", program, e);
                }
            })
        });

        let finished = tokio::select! {
            status = child.wait() => Some(status),
            _ = cancel.cancelled() => None,
        };

        if let Some(writer) = writer {
            writer.abort();
        }

        match finished {
            Some(status) => {
                let status = status
                    .map_err(|e| PlaybackError::Failed(format!("{}: {e}", self.program)))?;
                if status.success() {
                    Ok(PlaybackOutcome::Completed)
                } else {
                    Err(PlaybackError::Decode(format!(
                        "{} exited with {status}",
                        self.program
                    )))
                }
            }
            None => {
                debug!("Killing {}", self.program);
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
    fn test_command_line_is_split() {
        let sink = CommandAudioSink::new("mpg123 -q -").unwrap();
        assert_eq!(sink.program(), "mpg123");
        assert_eq!(sink.args(), ["-q", "-"]);
    }

    #[test]
    fn test_empty_command_is_rejected() {
        assert!(matches!(
            CommandAudioSink::new("   "),
            Err(PlaybackError::DeviceUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_player_is_device_unavailable() {
        let sink = CommandAudioSink::new("wordvoice-no-such-player-binary").unwrap();
        let result = sink
            .play(Bytes::from_static(b"abc"), CancellationToken::new())
            .await;
        assert!(matches!(result, Err(PlaybackError::DeviceUnavailable(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_player_consumes_audio() {
        let sink = CommandAudioSink::new("cat").unwrap();
        let outcome = sink
            .play(Bytes::from_static(b"audio"), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome, PlaybackOutcome::Completed);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancel_kills_player() {
        let sink = CommandAudioSink::new("sleep 10").unwrap();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let outcome = tokio::time::timeout(
            std::time::Duration::from_secs(2),
            sink.play(Bytes::from_static(b"x"), cancel),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(outcome, PlaybackOutcome::Interrupted);
    }
}
