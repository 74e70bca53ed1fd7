use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use rodio::{Decoder, OutputStream, Sink};
use tokio::sync::oneshot;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

use super::{AudioSink, PlaybackError, PlaybackOutcome, PlaybackResult};

/// Plays through the default output device.
///
/// The output stream is not `Send`, so each utterance opens it on a blocking
/// thread and keeps it there until the sink drains. The sink itself is handed
/// back so cancellation can stop it from the async side.
#[derive(Debug, Default, Clone, Copy)]
pub struct RodioSink;

impl RodioSink {
    pub fn new() -> Self {
        Self
    }

    fn play_blocking(audio: Bytes, ready: oneshot::Sender<Arc<Sink>>) -> PlaybackResult<()> {
        let (_stream, handle) = OutputStream::try_default()
            .map_err(|e| PlaybackError::DeviceUnavailable(e.to_string()))?;
        let sink =
            Sink::try_new(&handle).map_err(|e| PlaybackError::DeviceUnavailable(e.to_string()))?;
        let source =
            Decoder::new(Cursor::new(audio)).map_err(|e| PlaybackError::Decode(e.to_string()))?;

        sink.append(source);
        sink.play();

        let sink = Arc::new(sink);
        if ready.send(sink.clone()).is_err() {
            sink.stop();
            return Ok(());
        }
        // Returns early once `stop()` is called from the cancel waiter.
        sink.sleep_until_end();
        Ok(())
    }
}

fn joined(result: Result<PlaybackResult<()>, JoinError>) -> PlaybackResult<()> {
    result.map_err(|e| PlaybackError::Failed(e.to_string()))?
}

/// Waits for a blocking playback to finish, calling `stop` as soon as `cancel` fires.
///
/// `ready` yields the handle `stop` acts on once the device is playing; if the
/// blocking side fails before that, its error is returned.
async fn wait_or_stop<T>(
    ready: oneshot::Receiver<T>,
    mut playing: JoinHandle<PlaybackResult<()>>,
    cancel: CancellationToken,
    stop: impl FnOnce(&T),
) -> PlaybackResult<PlaybackOutcome> {
    let Ok(handle) = ready.await else {
        joined(playing.await)?;
        return Ok(PlaybackOutcome::Interrupted);
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            stop(&handle);
            joined(playing.await)?;
            Ok(PlaybackOutcome::Interrupted)
        }
        result = &mut playing => {
            joined(result)?;
            Ok(PlaybackOutcome::Completed)
        }
    }
}

#[async_trait]
impl AudioSink for RodioSink {
    async fn play(&self, audio: Bytes, cancel: CancellationToken) -> PlaybackResult<PlaybackOutcome> {
        let (ready_tx, ready_rx) = oneshot::channel();
        let playing = tokio::task::spawn_blocking(move || Self::play_blocking(audio, ready_tx));
        wait_or_stop(ready_rx, playing, cancel, |sink: &Arc<Sink>| sink.stop()).await
    }
}
