//! Command handle for a running engine

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::error::{Error, Result};
use crate::playback::intent::PlaybackIntent;
use crate::playback::snapshot::PlaybackSnapshot;
use crate::state::SharedState;

/// Messages accepted by the engine task
#[derive(Debug)]
pub(super) enum EngineCommand {
    /// Reconcile against a new intent
    ApplyIntent(PlaybackIntent),
    /// Move the playhead directly (slider drag)
    Scrub { seconds: f64 },
    /// User asked to try again after a failed play or load
    RetryPlay,
    /// Answered once everything queued before it has been handled
    Flush(oneshot::Sender<()>),
    Shutdown,
}

/// Cloneable handle to a running `PlaybackEngine`
#[derive(Clone)]
pub struct EngineHandle {
    pub(super) tx: mpsc::UnboundedSender<EngineCommand>,
    pub(super) state: Arc<SharedState>,
}

impl EngineHandle {
    fn send(&self, command: EngineCommand) -> Result<()> {
        self.tx.send(command).map_err(|_| Error::EngineStopped)
    }

    /// Push the latest intent. Intents are applied in send order.
    pub fn apply_intent(&self, intent: PlaybackIntent) -> Result<()> {
        self.send(EngineCommand::ApplyIntent(intent))
    }

    /// Jump straight to `seconds`, bypassing the seek-token path
    pub fn scrub_to(&self, seconds: f64) -> Result<()> {
        self.send(EngineCommand::Scrub { seconds })
    }

    pub fn retry_play(&self) -> Result<()> {
        self.send(EngineCommand::RetryPlay)
    }

    /// Wait until the engine has handled everything sent before this call
    /// and published the resulting snapshot.
    pub async fn flush(&self) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(EngineCommand::Flush(reply_tx))?;
        reply_rx.await.map_err(|_| Error::EngineStopped)
    }

    /// Ask the engine task to unload the source and exit
    pub fn shutdown(&self) {
        let _ = self.tx.send(EngineCommand::Shutdown);
    }

    /// Last published snapshot
    pub async fn snapshot(&self) -> PlaybackSnapshot {
        self.state.get_snapshot().await
    }

    pub fn shared_state(&self) -> &Arc<SharedState> {
        &self.state
    }

    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }
}
