//! Core playback engine: state, event loop, publishing
//!
//! The engine is a single tokio task that exclusively owns the media element.
//! It multiplexes four sources, in priority order:
//! 1. media element notifications
//! 2. settling `play()` futures
//! 3. the buffering deadline (when enabled)
//! 4. commands from `EngineHandle`s
//!
//! Every message is handled to completion before the next one is looked at,
//! and the snapshot is published after each.

use std::sync::Arc;
use std::time::Duration;

use earshot_common::events::{PlaybackState, PlayerEvent};
use earshot_common::Episode;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use super::handle::{EngineCommand, EngineHandle};
use crate::error::{Error, Result};
use crate::media::{LoadId, MediaElement, MediaError, MediaNotification};
use crate::playback::intent::{PlaybackIntent, SeekRequest};
use crate::playback::snapshot::PlaybackSnapshot;
use crate::state::SharedState;

/// Engine tuning
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Give up on buffering after this long and offer a retry; `None` waits forever
    pub buffering_timeout: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            buffering_timeout: Some(Duration::from_secs(30)),
        }
    }
}

/// Source currently assigned to the element
#[derive(Debug, Clone)]
pub(super) struct LoadedSource {
    pub(super) load_id: LoadId,
    pub(super) episode: Arc<Episode>,
}

/// Outcome of one `play()` call, tagged with the source and attempt it belongs to
pub(super) struct PlaySettled {
    pub(super) load_id: LoadId,
    pub(super) attempt: u64,
    pub(super) result: std::result::Result<(), MediaError>,
}

/// Reconciles playback intent with a media element
pub struct PlaybackEngine<M: MediaElement> {
    pub(super) media: M,
    pub(super) notifications: mpsc::UnboundedReceiver<MediaNotification>,
    pub(super) commands: mpsc::UnboundedReceiver<EngineCommand>,
    pub(super) state: Arc<SharedState>,
    pub(super) config: EngineConfig,

    /// Last intent applied (plus upward corrections)
    pub(super) intent: PlaybackIntent,
    pub(super) snapshot: PlaybackSnapshot,
    pub(super) published: PlaybackSnapshot,

    pub(super) load_id: LoadId,
    pub(super) loaded: Option<LoadedSource>,
    /// Seek waiting for metadata
    pub(super) pending_seek: Option<SeekRequest>,

    pub(super) play_attempt: u64,
    /// Attempt whose settlement is still awaited and still wanted
    pub(super) play_in_flight: Option<u64>,
    pub(super) pending_plays: FuturesUnordered<BoxFuture<'static, PlaySettled>>,

    pub(super) buffering_since: Option<Instant>,
    /// Buffering was raised only by a play deferred until metadata
    pub(super) buffering_for_deferred_play: bool,
}

impl<M: MediaElement> PlaybackEngine<M> {
    /// Start the engine task for `media`
    pub fn spawn(
        mut media: M,
        state: Arc<SharedState>,
        config: EngineConfig,
    ) -> Result<(EngineHandle, JoinHandle<()>)> {
        let notifications = media.take_notifications().ok_or_else(|| {
            Error::InvalidState("media element notifications already taken".to_string())
        })?;
        let (tx, commands) = mpsc::unbounded_channel();

        let engine = Self {
            media,
            notifications,
            commands,
            state: Arc::clone(&state),
            config,
            intent: PlaybackIntent::default(),
            snapshot: PlaybackSnapshot::default(),
            published: PlaybackSnapshot::default(),
            load_id: LoadId(0),
            loaded: None,
            pending_seek: None,
            play_attempt: 0,
            play_in_flight: None,
            pending_plays: FuturesUnordered::new(),
            buffering_since: None,
            buffering_for_deferred_play: false,
        };

        let task = tokio::spawn(engine.run());
        Ok((EngineHandle { tx, state }, task))
    }

    async fn run(mut self) {
        info!(
            "Playback engine started (buffering timeout: {:?})",
            self.config.buffering_timeout
        );

        loop {
            let deadline = self.buffering_deadline();

            tokio::select! {
                biased;

                Some(notification) = self.notifications.recv() => {
                    self.on_notification(notification);
                }
                Some(settled) = self.pending_plays.next(), if !self.pending_plays.is_empty() => {
                    self.on_play_settled(settled);
                }
                _ = sleep_until(deadline), if deadline.is_some() => {
                    self.on_buffering_timeout();
                }
                command = self.commands.recv() => match command {
                    Some(EngineCommand::ApplyIntent(intent)) => self.apply_intent(intent),
                    Some(EngineCommand::Scrub { seconds }) => self.scrub(seconds),
                    Some(EngineCommand::RetryPlay) => self.retry_play(),
                    Some(EngineCommand::Flush(reply)) => {
                        self.publish().await;
                        let _ = reply.send(());
                        continue;
                    }
                    Some(EngineCommand::Shutdown) | None => break,
                },
            }

            self.publish().await;
        }

        self.media.unload();
        self.snapshot = PlaybackSnapshot::default();
        self.publish().await;
        info!("Playback engine stopped");
    }

    fn buffering_deadline(&self) -> Option<Instant> {
        let timeout = self.config.buffering_timeout?;
        self.buffering_since.map(|since| since + timeout)
    }

    /// Publish the snapshot if anything changed since the last publish
    pub(super) async fn publish(&mut self) {
        if self.snapshot.same_state(&self.published) {
            return;
        }

        if self.snapshot.is_paused_at_element_level != self.published.is_paused_at_element_level {
            let old_state = PlaybackState::from_playing(self.published.is_playing());
            let new_state = PlaybackState::from_playing(self.snapshot.is_playing());
            debug!("Element state {} -> {}", old_state, new_state);
            self.emit(PlayerEvent::PlaybackStateChanged {
                episode_id: self.snapshot.episode_id.clone(),
                old_state,
                new_state,
                timestamp: chrono::Utc::now(),
            });
        }

        self.snapshot.revision = self.published.revision + 1;
        self.published = self.snapshot.clone();
        self.state.set_snapshot(self.snapshot.clone()).await;
    }

    pub(super) fn emit(&self, event: PlayerEvent) {
        self.state.event_bus.emit_lossy(event);
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
