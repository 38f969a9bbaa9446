//! Screen-level podcast player
//!
//! Owns the intent store and presenter, and forwards every resulting intent
//! to the engine. This is what the HTTP API drives.

use std::sync::Arc;

use earshot_common::events::PlayerEvent;
use earshot_common::models::{DirectoryEpisode, SearchHit};
use earshot_common::Episode;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::engine::EngineHandle;
use super::intent::{IntentStore, PlaybackIntent};
use super::presenter::{ToggleAction, TransportPresenter, TransportView};
use super::snapshot::PlaybackSnapshot;
use crate::error::Result;

/// Default skip step in seconds
pub const DEFAULT_SKIP_SECONDS: f64 = 10.0;

pub struct PodcastPlayer {
    store: IntentStore,
    presenter: TransportPresenter,
    engine: EngineHandle,
    skip_step: f64,
}

impl PodcastPlayer {
    pub fn new(engine: EngineHandle) -> Self {
        Self::with_skip_step(engine, DEFAULT_SKIP_SECONDS)
    }

    pub fn with_skip_step(engine: EngineHandle, skip_step: f64) -> Self {
        Self {
            store: IntentStore::new(),
            presenter: TransportPresenter::new(),
            engine,
            skip_step,
        }
    }

    pub fn intent(&self) -> &PlaybackIntent {
        self.store.current()
    }

    pub fn engine(&self) -> &EngineHandle {
        &self.engine
    }

    pub fn skip_step(&self) -> f64 {
        self.skip_step
    }

    fn push(&self) -> Result<()> {
        self.engine.apply_intent(self.store.current().clone())
    }

    /// Play `episode` from `start_offset_ms` (or the top)
    pub fn select_episode(
        &mut self,
        episode: Episode,
        start_offset_ms: Option<f64>,
    ) -> Result<()> {
        info!("Selecting episode {} at {:?}ms", episode.id, start_offset_ms);
        self.presenter.reset();
        self.store.select_episode(episode, start_offset_ms);
        self.push()
    }

    /// Play a search result from the matching moment
    pub fn select_hit(&mut self, hit: &SearchHit) -> Result<()> {
        self.select_episode(hit.to_episode(), hit.start_offset_ms())
    }

    /// Play a directory entry from the top
    pub fn select_directory_episode(&mut self, record: &DirectoryEpisode) -> Result<()> {
        self.select_episode(record.to_episode(), None)
    }

    /// Player unmounted
    pub fn close(&mut self) -> Result<()> {
        self.presenter.reset();
        self.store.clear();
        self.push()
    }

    pub fn set_playing(&mut self, playing: bool) -> Result<()> {
        self.store.set_playing(playing);
        self.push()
    }

    pub async fn toggle_play(&mut self) -> Result<ToggleAction> {
        let snapshot = self.engine.snapshot().await;
        let action = self.presenter.toggle(self.store.current(), &snapshot);
        match action {
            ToggleAction::Play => self.set_playing(true)?,
            ToggleAction::Pause => self.set_playing(false)?,
            ToggleAction::Retry => {
                info!("Retrying playback");
                self.engine.retry_play()?;
            }
        }
        Ok(action)
    }

    /// Skip by `delta_seconds`; returns the requested target in ms
    pub async fn skip(&mut self, delta_seconds: f64) -> Result<f64> {
        let snapshot = self.engine.snapshot().await;
        let target_ms = self
            .presenter
            .skip_target_ms(self.store.current(), &snapshot, delta_seconds);
        self.store.request_seek(target_ms);
        self.push()?;
        Ok(target_ms)
    }

    pub async fn skip_forward(&mut self) -> Result<f64> {
        self.skip(self.skip_step).await
    }

    pub async fn skip_back(&mut self) -> Result<f64> {
        self.skip(-self.skip_step).await
    }

    /// Slider drag to `percent`; returns the target in seconds
    pub async fn scrub_to(&mut self, percent: f64) -> Result<f64> {
        let snapshot = self.engine.snapshot().await;
        let seconds = self.presenter.scrub_to(percent, &snapshot);
        self.engine.scrub_to(seconds)?;
        Ok(seconds)
    }

    /// Programmatic seek through the token path
    pub fn seek_to_ms(&mut self, target_ms: f64) -> Result<()> {
        self.store.request_seek(target_ms);
        self.push()
    }

    pub fn set_notes_open(&mut self, open: bool) {
        self.presenter.set_notes_open(open);
    }

    pub fn notes(&self) -> String {
        self.presenter.notes(self.store.current())
    }

    pub async fn snapshot(&self) -> PlaybackSnapshot {
        self.engine.snapshot().await
    }

    pub async fn view(&self) -> TransportView {
        let snapshot = self.engine.snapshot().await;
        self.presenter.view(self.store.current(), &snapshot)
    }

    /// Fold an upward report from the engine into the intent store.
    ///
    /// The engine already acted on what it reported, so nothing is pushed back.
    pub fn observe(&mut self, event: &PlayerEvent) -> bool {
        let changed = self.store.reconcile(event);
        if changed {
            debug!(
                "Intent updated from {}: playing={}",
                event.event_type(),
                self.store.current().is_playing
            );
        }
        changed
    }
}

/// Forward upward reports from the event bus into `player`
pub fn spawn_reconciler(
    player: Arc<Mutex<PodcastPlayer>>,
    mut events: broadcast::Receiver<PlayerEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event @ PlayerEvent::ActualStateReported { .. })
                | Ok(event @ PlayerEvent::PlaybackEnded { .. }) => {
                    player.lock().await.observe(&event);
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Intent reconciler lagged; {} events skipped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        debug!("Intent reconciler stopped");
    })
}
