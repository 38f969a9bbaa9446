//! Test harness for earshot-player integration tests
//!
//! Runs a real engine task over `SimulatedMedia`. The test drives the
//! element through the controller and calls `settle()` to wait until the
//! engine has drained everything sent so far.

#![allow(dead_code)]

use std::sync::Arc;

use earshot_common::events::PlayerEvent;
use earshot_common::Episode;
use earshot_player::media::{MediaOp, SimulatedController, SimulatedMedia};
use earshot_player::playback::{EngineConfig, PlaybackEngine, PlaybackSnapshot, PodcastPlayer};
use earshot_player::SharedState;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

pub struct Harness {
    pub player: PodcastPlayer,
    pub media: SimulatedController,
    pub state: Arc<SharedState>,
    events: broadcast::Receiver<PlayerEvent>,
    engine_task: JoinHandle<()>,
}

impl Harness {
    /// Engine without a buffering deadline
    pub fn start() -> Self {
        Self::with_config(EngineConfig {
            buffering_timeout: None,
        })
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let state = Arc::new(SharedState::default());
        let events = state.subscribe_events();
        let (media, controller) = SimulatedMedia::new();
        let (engine, engine_task) =
            PlaybackEngine::spawn(media, Arc::clone(&state), config).expect("engine spawns");

        Self {
            player: PodcastPlayer::new(engine),
            media: controller,
            state,
            events,
            engine_task,
        }
    }

    /// Wait until the engine has handled every command and notification so far
    pub async fn settle(&self) {
        self.player.engine().flush().await.expect("engine running");
    }

    pub async fn snapshot(&self) -> PlaybackSnapshot {
        self.player.snapshot().await
    }

    /// Drain broadcast events, folding upward reports into the player
    /// the way the reconciler task does.
    pub fn pump_events(&mut self) -> Vec<PlayerEvent> {
        let mut drained = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            self.player.observe(&event);
            drained.push(event);
        }
        drained
    }

    /// Select `episode`, deliver metadata with its declared duration, and
    /// let the element report it can play through.
    pub async fn start_playing(&mut self, episode: Episode, start_offset_ms: Option<f64>) {
        let duration = episode.duration_seconds;
        self.player
            .select_episode(episode, start_offset_ms)
            .expect("engine running");
        self.settle().await;
        self.media.load_metadata(Some(duration));
        self.settle().await;
        self.media.can_play();
        self.settle().await;
    }

    pub async fn shutdown(self) {
        self.player.engine().shutdown();
        let _ = self.engine_task.await;
    }
}

pub fn episode(id: &str, duration_seconds: f64) -> Episode {
    Episode::new(
        id,
        format!("Episode {}", id),
        format!("https://cdn.example/{}.mp3", id),
        duration_seconds,
    )
}

pub fn count_ops(ops: &[MediaOp], predicate: impl Fn(&MediaOp) -> bool) -> usize {
    ops.iter().filter(|op| predicate(op)).count()
}

pub fn seek_positions(ops: &[MediaOp]) -> Vec<f64> {
    ops.iter()
        .filter_map(|op| match op {
            MediaOp::SetPosition(seconds) => Some(*seconds),
            _ => None,
        })
        .collect()
}
