//! Playback intent: what the screen wants the player to do
//!
//! The intent is replaced wholesale on every user action and pushed to the
//! engine. Seeks carry a `SeekToken` so that asking for the same position
//! twice is still two requests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use earshot_common::events::PlayerEvent;
use earshot_common::Episode;
use serde::Serialize;
use tracing::debug;

static NEXT_SEEK_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Identity of one seek request. Never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SeekToken(u64);

impl SeekToken {
    /// Allocate a fresh token
    pub fn next() -> Self {
        SeekToken(NEXT_SEEK_TOKEN.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

/// Seek to `target_ms`. Compared by token, never by target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeekRequest {
    pub target_ms: f64,
    pub token: SeekToken,
}

impl SeekRequest {
    pub fn new(target_ms: f64) -> Self {
        let target_ms = if target_ms.is_finite() { target_ms.max(0.0) } else { 0.0 };
        Self {
            target_ms,
            token: SeekToken::next(),
        }
    }

    pub fn target_seconds(&self) -> f64 {
        self.target_ms / 1000.0
    }
}

/// Desired playback state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaybackIntent {
    pub episode: Option<Arc<Episode>>,
    pub is_playing: bool,
    pub seek_request: Option<SeekRequest>,
}

impl PlaybackIntent {
    pub fn seek_token(&self) -> Option<SeekToken> {
        self.seek_request.map(|s| s.token)
    }
}

/// Owner of the current intent
#[derive(Debug, Default)]
pub struct IntentStore {
    current: PlaybackIntent,
}

impl IntentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> &PlaybackIntent {
        &self.current
    }

    /// Select an episode, starting at `start_offset_ms` (or the top) and
    /// playing immediately when it has a stream.
    pub fn select_episode(
        &mut self,
        episode: Episode,
        start_offset_ms: Option<f64>,
    ) -> &PlaybackIntent {
        let playable = episode.is_playable();
        self.current = PlaybackIntent {
            episode: Some(Arc::new(episode)),
            is_playing: playable,
            seek_request: Some(SeekRequest::new(start_offset_ms.unwrap_or(0.0))),
        };
        &self.current
    }

    pub fn set_playing(&mut self, playing: bool) -> &PlaybackIntent {
        let playable = self
            .current
            .episode
            .as_ref()
            .is_some_and(|e| e.is_playable());
        self.current = PlaybackIntent {
            is_playing: playing && playable,
            ..self.current.clone()
        };
        &self.current
    }

    pub fn request_seek(&mut self, target_ms: f64) -> &PlaybackIntent {
        self.current = PlaybackIntent {
            seek_request: Some(SeekRequest::new(target_ms)),
            ..self.current.clone()
        };
        &self.current
    }

    /// Player unmounted
    pub fn clear(&mut self) -> &PlaybackIntent {
        self.current = PlaybackIntent::default();
        &self.current
    }

    /// Fold an upward report from the engine into the intent.
    ///
    /// Returns true when the intent changed. Reports about other episodes
    /// are ignored.
    pub fn reconcile(&mut self, event: &PlayerEvent) -> bool {
        let playing = match event {
            PlayerEvent::ActualStateReported { playing, .. } => *playing,
            PlayerEvent::PlaybackEnded { .. } => false,
            _ => return false,
        };

        let current_id = self.current.episode.as_ref().map(|e| &e.id);
        if current_id != event.episode_id() {
            debug!("Ignoring {} for a different episode", event.event_type());
            return false;
        }
        if self.current.is_playing == playing {
            return false;
        }

        self.current = PlaybackIntent {
            is_playing: playing,
            ..self.current.clone()
        };
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use earshot_common::EpisodeId;

    fn episode(id: &str) -> Episode {
        Episode::new(id, "Title", format!("https://cdn.example/{}.mp3", id), 600.0)
    }

    #[test]
    fn test_tokens_are_distinct_for_same_target() {
        let a = SeekRequest::new(5000.0);
        let b = SeekRequest::new(5000.0);
        assert_eq!(a.target_ms, b.target_ms);
        assert_ne!(a.token, b.token);
        assert_ne!(a, b);
    }

    #[test]
    fn test_seek_request_sanitizes_target() {
        assert_eq!(SeekRequest::new(-10.0).target_ms, 0.0);
        assert_eq!(SeekRequest::new(f64::NAN).target_ms, 0.0);
        assert_eq!(SeekRequest::new(1500.0).target_seconds(), 1.5);
    }

    #[test]
    fn test_select_episode_seeds_seek_and_play() {
        let mut store = IntentStore::new();
        let intent = store.select_episode(episode("a"), Some(120_000.0)).clone();

        assert!(intent.is_playing);
        assert_eq!(intent.seek_request.unwrap().target_ms, 120_000.0);
        assert_eq!(intent.episode.unwrap().id, EpisodeId::new("a"));
    }

    #[test]
    fn test_select_without_offset_starts_at_zero() {
        let mut store = IntentStore::new();
        let intent = store.select_episode(episode("a"), None);
        assert_eq!(intent.seek_request.unwrap().target_ms, 0.0);
    }

    #[test]
    fn test_unplayable_episode_never_intends_play() {
        let mut store = IntentStore::new();
        let mut ep = episode("a");
        ep.stream_url = None;

        assert!(!store.select_episode(ep, None).is_playing);
        assert!(!store.set_playing(true).is_playing);
    }

    #[test]
    fn test_reselect_same_episode_gets_new_token() {
        let mut store = IntentStore::new();
        let first = store.select_episode(episode("a"), Some(1000.0)).seek_token();
        let second = store.select_episode(episode("a"), Some(1000.0)).seek_token();
        assert_ne!(first, second);
    }

    #[test]
    fn test_reconcile_adopts_actual_state() {
        let mut store = IntentStore::new();
        store.select_episode(episode("a"), None);

        let report = PlayerEvent::ActualStateReported {
            episode_id: EpisodeId::new("a"),
            playing: false,
            timestamp: chrono::Utc::now(),
        };
        assert!(store.reconcile(&report));
        assert!(!store.current().is_playing);
        assert!(!store.reconcile(&report));
    }

    #[test]
    fn test_reconcile_ignores_other_episode() {
        let mut store = IntentStore::new();
        store.select_episode(episode("b"), None);

        let ended = PlayerEvent::PlaybackEnded {
            episode_id: EpisodeId::new("a"),
            timestamp: chrono::Utc::now(),
        };
        assert!(!store.reconcile(&ended));
        assert!(store.current().is_playing);
    }

    #[test]
    fn test_clear() {
        let mut store = IntentStore::new();
        store.select_episode(episode("a"), None);
        assert_eq!(store.clear(), &PlaybackIntent::default());
    }
}
