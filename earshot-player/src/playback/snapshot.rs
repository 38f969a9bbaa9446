//! Engine-owned view of actual playback

use earshot_common::EpisodeId;
use serde::Serialize;

use super::intent::SeekToken;

/// What the media element is actually doing, as last observed by the engine.
///
/// Only the engine writes this. Everyone else receives published copies.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybackSnapshot {
    pub episode_id: Option<EpisodeId>,
    pub current_time_seconds: f64,
    pub duration_seconds: f64,
    pub progress_percent: f64,
    pub is_buffering: bool,
    pub is_paused_at_element_level: bool,
    pub metadata_ready: bool,
    /// Play was rejected or timed out; cleared by the next successful play
    pub play_failed: bool,
    /// Source could not be loaded; cleared only by selecting an episode again
    pub load_failed: bool,
    pub ended: bool,
    /// Token of the last seek request the engine consumed
    pub applied_seek: Option<SeekToken>,
    /// Bumped every time a changed snapshot is published
    pub revision: u64,
}

impl Default for PlaybackSnapshot {
    fn default() -> Self {
        Self {
            episode_id: None,
            current_time_seconds: 0.0,
            duration_seconds: 0.0,
            progress_percent: 0.0,
            is_buffering: false,
            is_paused_at_element_level: true,
            metadata_ready: false,
            play_failed: false,
            load_failed: false,
            ended: false,
            applied_seek: None,
            revision: 0,
        }
    }
}

impl PlaybackSnapshot {
    /// Fresh snapshot for a newly assigned source
    pub fn for_episode(episode_id: EpisodeId) -> Self {
        Self {
            episode_id: Some(episode_id),
            ..Self::default()
        }
    }

    pub fn is_playing(&self) -> bool {
        !self.is_paused_at_element_level
    }

    /// Set position and duration, recomputing the percentage
    pub fn set_progress(&mut self, current_time_seconds: f64, duration_seconds: f64) {
        self.current_time_seconds = sanitize(current_time_seconds);
        self.duration_seconds = sanitize(duration_seconds);
        self.progress_percent = progress_percent(self.current_time_seconds, self.duration_seconds);
    }

    /// Equal apart from the revision counter
    pub fn same_state(&self, other: &Self) -> bool {
        Self {
            revision: other.revision,
            ..self.clone()
        } == *other
    }
}

/// `current / duration` as 0–100, zero when duration is unknown
pub fn progress_percent(current_seconds: f64, duration_seconds: f64) -> f64 {
    if !duration_seconds.is_finite() || duration_seconds <= 0.0 || !current_seconds.is_finite() {
        return 0.0;
    }
    (current_seconds / duration_seconds * 100.0).clamp(0.0, 100.0)
}

fn sanitize(seconds: f64) -> f64 {
    if seconds.is_finite() {
        seconds.max(0.0)
    } else {
        0.0
    }
}
