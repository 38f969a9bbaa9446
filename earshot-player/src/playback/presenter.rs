//! Transport controls and progress presenter
//!
//! Derives display values from the intent and the published snapshot, and
//! turns gestures (toggle, skip, scrub) into intent changes. Holds no
//! playback state of its own, only the notes panel flag and a short-lived
//! scrub preview.

use earshot_common::human_time::{format_elapsed, format_minutes_label, format_offset_ms};
use earshot_common::models::SearchHit;
use earshot_common::EpisodeId;
use serde::Serialize;

use super::intent::PlaybackIntent;
use super::snapshot::{progress_percent, PlaybackSnapshot};

/// Shown when an episode carries no description
pub const NO_SHOW_NOTES: &str = "No show notes available.";

/// Which control the play button shows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportAffordance {
    /// Nothing playable selected; button disabled
    Unavailable,
    /// Waiting for data; button disabled
    Buffering,
    Play,
    Pause,
}

/// What a play-button press should do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleAction {
    Play,
    Pause,
    /// Play is intended but failed; ask the engine to try again
    Retry,
}

/// Everything the transport bar renders
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransportView {
    pub episode_id: Option<EpisodeId>,
    pub title: Option<String>,
    pub podcast_title: Option<String>,
    pub length_label: Option<String>,
    pub artwork_url: Option<String>,
    pub elapsed: String,
    pub duration: String,
    pub progress_percent: f64,
    pub affordance: TransportAffordance,
    pub play_failed: bool,
    pub load_failed: bool,
    pub notes_open: bool,
}

/// A search result as the result list shows it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultCard {
    #[serde(flatten)]
    pub hit: SearchHit,
    /// Where in the episode the matching answer starts
    pub hear_at: Option<String>,
    pub length_label: Option<String>,
    pub playable: bool,
}

impl ResultCard {
    pub fn from_hit(hit: SearchHit) -> Self {
        let episode = hit.to_episode();
        Self {
            hear_at: hit.start_offset_ms().map(format_offset_ms),
            length_label: episode.declared_duration().map(format_minutes_label),
            playable: episode.is_playable(),
            hit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ScrubPreview {
    percent: f64,
    seconds: f64,
    /// Snapshot revision the preview was made against
    revision: u64,
}

#[derive(Debug, Default)]
pub struct TransportPresenter {
    notes_open: bool,
    scrub_preview: Option<ScrubPreview>,
}

impl TransportPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(&self, intent: &PlaybackIntent, snapshot: &PlaybackSnapshot) -> TransportView {
        let episode = intent.episode.as_deref();
        let preview = self.active_preview(snapshot);

        let (elapsed, progress) = match preview {
            Some(p) => (p.seconds, p.percent),
            None => (snapshot.current_time_seconds, snapshot.progress_percent),
        };
        let duration = display_duration(intent, snapshot);

        TransportView {
            episode_id: episode.map(|e| e.id.clone()),
            title: episode.map(|e| e.title.clone()),
            podcast_title: episode.and_then(|e| e.podcast_title.clone()),
            length_label: episode.and_then(|e| e.declared_duration()).map(format_minutes_label),
            artwork_url: episode.and_then(|e| e.artwork_url.clone()),
            elapsed: format_elapsed(elapsed),
            duration: format_elapsed(duration),
            progress_percent: progress,
            affordance: affordance(intent, snapshot),
            play_failed: snapshot.play_failed,
            load_failed: snapshot.load_failed,
            notes_open: self.notes_open,
        }
    }

    pub fn toggle(&self, intent: &PlaybackIntent, snapshot: &PlaybackSnapshot) -> ToggleAction {
        if !intent.is_playing {
            ToggleAction::Play
        } else if snapshot.play_failed {
            ToggleAction::Retry
        } else {
            ToggleAction::Pause
        }
    }

    /// Target (ms) for skipping `delta_seconds`, clamped to the episode.
    ///
    /// While a requested seek has not been applied yet, the skip is relative
    /// to that request, so consecutive skips accumulate.
    pub fn skip_target_ms(
        &self,
        intent: &PlaybackIntent,
        snapshot: &PlaybackSnapshot,
        delta_seconds: f64,
    ) -> f64 {
        let unapplied = intent
            .seek_request
            .filter(|seek| Some(seek.token) != snapshot.applied_seek);
        let base = match (unapplied, self.active_preview(snapshot)) {
            (Some(seek), _) => seek.target_seconds(),
            (None, Some(preview)) => preview.seconds,
            (None, None) => snapshot.current_time_seconds,
        };

        let delta = if delta_seconds.is_finite() { delta_seconds } else { 0.0 };
        let duration = display_duration(intent, snapshot);
        let target = (base + delta).max(0.0);
        let target = if duration > 0.0 { target.min(duration) } else { target };
        target * 1000.0
    }

    /// Map a 0–100 slider value to seconds and show it until the engine
    /// publishes a newer snapshot.
    pub fn scrub_to(&mut self, percent: f64, snapshot: &PlaybackSnapshot) -> f64 {
        let percent = if percent.is_finite() { percent.clamp(0.0, 100.0) } else { 0.0 };
        let seconds = percent / 100.0 * snapshot.duration_seconds;
        self.scrub_preview = Some(ScrubPreview {
            percent: progress_percent(seconds, snapshot.duration_seconds),
            seconds,
            revision: snapshot.revision,
        });
        seconds
    }

    pub fn notes_open(&self) -> bool {
        self.notes_open
    }

    pub fn set_notes_open(&mut self, open: bool) {
        self.notes_open = open;
    }

    /// Show notes text for the notes panel
    pub fn notes(&self, intent: &PlaybackIntent) -> String {
        intent
            .episode
            .as_ref()
            .and_then(|e| e.description.as_deref())
            .filter(|d| !d.trim().is_empty())
            .unwrap_or(NO_SHOW_NOTES)
            .to_string()
    }

    /// Forget decorations tied to the previous episode
    pub fn reset(&mut self) {
        self.notes_open = false;
        self.scrub_preview = None;
    }

    fn active_preview(&self, snapshot: &PlaybackSnapshot) -> Option<ScrubPreview> {
        self.scrub_preview
            .filter(|p| p.revision == snapshot.revision && snapshot.metadata_ready)
    }
}

/// Duration to display: the element's once known, else the declared one
fn display_duration(intent: &PlaybackIntent, snapshot: &PlaybackSnapshot) -> f64 {
    if snapshot.duration_seconds > 0.0 {
        snapshot.duration_seconds
    } else {
        intent
            .episode
            .as_ref()
            .and_then(|e| e.declared_duration())
            .unwrap_or(0.0)
    }
}

fn affordance(intent: &PlaybackIntent, snapshot: &PlaybackSnapshot) -> TransportAffordance {
    let playable = intent.episode.as_ref().is_some_and(|e| e.is_playable());
    if !playable || snapshot.load_failed {
        TransportAffordance::Unavailable
    } else if snapshot.is_buffering {
        TransportAffordance::Buffering
    } else if intent.is_playing && !snapshot.play_failed {
        TransportAffordance::Pause
    } else {
        TransportAffordance::Play
    }
}
