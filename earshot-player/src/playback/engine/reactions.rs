//! Engine reactions
//!
//! Two families:
//! - intent reactions: diff the new intent against the previous one
//!   (episode, then seek token, then play flag) and drive the element
//! - element reactions: metadata loaded, can-play, time update, ended,
//!   load failure, plus settled `play()` calls and the buffering deadline
//!
//! Anything tagged with an old `LoadId` or a superseded play attempt is
//! dropped without touching the snapshot.

use std::sync::Arc;

use earshot_common::events::PlayerEvent;
use futures::FutureExt;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::core::{LoadedSource, PlaySettled, PlaybackEngine};
use crate::media::{MediaElement, MediaError, MediaNotification};
use crate::playback::intent::{PlaybackIntent, SeekRequest};
use crate::playback::snapshot::PlaybackSnapshot;

impl<M: MediaElement> PlaybackEngine<M> {
    // ========================================================================
    // Intent reactions
    // ========================================================================

    pub(super) fn apply_intent(&mut self, intent: PlaybackIntent) {
        let previous = std::mem::replace(&mut self.intent, intent);

        let new_id = self.intent.episode.as_ref().map(|e| e.id.clone());
        let old_id = previous.episode.as_ref().map(|e| e.id.clone());
        let token_changed = self.intent.seek_token() != previous.seek_token();
        // Selecting hands over a fresh episode value; play and seek changes keep it
        let reselected = match (&self.intent.episode, &previous.episode) {
            (Some(new), Some(old)) => !Arc::ptr_eq(new, old),
            _ => false,
        };
        // Re-selecting a failed episode is the only way to retry a load
        let reselected_after_failure = reselected && self.snapshot.load_failed;

        let switched = new_id != old_id || reselected_after_failure;
        if switched {
            self.switch_source();
        }

        if token_changed {
            if let Some(seek) = self.intent.seek_request {
                self.request_seek(seek);
            }
        }

        if switched {
            if self.intent.is_playing {
                self.request_play();
            }
        } else if self.intent.is_playing != previous.is_playing {
            if self.intent.is_playing {
                self.request_play();
            } else {
                self.request_pause();
            }
        }
    }

    /// Assign the intended episode to the element and reset the snapshot
    fn switch_source(&mut self) {
        self.pending_seek = None;
        self.play_in_flight = None;
        self.buffering_since = None;
        self.buffering_for_deferred_play = false;

        let Some(episode) = self.intent.episode.clone() else {
            info!("Player cleared");
            self.media.unload();
            self.loaded = None;
            self.snapshot = PlaybackSnapshot::default();
            self.set_buffering(false);
            self.emit(PlayerEvent::EpisodeChanged {
                episode_id: None,
                title: None,
                timestamp: chrono::Utc::now(),
            });
            return;
        };

        self.load_id = self.load_id.next();
        self.loaded = Some(LoadedSource {
            load_id: self.load_id,
            episode: Arc::clone(&episode),
        });
        self.snapshot = PlaybackSnapshot::for_episode(episode.id.clone());
        self.emit(PlayerEvent::EpisodeChanged {
            episode_id: Some(episode.id.clone()),
            title: Some(episode.title.clone()),
            timestamp: chrono::Utc::now(),
        });

        match episode.stream_url() {
            Some(url) => {
                info!("Loading episode {} ({}) as {}", episode.id, episode.title, self.load_id);
                self.media.load(self.load_id, url);
                self.set_buffering(true);
            }
            None => {
                self.media.unload();
                self.mark_load_failed("episode has no stream URL".to_string());
            }
        }
        self.refresh_element_state();
    }

    fn request_seek(&mut self, seek: SeekRequest) {
        if self.loaded.is_none() || self.snapshot.load_failed {
            debug!("Ignoring seek to {}ms: nothing playable loaded", seek.target_ms);
            return;
        }
        if self.snapshot.metadata_ready {
            self.apply_seek(seek);
        } else {
            debug!("Deferring seek to {}ms until metadata arrives", seek.target_ms);
            self.pending_seek = Some(seek);
        }
    }

    fn apply_seek(&mut self, seek: SeekRequest) {
        let mut target = seek.target_seconds();
        if self.snapshot.duration_seconds > 0.0 {
            target = target.min(self.snapshot.duration_seconds);
        }

        self.media.set_position(target);
        self.snapshot.applied_seek = Some(seek.token);
        self.snapshot.ended = false;
        let duration = self.snapshot.duration_seconds;
        self.snapshot.set_progress(target, duration);

        if let Some(source) = self.loaded.as_ref() {
            debug!("Seek {} applied at {:.3}s", seek.token.value(), target);
            self.emit(PlayerEvent::SeekApplied {
                episode_id: source.episode.id.clone(),
                position_ms: (target * 1000.0).round() as u64,
                token: seek.token.value(),
                timestamp: chrono::Utc::now(),
            });
        }
    }

    fn request_play(&mut self) {
        if self.loaded.is_none() || self.snapshot.load_failed {
            debug!("Play requested with nothing playable loaded");
            return;
        }
        if !self.snapshot.metadata_ready {
            // Issued from the metadata reaction, after any pending seek
            debug!("Deferring play until metadata arrives");
            if !self.snapshot.is_buffering {
                self.set_buffering(true);
                self.buffering_for_deferred_play = true;
            }
            return;
        }
        self.issue_play();
    }

    fn issue_play(&mut self) {
        if self.snapshot.ended {
            // The element starts over when played after its end
            debug!("Replaying from the start after end-of-stream");
            self.snapshot.ended = false;
            let duration = self.snapshot.duration_seconds;
            self.snapshot.set_progress(0.0, duration);
        }

        let ready = self.media.ready_state().can_play_through();
        self.set_buffering(!ready);
        self.snapshot.play_failed = false;

        self.play_attempt += 1;
        let attempt = self.play_attempt;
        let load_id = self.load_id;
        self.play_in_flight = Some(attempt);

        debug!("Issuing play (attempt {}, {}, ready={})", attempt, load_id, ready);
        let play = self.media.play();
        self.pending_plays.push(
            async move {
                PlaySettled {
                    load_id,
                    attempt,
                    result: play.await,
                }
            }
            .boxed(),
        );
        self.refresh_element_state();
    }

    fn request_pause(&mut self) {
        // Pausing aborts an in-flight play; its settlement is no longer wanted
        self.play_in_flight = None;
        self.media.pause();
        if self.buffering_for_deferred_play {
            self.set_buffering(false);
        }
        self.refresh_element_state();
    }

    pub(super) fn scrub(&mut self, seconds: f64) {
        if !self.snapshot.metadata_ready || self.snapshot.load_failed {
            debug!("Ignoring scrub before metadata");
            return;
        }
        let duration = self.snapshot.duration_seconds;
        let target = if seconds.is_finite() { seconds.clamp(0.0, duration.max(0.0)) } else { 0.0 };

        self.media.set_position(target);
        self.snapshot.ended = false;
        self.snapshot.set_progress(target, duration);
    }

    pub(super) fn retry_play(&mut self) {
        if self.loaded.is_none() {
            return;
        }
        self.intent.is_playing = true;

        if self.snapshot.load_failed || !self.snapshot.metadata_ready {
            info!("Retry: reloading source");
            let resume = self.intent.seek_request.map(|s| SeekRequest {
                target_ms: self.snapshot.current_time_seconds.max(s.target_seconds()) * 1000.0,
                token: s.token,
            });
            self.switch_source();
            if let Some(seek) = resume {
                self.request_seek(seek);
            }
            self.request_play();
        } else {
            info!("Retry: issuing play");
            self.issue_play();
        }
    }

    // ========================================================================
    // Element reactions
    // ========================================================================

    pub(super) fn on_notification(&mut self, notification: MediaNotification) {
        if self.loaded.is_none() || notification.load_id() != self.load_id {
            debug!(
                "Discarding stale {} from {} (current {})",
                notification.kind(),
                notification.load_id(),
                self.load_id
            );
            return;
        }

        match notification {
            MediaNotification::MetadataLoaded { .. } => self.on_metadata_loaded(),
            MediaNotification::CanPlay { .. } => self.on_can_play(),
            MediaNotification::TimeUpdate { .. } => self.on_time_update(),
            MediaNotification::Ended { .. } => self.on_ended(),
            MediaNotification::Failed { error, .. } => self.mark_load_failed(error.to_string()),
        }
    }

    fn on_metadata_loaded(&mut self) {
        let Some(source) = self.loaded.clone() else {
            return;
        };

        let (duration, fallback) = match self.media.duration() {
            Some(d) if d.is_finite() && d > 0.0 => (d, false),
            _ => (source.episode.declared_duration().unwrap_or(0.0), true),
        };
        let first = !self.snapshot.metadata_ready;
        self.snapshot.metadata_ready = true;
        self.snapshot.set_progress(self.media.position(), duration);

        if first {
            info!(
                "Metadata for {}: {:.1}s{}",
                source.episode.id,
                duration,
                if fallback { " (declared)" } else { "" }
            );
            self.emit(PlayerEvent::MetadataLoaded {
                episode_id: source.episode.id.clone(),
                duration_seconds: duration,
                fallback_duration: fallback,
                timestamp: chrono::Utc::now(),
            });
        }

        if let Some(seek) = self.pending_seek.take() {
            self.apply_seek(seek);
        }

        if first
            && self.intent.is_playing
            && self.play_in_flight.is_none()
            && !self.snapshot.play_failed
        {
            self.issue_play();
        }
        self.refresh_element_state();
    }

    fn on_can_play(&mut self) {
        self.set_buffering(false);
        self.refresh_element_state();
    }

    fn on_time_update(&mut self) {
        let Some(source) = self.loaded.clone() else {
            return;
        };

        let duration = match self.media.duration() {
            Some(d) if d.is_finite() && d > 0.0 => d,
            _ => self.snapshot.duration_seconds,
        };
        self.snapshot.set_progress(self.media.position(), duration);
        self.refresh_element_state();

        self.emit(PlayerEvent::PlaybackProgress {
            episode_id: source.episode.id.clone(),
            position_ms: (self.snapshot.current_time_seconds * 1000.0) as u64,
            duration_ms: (self.snapshot.duration_seconds * 1000.0) as u64,
            percent: self.snapshot.progress_percent,
            timestamp: chrono::Utc::now(),
        });

        let actual_playing = self.snapshot.is_playing();
        let settled = self.play_in_flight.is_none()
            && self.snapshot.metadata_ready
            && !self.snapshot.play_failed
            && !self.snapshot.load_failed
            && !self.snapshot.ended;
        if settled && actual_playing != self.intent.is_playing {
            info!(
                "Element is {} but intent is {}; adopting actual state",
                if actual_playing { "playing" } else { "paused" },
                if self.intent.is_playing { "playing" } else { "paused" },
            );
            self.intent.is_playing = actual_playing;
            self.emit(PlayerEvent::ActualStateReported {
                episode_id: source.episode.id.clone(),
                playing: actual_playing,
                timestamp: chrono::Utc::now(),
            });
        }
    }

    fn on_ended(&mut self) {
        let Some(source) = self.loaded.clone() else {
            return;
        };
        if self.snapshot.ended {
            debug!("Duplicate end-of-stream for {} ignored", source.episode.id);
            return;
        }

        self.snapshot.ended = true;
        let duration = self.snapshot.duration_seconds;
        let position = if duration > 0.0 { duration } else { self.media.position() };
        self.snapshot.set_progress(position, duration);
        self.intent.is_playing = false;
        self.play_in_flight = None;
        self.set_buffering(false);
        self.refresh_element_state();

        info!("Episode {} ended", source.episode.id);
        let event = PlayerEvent::PlaybackEnded {
            episode_id: source.episode.id.clone(),
            timestamp: chrono::Utc::now(),
        };
        if self.state.event_bus.emit(event).is_err() {
            debug!("No subscribers for PlaybackEnded");
        }
    }

    fn mark_load_failed(&mut self, reason: String) {
        let Some(source) = self.loaded.clone() else {
            return;
        };
        warn!("Load failed for episode {}: {}", source.episode.id, reason);

        self.snapshot.load_failed = true;
        self.pending_seek = None;
        self.play_in_flight = None;
        self.set_buffering(false);
        self.refresh_element_state();
        self.emit(PlayerEvent::LoadFailed {
            episode_id: source.episode.id.clone(),
            reason,
            timestamp: chrono::Utc::now(),
        });
    }

    pub(super) fn on_play_settled(&mut self, settled: PlaySettled) {
        if settled.load_id != self.load_id || self.play_in_flight != Some(settled.attempt) {
            debug!(
                "Discarding stale play result (attempt {}, {})",
                settled.attempt, settled.load_id
            );
            return;
        }
        self.play_in_flight = None;

        match settled.result {
            Ok(()) if !self.intent.is_playing => {
                debug!("Play resolved after pause was requested; pausing");
                self.media.pause();
            }
            Ok(()) => {
                self.snapshot.play_failed = false;
                if self.media.ready_state().can_play_through() {
                    self.set_buffering(false);
                }
            }
            Err(MediaError::Aborted) => {
                debug!("Play attempt {} aborted by the element", settled.attempt);
                self.set_buffering(false);
            }
            Err(error) => {
                warn!("Play rejected: {}", error);
                self.set_buffering(false);
                self.snapshot.play_failed = true;
                if let Some(source) = self.loaded.as_ref() {
                    self.emit(PlayerEvent::PlayFailed {
                        episode_id: source.episode.id.clone(),
                        reason: error.to_string(),
                        timestamp: chrono::Utc::now(),
                    });
                }
            }
        }
        self.refresh_element_state();
    }

    pub(super) fn on_buffering_timeout(&mut self) {
        let waited = self
            .buffering_since
            .map(|since| since.elapsed())
            .unwrap_or_default();
        self.set_buffering(false);

        let Some(source) = self.loaded.clone() else {
            return;
        };
        warn!("Buffering for {} gave up after {:?}", source.episode.id, waited);

        if self.intent.is_playing {
            self.play_in_flight = None;
            self.media.pause();
            self.snapshot.play_failed = true;
            self.refresh_element_state();
        }
        self.emit(PlayerEvent::BufferingTimedOut {
            episode_id: source.episode.id.clone(),
            waited_ms: waited.as_millis() as u64,
            timestamp: chrono::Utc::now(),
        });
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn set_buffering(&mut self, buffering: bool) {
        if self.snapshot.is_buffering == buffering {
            return;
        }
        self.snapshot.is_buffering = buffering;
        self.buffering_since = buffering.then(Instant::now);
        self.buffering_for_deferred_play = false;
        self.emit(PlayerEvent::BufferingChanged {
            episode_id: self.snapshot.episode_id.clone(),
            buffering,
            timestamp: chrono::Utc::now(),
        });
    }

    fn refresh_element_state(&mut self) {
        self.snapshot.is_paused_at_element_level = self.media.is_paused();
    }
}
