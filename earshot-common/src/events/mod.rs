//! Event types for the Earshot event system
//!
//! Provides the shared `PlayerEvent` definitions and the broadcast `EventBus`.
//! The playback engine is the only producer; the screen-level player and the
//! SSE endpoint are consumers.

mod playback_types;

pub use playback_types::PlaybackState;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::models::EpisodeId;

/// Player event types
///
/// Events are broadcast via EventBus and serialized for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum PlayerEvent {
    /// A new source was assigned (or the player was cleared)
    EpisodeChanged {
        episode_id: Option<EpisodeId>,
        title: Option<String>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Duration became known for the current source
    MetadataLoaded {
        episode_id: EpisodeId,
        duration_seconds: f64,
        /// True when the media reported no duration and the declared one was used
        fallback_duration: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Element-level playing/paused state changed
    PlaybackStateChanged {
        episode_id: Option<EpisodeId>,
        old_state: PlaybackState,
        new_state: PlaybackState,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Periodic position update
    PlaybackProgress {
        episode_id: EpisodeId,
        position_ms: u64,
        duration_ms: u64,
        percent: f64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Buffering indicator raised or cleared
    BufferingChanged {
        episode_id: Option<EpisodeId>,
        buffering: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A token-guarded seek was applied to the element
    SeekApplied {
        episode_id: EpisodeId,
        position_ms: u64,
        token: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The element rejected a play request; recoverable by retry
    PlayFailed {
        episode_id: EpisodeId,
        reason: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The source could not be loaded; persistent until re-selected
    LoadFailed {
        episode_id: EpisodeId,
        reason: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Buffering did not reach can-play within the configured limit
    BufferingTimedOut {
        episode_id: EpisodeId,
        waited_ms: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// End of stream; emitted once per loaded source
    PlaybackEnded {
        episode_id: EpisodeId,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The element's actual state disagrees with the play intent
    /// (e.g. playback paused by the platform); consumers should adopt it
    ActualStateReported {
        episode_id: EpisodeId,
        playing: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl PlayerEvent {
    /// Event type name, matching the serde tag
    pub fn event_type(&self) -> &'static str {
        match self {
            PlayerEvent::EpisodeChanged { .. } => "EpisodeChanged",
            PlayerEvent::MetadataLoaded { .. } => "MetadataLoaded",
            PlayerEvent::PlaybackStateChanged { .. } => "PlaybackStateChanged",
            PlayerEvent::PlaybackProgress { .. } => "PlaybackProgress",
            PlayerEvent::BufferingChanged { .. } => "BufferingChanged",
            PlayerEvent::SeekApplied { .. } => "SeekApplied",
            PlayerEvent::PlayFailed { .. } => "PlayFailed",
            PlayerEvent::LoadFailed { .. } => "LoadFailed",
            PlayerEvent::BufferingTimedOut { .. } => "BufferingTimedOut",
            PlayerEvent::PlaybackEnded { .. } => "PlaybackEnded",
            PlayerEvent::ActualStateReported { .. } => "ActualStateReported",
        }
    }

    /// Episode the event refers to, if any
    pub fn episode_id(&self) -> Option<&EpisodeId> {
        match self {
            PlayerEvent::EpisodeChanged { episode_id, .. }
            | PlayerEvent::PlaybackStateChanged { episode_id, .. }
            | PlayerEvent::BufferingChanged { episode_id, .. } => episode_id.as_ref(),
            PlayerEvent::MetadataLoaded { episode_id, .. }
            | PlayerEvent::PlaybackProgress { episode_id, .. }
            | PlayerEvent::SeekApplied { episode_id, .. }
            | PlayerEvent::PlayFailed { episode_id, .. }
            | PlayerEvent::LoadFailed { episode_id, .. }
            | PlayerEvent::BufferingTimedOut { episode_id, .. }
            | PlayerEvent::PlaybackEnded { episode_id, .. }
            | PlayerEvent::ActualStateReported { episode_id, .. } => Some(episode_id),
        }
    }
}

/// Central event distribution bus
///
/// Thin wrapper over `tokio::sync::broadcast`. Slow subscribers lag and lose
/// the oldest events rather than blocking the engine.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PlayerEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Examples
    ///
    /// ```
    /// use earshot_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(256);
    /// assert_eq!(event_bus.capacity(), 256);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists,
    /// `Err` if nobody is listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: PlayerEvent,
    ) -> Result<usize, broadcast::error::SendError<PlayerEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: PlayerEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ended(id: &str) -> PlayerEvent {
        PlayerEvent::PlaybackEnded {
            episode_id: EpisodeId::new(id),
            timestamp: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let json = serde_json::to_value(ended("ep-1")).unwrap();
        assert_eq!(json["type"], "PlaybackEnded");
        assert_eq!(json["episode_id"], "ep-1");
    }

    #[test]
    fn test_event_type_matches_tag() {
        let event = PlayerEvent::ActualStateReported {
            episode_id: EpisodeId::new("a"),
            playing: false,
            timestamp: chrono::Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], event.event_type());
    }

    #[test]
    fn test_episode_id_accessor() {
        let cleared = PlayerEvent::EpisodeChanged {
            episode_id: None,
            title: None,
            timestamp: chrono::Utc::now(),
        };
        assert!(cleared.episode_id().is_none());
        assert_eq!(ended("x").episode_id(), Some(&EpisodeId::new("x")));
    }

    #[tokio::test]
    async fn test_event_bus_delivery() {
        let bus = EventBus::new(16);
        assert!(bus.emit(ended("none")).is_err());

        let mut rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(bus.emit(ended("a")).unwrap(), 1);

        let received = rx.recv().await.unwrap();
        assert_eq!(received.event_type(), "PlaybackEnded");
    }

    #[test]
    fn test_emit_lossy_without_subscribers() {
        let bus = EventBus::new(4);
        bus.emit_lossy(ended("a"));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_playback_state_display() {
        assert_eq!(PlaybackState::from_playing(true).to_string(), "playing");
        assert_eq!(PlaybackState::Paused.to_string(), "paused");
        assert!(!PlaybackState::Paused.is_playing());
    }
}
