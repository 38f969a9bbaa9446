//! Shared player state
//!
//! Written by the engine task, read by the API and the screen-level player.

use earshot_common::events::{EventBus, PlayerEvent};
use earshot_common::session::SessionContext;
use tokio::sync::{broadcast, RwLock};

use crate::playback::snapshot::PlaybackSnapshot;

/// Default event channel capacity
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Shared state accessible by all components
pub struct SharedState {
    /// Last snapshot published by the engine
    pub snapshot: RwLock<PlaybackSnapshot>,

    /// Event broadcaster for SSE and the intent reconciler
    pub event_bus: EventBus,

    /// Analytics session captured at startup; read-only
    pub session: SessionContext,
}

impl SharedState {
    pub fn new(session: SessionContext, event_capacity: usize) -> Self {
        Self {
            snapshot: RwLock::new(PlaybackSnapshot::default()),
            event_bus: EventBus::new(event_capacity.max(1)),
            session,
        }
    }

    /// Subscribe to event stream
    pub fn subscribe_events(&self) -> broadcast::Receiver<PlayerEvent> {
        self.event_bus.subscribe()
    }

    pub async fn get_snapshot(&self) -> PlaybackSnapshot {
        self.snapshot.read().await.clone()
    }

    pub async fn set_snapshot(&self, snapshot: PlaybackSnapshot) {
        *self.snapshot.write().await = snapshot;
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new(SessionContext::capture(), DEFAULT_EVENT_CAPACITY)
    }
}
