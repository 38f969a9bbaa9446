//! Playback synchronization
//!
//! Dependency order, leaves first:
//! - `intent`: desired state and token-guarded seek requests
//! - `snapshot`: the engine's view of actual playback
//! - `engine`: owns the media element and reconciles the two
//! - `presenter`: display values and gesture translation
//! - `player`: screen-level wiring of store, presenter and engine

pub mod engine;
pub mod intent;
pub mod player;
pub mod presenter;
pub mod snapshot;

pub use engine::{EngineConfig, EngineHandle, PlaybackEngine};
pub use intent::{IntentStore, PlaybackIntent, SeekRequest, SeekToken};
pub use player::{spawn_reconciler, PodcastPlayer};
pub use presenter::{ResultCard, ToggleAction, TransportAffordance, TransportPresenter, TransportView};
pub use snapshot::PlaybackSnapshot;
