//! Media element abstraction
//!
//! The playback engine drives exactly one `MediaElement`. An element exposes
//! load/play/pause, a mutable position, a duration, and a notification channel
//! carrying the four lifecycle signals the engine reacts to (metadata loaded,
//! can-play, time update, ended) plus load failures.
//!
//! Backends:
//! - [`simulated`]: deterministic, scriptable element for tests and headless runs
//! - [`native`]: HTTP download + symphonia decode + cpal output

pub mod native;
pub mod simulated;

use futures::future::BoxFuture;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;

pub use native::NativeMedia;
pub use simulated::{MediaOp, PlayOutcome, SimulatedController, SimulatedMedia};

/// Identifies one `load` call.
///
/// Assigned by the engine; every notification carries the id of the load it
/// belongs to so callbacks for a replaced source can be recognised and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct LoadId(pub u64);

impl LoadId {
    pub fn next(self) -> Self {
        LoadId(self.0 + 1)
    }
}

impl std::fmt::Display for LoadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "load#{}", self.0)
    }
}

/// How much of the source is available, ordered from nothing to everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadyState {
    HaveNothing,
    HaveMetadata,
    HaveCurrentData,
    HaveFutureData,
    HaveEnoughData,
}

impl ReadyState {
    /// Enough data is buffered to start playing without an immediate stall
    pub fn can_play_through(self) -> bool {
        self >= ReadyState::HaveFutureData
    }

    pub fn has_metadata(self) -> bool {
        self >= ReadyState::HaveMetadata
    }
}

/// Lifecycle signals emitted by a media element
#[derive(Debug, Clone, PartialEq)]
pub enum MediaNotification {
    MetadataLoaded { load_id: LoadId },
    CanPlay { load_id: LoadId },
    TimeUpdate { load_id: LoadId },
    Ended { load_id: LoadId },
    Failed { load_id: LoadId, error: MediaError },
}

impl MediaNotification {
    pub fn load_id(&self) -> LoadId {
        match self {
            MediaNotification::MetadataLoaded { load_id }
            | MediaNotification::CanPlay { load_id }
            | MediaNotification::TimeUpdate { load_id }
            | MediaNotification::Ended { load_id }
            | MediaNotification::Failed { load_id, .. } => *load_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            MediaNotification::MetadataLoaded { .. } => "metadata-loaded",
            MediaNotification::CanPlay { .. } => "can-play",
            MediaNotification::TimeUpdate { .. } => "time-update",
            MediaNotification::Ended { .. } => "ended",
            MediaNotification::Failed { .. } => "failed",
        }
    }
}

/// Media backend errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MediaError {
    /// Play was refused (autoplay policy, no output device, stalled network)
    #[error("Play rejected: {0}")]
    PlayRejected(String),

    /// A pending play was interrupted by pause or a new load
    #[error("Play aborted by a later pause or load")]
    Aborted,

    /// Operation needs a source but none is loaded
    #[error("No source loaded")]
    NoSource,

    /// Source could not be fetched or probed
    #[error("Load failed: {0}")]
    Load(String),

    /// Source could not be decoded
    #[error("Decode failed: {0}")]
    Decode(String),

    /// Audio output device errors
    #[error("Audio output error: {0}")]
    Output(String),
}

/// Settles when the element starts playing or refuses to
pub type PlayFuture = BoxFuture<'static, Result<(), MediaError>>;

/// A single streaming audio element.
///
/// Methods are synchronous and never block on I/O. `load` and `play` start
/// asynchronous work whose outcome arrives later: through notifications for
/// `load`, through the returned future for `play`.
pub trait MediaElement: Send + 'static {
    /// Hand over the notification receiver. Returns `None` after the first call.
    fn take_notifications(&mut self) -> Option<mpsc::UnboundedReceiver<MediaNotification>>;

    /// Replace the source and start loading it. Aborts any pending play.
    fn load(&mut self, load_id: LoadId, url: &str);

    /// Drop the current source
    fn unload(&mut self);

    /// Request playback
    fn play(&mut self) -> PlayFuture;

    /// Pause playback; synchronous and infallible. Aborts any pending play.
    fn pause(&mut self);

    /// Current position in seconds
    fn position(&self) -> f64;

    /// Move the playhead (seconds)
    fn set_position(&mut self, seconds: f64);

    /// Duration in seconds, `None` while unknown
    fn duration(&self) -> Option<f64>;

    fn is_paused(&self) -> bool;

    fn ready_state(&self) -> ReadyState;
}

impl<M: MediaElement + ?Sized> MediaElement for Box<M> {
    fn take_notifications(&mut self) -> Option<mpsc::UnboundedReceiver<MediaNotification>> {
        (**self).take_notifications()
    }

    fn load(&mut self, load_id: LoadId, url: &str) {
        (**self).load(load_id, url)
    }

    fn unload(&mut self) {
        (**self).unload()
    }

    fn play(&mut self) -> PlayFuture {
        (**self).play()
    }

    fn pause(&mut self) {
        (**self).pause()
    }

    fn position(&self) -> f64 {
        (**self).position()
    }

    fn set_position(&mut self, seconds: f64) {
        (**self).set_position(seconds)
    }

    fn duration(&self) -> Option<f64> {
        (**self).duration()
    }

    fn is_paused(&self) -> bool {
        (**self).is_paused()
    }

    fn ready_state(&self) -> ReadyState {
        (**self).ready_state()
    }
}
