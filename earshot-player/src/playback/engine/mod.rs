//! Playback engine
//!
//! **Module Structure:**
//! - `core.rs`: engine state, spawn, the event loop and snapshot publishing
//! - `reactions.rs`: intent diffing and media element reactions
//! - `handle.rs`: cloneable command handle used by the player and the API

mod core;
mod handle;
mod reactions;

pub use self::core::{EngineConfig, PlaybackEngine};
pub use self::handle::EngineHandle;
