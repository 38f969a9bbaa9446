//! # Earshot Player Library
//!
//! Playback sync for the podcast search client.
//!
//! **Purpose:** Keep one audio element in step with what the listener asked
//! for. Requests land in the intent store; a single engine task reconciles the
//! element against them and publishes snapshots; the presenter turns
//! snapshots into transport controls.
//!
//! **Architecture:** intent store -> engine task -> snapshot -> presenter,
//! with an HTTP/SSE control surface on top.

pub mod api;
pub mod catalog;
pub mod config;
pub mod error;
pub mod media;
pub mod playback;
pub mod state;

pub use error::{Error, Result};
pub use state::SharedState;
