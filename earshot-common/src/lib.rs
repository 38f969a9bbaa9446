//! # Earshot Common Library
//!
//! Shared code for the Earshot search-and-listen services:
//! - Episode and catalog record models
//! - Event types (PlayerEvent enum) and the broadcast EventBus
//! - Configuration file resolution
//! - Analytics session context
//! - Elapsed-time formatting

pub mod config;
pub mod error;
pub mod events;
pub mod human_time;
pub mod models;
pub mod session;

pub use error::{Error, Result};
pub use models::{Episode, EpisodeId};
