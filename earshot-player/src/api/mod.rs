//! HTTP control surface for the player
//!
//! REST endpoints drive the screen-level player; `/events` streams engine
//! events over SSE.

pub mod handlers;
pub mod server;
pub mod sse;

pub use server::{create_router, run, AppContext};
