//! Search and directory service access
//!
//! Thin client over the remote question search endpoint and the per-feed
//! episode listing. Results are converted to `Episode` values by the player.

mod client;

pub use client::{parse_directory_response, parse_search_response, CatalogClient, DEFAULT_TOP_K};
