//! Error types for earshot-player
//!
//! Defines module-specific error types using thiserror for clear error propagation.

use thiserror::Error;

/// Main error type for earshot-player
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file loading or validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP server errors
    #[error("HTTP server error: {0}")]
    Http(String),

    /// Media backend errors
    #[error("Media error: {0}")]
    Media(#[from] crate::media::MediaError),

    /// Playback engine errors
    #[error("Playback error: {0}")]
    Playback(String),

    /// Engine task has stopped and no longer accepts commands
    #[error("Playback engine stopped")]
    EngineStopped,

    /// Search or directory service request failed
    #[error("Catalog request failed: {0}")]
    Catalog(#[from] reqwest::Error),

    /// Search or directory service returned something unusable
    #[error("Catalog response error: {0}")]
    CatalogResponse(String),

    /// Invalid state for operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Invalid request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Errors bubbled up from the shared library
    #[error(transparent)]
    Common(#[from] earshot_common::Error),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience Result type using earshot-player Error
pub type Result<T> = std::result::Result<T, Error>;
