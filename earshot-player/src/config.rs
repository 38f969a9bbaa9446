//! Player configuration
//!
//! Loaded once at startup from an optional TOML file. Every field has a
//! compiled default, so an absent file or a partial one is fine. Command-line
//! flags override individual fields after loading.

use crate::error::{Error, Result};
use crate::playback::engine::EngineConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Which media element implementation drives playback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaBackend {
    /// symphonia decode into a cpal output stream
    #[default]
    Native,
    /// Clock-driven stand-in with no audio device
    Simulated,
}

impl std::str::FromStr for MediaBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "native" => Ok(MediaBackend::Native),
            "simulated" => Ok(MediaBackend::Simulated),
            other => Err(Error::Config(format!("Unknown media backend '{}'", other))),
        }
    }
}

/// Bootstrap configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// HTTP server port
    pub port: u16,
    pub bind_host: String,
    /// Base URL of the search and directory services
    pub api_base_url: String,
    pub search_top_k: usize,
    /// Step used by the skip forward and skip back controls
    pub skip_seconds: f64,
    /// How long playback may stay buffering before it is abandoned; 0 disables
    pub buffering_timeout_secs: u64,
    pub event_capacity: usize,
    pub request_timeout_secs: u64,
    pub backend: MediaBackend,
    /// Output device name; the host default when unset
    pub output_device: Option<String>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            port: 5760,
            bind_host: "127.0.0.1".to_string(),
            api_base_url: "http://localhost:8000".to_string(),
            search_top_k: 20,
            skip_seconds: 10.0,
            buffering_timeout_secs: 30,
            event_capacity: 256,
            request_timeout_secs: 30,
            backend: MediaBackend::Native,
            output_device: None,
        }
    }
}

impl PlayerConfig {
    /// Load from a TOML file, or defaults when `path` is `None`
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config: PlayerConfig = earshot_common::config::load_toml(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.event_capacity == 0 {
            return Err(Error::Config("event_capacity must be at least 1".to_string()));
        }
        if !self.skip_seconds.is_finite() || self.skip_seconds <= 0.0 {
            return Err(Error::Config(format!(
                "skip_seconds must be positive, got {}",
                self.skip_seconds
            )));
        }
        if self.api_base_url.trim().is_empty() {
            return Err(Error::Config("api_base_url must not be empty".to_string()));
        }
        if self.search_top_k == 0 {
            return Err(Error::Config("search_top_k must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            buffering_timeout: match self.buffering_timeout_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }
}
