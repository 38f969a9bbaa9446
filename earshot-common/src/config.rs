//! Configuration file resolution and loading
//!
//! Resolution follows the usual priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. Platform config file (`~/.config/earshot/config.toml`, then `/etc/earshot/config.toml`)
//! 4. Compiled defaults (no file)

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Directory name used under platform config locations
pub const APP_DIR: &str = "earshot";

/// Config file name
pub const CONFIG_FILE: &str = "config.toml";

/// Resolve which config file to read, if any.
///
/// An explicit path (CLI or environment) is returned even if it does not
/// exist, so that a typo surfaces as an error instead of silently falling
/// back to defaults.
pub fn resolve_config_path(cli_arg: Option<&Path>, env_var_name: &str) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: platform locations
    default_config_locations().into_iter().find(|p| p.exists())
}

/// Candidate config file locations in lookup order
pub fn default_config_locations() -> Vec<PathBuf> {
    let mut locations = Vec::new();
    if let Some(dir) = dirs::config_dir() {
        locations.push(dir.join(APP_DIR).join(CONFIG_FILE));
    }
    if cfg!(unix) {
        locations.push(PathBuf::from("/etc").join(APP_DIR).join(CONFIG_FILE));
    }
    locations
}

/// Load a TOML config file into `T`, or `T::default()` when no path is given.
///
/// Missing keys take their serde defaults.
pub fn load_toml<T>(path: Option<&Path>) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let Some(path) = path else {
        debug!("No config file found, using compiled defaults");
        return Ok(T::default());
    };

    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;

    debug!("Loading config from {}", path.display());
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Invalid config file {}: {}", path.display(), e)))
}
