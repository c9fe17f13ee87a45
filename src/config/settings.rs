//! Library policy loading from library.toml
//!
//! This module loads the tunable business policy (catalog duplicate handling, fine
//! multiplier, payment-gateway timeout and callback URLs) from a TOML file. Every key is
//! optional; a missing file yields the defaults.

use crate::errors::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

const DEFAULT_CONFIG_PATH: &str = "library.toml";

/// What a catalog write does when another row already holds the same
/// (title, author, cover) triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Fold the incoming inventory into the existing row
    #[default]
    Merge,
    /// Refuse the write with a validation error
    Reject,
}

/// Business policy for the lending core
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LibrarySettings {
    /// Catalog duplicate handling
    pub duplicate_policy: DuplicatePolicy,
    /// Factor applied to the daily fees of an overdue return
    pub fine_multiplier: u32,
    /// Upper bound for one checkout-session request
    pub gateway_timeout_secs: u64,
    /// Public origin the gateway redirects back to
    pub public_base_url: String,
    /// ISO currency code sent to the gateway
    pub currency: String,
}

impl Default for LibrarySettings {
    fn default() -> Self {
        Self {
            duplicate_policy: DuplicatePolicy::Merge,
            fine_multiplier: 2,
            gateway_timeout_secs: 10,
            public_base_url: "http://127.0.0.1:8000".to_string(),
            currency: "usd".to_string(),
        }
    }
}

impl LibrarySettings {
    /// Gateway timeout as a [`Duration`].
    #[must_use]
    pub const fn gateway_timeout(&self) -> Duration {
        Duration::from_secs(self.gateway_timeout_secs)
    }

    fn validate(self) -> Result<Self> {
        if self.fine_multiplier == 0 {
            return Err(Error::Config {
                message: "fine_multiplier must be at least 1".to_string(),
            });
        }
        if self.gateway_timeout_secs == 0 {
            return Err(Error::Config {
                message: "gateway_timeout_secs must be at least 1".to_string(),
            });
        }
        Ok(self)
    }
}

/// Parses settings from TOML text.
pub fn parse_settings(contents: &str) -> Result<LibrarySettings> {
    toml::from_str::<LibrarySettings>(contents)
        .map_err(|e| Error::Config {
            message: format!("Failed to parse library settings: {e}"),
        })?
        .validate()
}

/// Loads settings from a TOML file
///
/// # Errors
/// Returns an error if the file cannot be read, the TOML syntax is invalid or a value
/// is out of range.
pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<LibrarySettings> {
    let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| Error::Config {
        message: format!("Failed to read {}: {e}", path.as_ref().display()),
    })?;
    parse_settings(&contents)
}

/// Loads settings from `LIBRARY_CONFIG` or ./library.toml, falling back to defaults
/// when the file does not exist.
pub fn load_default_settings() -> Result<LibrarySettings> {
    let path = std::env::var("LIBRARY_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    if !Path::new(&path).exists() {
        warn!("No settings file at {}, using defaults", path);
        return Ok(LibrarySettings::default());
    }
    let settings = load_settings(&path)?;
    info!("Loaded library settings from {}", path);
    Ok(settings)
}
