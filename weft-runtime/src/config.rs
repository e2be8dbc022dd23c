//! Runtime configuration.
//!
//! Every field has a default, so an empty file (or no file) is a valid
//! configuration.

use crate::error::{RuntimeError, RuntimeResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

/// Tunables for one runtime instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Display time for notifications that do not specify a duration.
    pub default_notification_duration_ms: u64,
    /// Upper bound on visible notifications; the oldest is dropped first.
    /// Zero disables the bound.
    pub max_notifications: usize,
    /// How deep record-lifecycle flows may cascade into each other.
    pub max_trigger_depth: u32,
    /// Viewport width used for layout breakpoint selection.
    pub viewport_width: u32,
    /// Overrides the schema's default role at startup.
    pub default_role: Option<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            default_notification_duration_ms: 5_000,
            max_notifications: 0,
            max_trigger_depth: 3,
            viewport_width: 1280,
            default_role: None,
        }
    }
}

impl RuntimeConfig {
    /// Parses a TOML document.
    pub fn from_toml_str(contents: &str) -> RuntimeResult<Self> {
        toml::from_str(contents).map_err(|e| RuntimeError::Config(e.to_string()))
    }

    /// Loads configuration from `path`, falling back to defaults when the
    /// file is missing or unusable.
    pub fn load_from(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            info!("No runtime config at {:?}, using defaults", path);
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(contents) => match Self::from_toml_str(&contents) {
                Ok(config) => {
                    info!("Loaded runtime config from {:?}", path);
                    config
                }
                Err(e) => {
                    warn!("Failed to parse runtime config {:?}: {}. Using defaults.", path, e);
                    Self::default()
                }
            },
            Err(e) => {
                warn!("Failed to read runtime config {:?}: {}", path, e);
                Self::default()
            }
        }
    }
}
