//! Configuration loading and saving utilities.
//!
//! `config.json` lives under the storage root. A missing or malformed file
//! yields defaults so a fresh install works without setup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, SleepError};
use crate::storage::StorageConfig;

/// Default chrono pattern for rendering night timestamps.
pub const DEFAULT_TIME_FORMAT: &str = "%a %b %d %Y %H:%M";

/// User preferences for the tracker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Overrides the database location from `StorageConfig`.
    pub database_path: Option<PathBuf>,
    /// chrono format string used by the plain formatter.
    pub time_format: Option<String>,
}

impl TrackerConfig {
    /// Loads the config from `path`, returning defaults if it is absent or unreadable.
    pub fn load(path: &Path) -> Self {
        let content = match fs_err::read_to_string(path) {
            Ok(content) => content,
            Err(_) => return Self::default(),
        };
        match serde_json::from_str(&content) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "Malformed config; using defaults");
                Self::default()
            }
        }
    }

    /// Saves the config to `path` as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self).map_err(|source| SleepError::Json {
            context: "serializing tracker config".to_string(),
            source,
        })?;
        if let Some(parent) = path.parent() {
            fs_err::create_dir_all(parent).map_err(|source| SleepError::ConfigWriteFailed {
                path: path.to_path_buf(),
                source,
            })?;
        }
        fs_err::write(path, content).map_err(|source| SleepError::ConfigWriteFailed {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Database location, honouring the override.
    pub fn database_path(&self, storage: &StorageConfig) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| storage.database_file())
    }

    pub fn time_format(&self) -> &str {
        self.time_format.as_deref().unwrap_or(DEFAULT_TIME_FORMAT)
    }
}
