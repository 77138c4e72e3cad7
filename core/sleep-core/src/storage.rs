//! Storage configuration and path management for the sleep tracker.
//!
//! This module provides a centralized `StorageConfig` struct that manages all
//! file paths for tracker data, so hosts and tests can point the whole stack
//! at a different root without hunting through code.
//!
//! Production code uses `StorageConfig::try_default()`, which points to
//! `~/.sleep-tracker/`. Tests use `StorageConfig::with_root(temp_dir)`.

use std::path::{Path, PathBuf};

use crate::error::{Result, SleepError};

const ROOT_DIR_NAME: &str = ".sleep-tracker";

/// Central configuration for all sleep tracker storage paths.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Root directory for all tracker data (default: ~/.sleep-tracker)
    root: PathBuf,
}

impl StorageConfig {
    /// Resolves the default root under the user's home directory.
    pub fn try_default() -> Result<Self> {
        let home = dirs::home_dir().ok_or(SleepError::HomeDirNotFound)?;
        Ok(Self {
            root: home.join(ROOT_DIR_NAME),
        })
    }

    /// Creates a StorageConfig with a custom root directory.
    /// Used for testing with temp directories.
    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    /// Returns the root directory for tracker data.
    pub fn root(&self) -> &Path {
        &self.root
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Files
    // ─────────────────────────────────────────────────────────────────────────────

    /// Path to the SQLite database holding recorded nights.
    pub fn database_file(&self) -> PathBuf {
        self.root.join("sleep.db")
    }

    /// Path to config.json (tracker preferences).
    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.json")
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Directories
    // ─────────────────────────────────────────────────────────────────────────────

    /// Path to logs/ directory (rolling log files).
    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Ensures the root and logs directories exist.
    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [self.root.clone(), self.logs_dir()] {
            fs_err::create_dir_all(&dir).map_err(|source| SleepError::Io {
                context: format!("creating {}", dir.display()),
                source,
            })?;
        }
        Ok(())
    }
}
