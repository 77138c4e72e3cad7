//! Error types for sleep-core operations.

use std::path::PathBuf;

/// All errors that can occur in sleep-core operations.
///
/// The coordinator never surfaces these to its observers; they are logged at
/// the task boundary. DAO implementations and the config layer return them.
#[derive(Debug, thiserror::Error)]
pub enum SleepError {
    // ─────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Configuration write failed: {path}: {source}")]
    ConfigWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ─────────────────────────────────────────────────────────────────────
    // Storage Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Database error: {context}: {source}")]
    Database {
        context: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Night not found: {0}")]
    NightNotFound(i64),

    #[error("Storage lock poisoned")]
    LockPoisoned,

    // ─────────────────────────────────────────────────────────────────────
    // I/O Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    // ─────────────────────────────────────────────────────────────────────
    // Dispatch Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Blocking storage task failed: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

impl SleepError {
    pub(crate) fn database(context: &str, source: rusqlite::Error) -> Self {
        SleepError::Database {
            context: context.to_string(),
            source,
        }
    }
}

/// Convenience type alias for Results using SleepError.
pub type Result<T> = std::result::Result<T, SleepError>;
