//! # sleep-core
//!
//! Core library for the sleep tracker: a session coordinator that exposes
//! observable "tonight" and history state, and delegates persistence to a
//! night storage trait.
//!
//! ## Design Principles
//!
//! - **Single owner**: only the coordinator writes the tonight handle; hosts
//!   observe it through `watch` receivers.
//! - **Blocking storage off the runtime**: DAO calls run on tokio's blocking pool.
//! - **Graceful degradation**: storage faults are logged and leave state as it was;
//!   missing config files return defaults.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use sleep_core::{SessionCoordinator, SqliteSleepDao, StorageConfig};
//!
//! let storage = StorageConfig::try_default()?;
//! let dao = Arc::new(SqliteSleepDao::new(storage.database_file())?);
//! let coordinator = SessionCoordinator::new(dao);
//! coordinator.wait_initialized().await;
//! coordinator.start_tracking().await?;
//! ```

pub mod clock;
pub mod config;
pub mod coordinator;
pub mod db;
pub mod error;
pub mod format;
pub mod storage;
pub mod types;

pub use clock::{Clock, SystemClock};
pub use config::{TrackerConfig, DEFAULT_TIME_FORMAT};
pub use coordinator::SessionCoordinator;
pub use db::{InMemorySleepDao, SleepDatabaseDao, SqliteSleepDao};
pub use error::{Result, SleepError};
pub use format::{NightFormatter, PlainNightFormatter};
pub use storage::StorageConfig;
pub use types::*;
