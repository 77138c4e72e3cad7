//! Night storage: the data-access trait the coordinator talks to, plus a
//! SQLite-backed and an in-memory implementation.
//!
//! Calls are synchronous and may block; the coordinator runs them on the
//! blocking thread pool.

use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{Result, SleepError};
use crate::types::SleepNight;

/// CRUD over recorded nights.
pub trait SleepDatabaseDao: Send + Sync {
    /// All nights, most recent first.
    fn get_all_nights(&self) -> Result<Vec<SleepNight>>;

    /// The most recently recorded night, open or not.
    fn get_tonight(&self) -> Result<Option<SleepNight>>;

    /// Looks up a night by id.
    fn get(&self, night_id: i64) -> Result<Option<SleepNight>>;

    /// Persists a new night and returns the id storage assigned to it.
    fn insert(&self, night: &SleepNight) -> Result<i64>;

    /// Replaces the stored night with the same id.
    fn update(&self, night: &SleepNight) -> Result<()>;

    /// Deletes every night.
    fn clear(&self) -> Result<()>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// SQLite
// ═══════════════════════════════════════════════════════════════════════════════

const NIGHT_COLUMNS: &str = "night_id, start_time_milli, end_time_milli, quality_rating";

pub struct SqliteSleepDao {
    path: PathBuf,
}

impl SqliteSleepDao {
    pub fn new(path: PathBuf) -> Result<Self> {
        let dao = Self { path };
        dao.init_schema()?;
        Ok(dao)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn init_schema(&self) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute_batch(
                "BEGIN;
                 CREATE TABLE IF NOT EXISTS daily_sleep_quality_table (
                    night_id INTEGER PRIMARY KEY AUTOINCREMENT,
                    start_time_milli INTEGER NOT NULL,
                    end_time_milli INTEGER NOT NULL,
                    quality_rating INTEGER NOT NULL DEFAULT -1
                 );
                 COMMIT;",
            )
            .map_err(|err| SleepError::database("initializing schema", err))
        })
    }

    fn with_connection<T>(&self, op: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut conn = self.open()?;
        op(&mut conn)
    }

    fn open(&self) -> Result<Connection> {
        if let Some(parent) = self.path.parent() {
            fs_err::create_dir_all(parent).map_err(|source| SleepError::Io {
                context: "creating database directory".to_string(),
                source,
            })?;
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX;

        let conn = Connection::open_with_flags(&self.path, flags)
            .map_err(|err| SleepError::database("opening sqlite db", err))?;

        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|err| SleepError::database("enabling WAL", err))?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(|err| SleepError::database("setting synchronous", err))?;
        conn.pragma_update(None, "busy_timeout", 5000)
            .map_err(|err| SleepError::database("setting busy_timeout", err))?;

        Ok(conn)
    }
}

fn night_from_row(row: &Row<'_>) -> rusqlite::Result<SleepNight> {
    Ok(SleepNight {
        night_id: row.get(0)?,
        start_time_milli: row.get(1)?,
        end_time_milli: row.get(2)?,
        sleep_quality: row.get(3)?,
    })
}

impl SleepDatabaseDao for SqliteSleepDao {
    fn get_all_nights(&self) -> Result<Vec<SleepNight>> {
        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {NIGHT_COLUMNS} FROM daily_sleep_quality_table ORDER BY night_id DESC"
                ))
                .map_err(|err| SleepError::database("preparing nights query", err))?;

            let rows = stmt
                .query_map([], night_from_row)
                .map_err(|err| SleepError::database("reading night rows", err))?;

            let mut nights = Vec::new();
            for row in rows {
                nights.push(row.map_err(|err| SleepError::database("decoding night row", err))?);
            }
            Ok(nights)
        })
    }

    fn get_tonight(&self) -> Result<Option<SleepNight>> {
        self.with_connection(|conn| {
            conn.query_row(
                &format!(
                    "SELECT {NIGHT_COLUMNS} FROM daily_sleep_quality_table \
                     ORDER BY night_id DESC LIMIT 1"
                ),
                [],
                night_from_row,
            )
            .optional()
            .map_err(|err| SleepError::database("querying latest night", err))
        })
    }

    fn get(&self, night_id: i64) -> Result<Option<SleepNight>> {
        self.with_connection(|conn| {
            conn.query_row(
                &format!(
                    "SELECT {NIGHT_COLUMNS} FROM daily_sleep_quality_table WHERE night_id = ?1"
                ),
                params![night_id],
                night_from_row,
            )
            .optional()
            .map_err(|err| SleepError::database("querying night", err))
        })
    }

    fn insert(&self, night: &SleepNight) -> Result<i64> {
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO daily_sleep_quality_table \
                    (start_time_milli, end_time_milli, quality_rating) \
                 VALUES (?1, ?2, ?3)",
                params![
                    night.start_time_milli,
                    night.end_time_milli,
                    night.sleep_quality
                ],
            )
            .map_err(|err| SleepError::database("inserting night", err))?;
            Ok(conn.last_insert_rowid())
        })
    }

    fn update(&self, night: &SleepNight) -> Result<()> {
        let changed = self.with_connection(|conn| {
            conn.execute(
                "UPDATE daily_sleep_quality_table SET \
                    start_time_milli = ?2, \
                    end_time_milli = ?3, \
                    quality_rating = ?4 \
                 WHERE night_id = ?1",
                params![
                    night.night_id,
                    night.start_time_milli,
                    night.end_time_milli,
                    night.sleep_quality
                ],
            )
            .map_err(|err| SleepError::database("updating night", err))
        })?;

        if changed == 0 {
            return Err(SleepError::NightNotFound(night.night_id));
        }
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute("DELETE FROM daily_sleep_quality_table", [])
                .map_err(|err| SleepError::database("clearing nights", err))?;
            Ok(())
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// In-memory
// ═══════════════════════════════════════════════════════════════════════════════

/// Non-durable store for hosts that do not need persistence, and for tests.
#[derive(Debug, Default)]
pub struct InMemorySleepDao {
    inner: Mutex<InMemoryNights>,
}

#[derive(Debug, Default)]
struct InMemoryNights {
    next_id: i64,
    // Insertion order; the newest night is last.
    nights: Vec<SleepNight>,
}

impl InMemorySleepDao {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, InMemoryNights>> {
        self.inner.lock().map_err(|_| SleepError::LockPoisoned)
    }
}

impl SleepDatabaseDao for InMemorySleepDao {
    fn get_all_nights(&self) -> Result<Vec<SleepNight>> {
        Ok(self.lock()?.nights.iter().rev().cloned().collect())
    }

    fn get_tonight(&self) -> Result<Option<SleepNight>> {
        Ok(self.lock()?.nights.last().cloned())
    }

    fn get(&self, night_id: i64) -> Result<Option<SleepNight>> {
        Ok(self
            .lock()?
            .nights
            .iter()
            .find(|night| night.night_id == night_id)
            .cloned())
    }

    fn insert(&self, night: &SleepNight) -> Result<i64> {
        let mut inner = self.lock()?;
        inner.next_id += 1;
        let night_id = inner.next_id;
        inner.nights.push(SleepNight {
            night_id,
            ..night.clone()
        });
        Ok(night_id)
    }

    fn update(&self, night: &SleepNight) -> Result<()> {
        let mut inner = self.lock()?;
        let stored = inner
            .nights
            .iter_mut()
            .find(|stored| stored.night_id == night.night_id)
            .ok_or(SleepError::NightNotFound(night.night_id))?;
        *stored = night.clone();
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.lock()?.nights.clear();
        Ok(())
    }
}
