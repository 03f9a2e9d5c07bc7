//! Durable storage for the daily distraction counter.
//!
//! Provides:
//! - The [`CounterStore`] trait the usage monitor writes through
//! - A SQLite key-value implementation at `~/.config/focusguard/focusguard.db`
//! - A shareable in-memory implementation for tests and simulations

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::NaiveDate;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use super::data_dir;
use crate::error::StoreError;

const TRACK_DATE_KEY: &str = "usage_track_date";
const CUMULATIVE_KEY: &str = "cumulative_distraction_ms";
const RESET_OFFSET_KEY: &str = "usage_reset_offset_ms";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// The persisted part of the usage state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterRecord {
    pub date: NaiveDate,
    #[serde(with = "crate::settings::duration_ms")]
    pub cumulative: Duration,
    /// Raw accounting total hidden by a manual reset on `date`.
    #[serde(with = "crate::settings::duration_ms", default)]
    pub reset_offset: Duration,
}

impl CounterRecord {
    pub fn zero(date: NaiveDate) -> Self {
        Self {
            date,
            cumulative: Duration::ZERO,
            reset_offset: Duration::ZERO,
        }
    }
}

pub trait CounterStore: Send {
    /// `None` when nothing was ever saved.
    fn load_counter(&self) -> Result<Option<CounterRecord>, StoreError>;

    fn save_counter(&mut self, record: &CounterRecord) -> Result<(), StoreError>;
}

/// SQLite-backed counter store.
pub struct SqliteCounterStore {
    conn: Connection,
}

impl SqliteCounterStore {
    /// Open the database at `~/.config/focusguard/focusguard.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the data directory or database cannot be opened.
    pub fn open() -> Result<Self, crate::error::CoreError> {
        let path = data_dir()?.join("focusguard.db");
        Ok(Self::open_at(&path)?)
    }

    pub fn open_at(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|source| StoreError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<(), rusqlite::Error> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )
    }

    /// Get a value from the kv store.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>, rusqlite::Error> {
        let mut stmt = self.conn.prepare("SELECT value FROM kv WHERE key = ?1")?;
        let result = stmt.query_row(params![key], |row| row.get::<_, String>(0));
        match result {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Set a value in the kv store.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    fn millis(&self, key: &str) -> Result<Duration, StoreError> {
        match self.kv_get(key)? {
            None => Ok(Duration::ZERO),
            Some(raw) => raw
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| StoreError::Corrupt {
                    key: key.to_string(),
                    value: raw,
                }),
        }
    }
}

impl CounterStore for SqliteCounterStore {
    fn load_counter(&self) -> Result<Option<CounterRecord>, StoreError> {
        let Some(raw_date) = self.kv_get(TRACK_DATE_KEY)? else {
            return Ok(None);
        };
        let date = NaiveDate::parse_from_str(&raw_date, DATE_FORMAT).map_err(|_| {
            StoreError::Corrupt {
                key: TRACK_DATE_KEY.to_string(),
                value: raw_date.clone(),
            }
        })?;
        Ok(Some(CounterRecord {
            date,
            cumulative: self.millis(CUMULATIVE_KEY)?,
            reset_offset: self.millis(RESET_OFFSET_KEY)?,
        }))
    }

    fn save_counter(&mut self, record: &CounterRecord) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        for (key, value) in [
            (TRACK_DATE_KEY, record.date.format(DATE_FORMAT).to_string()),
            (CUMULATIVE_KEY, (record.cumulative.as_millis() as u64).to_string()),
            (RESET_OFFSET_KEY, (record.reset_offset.as_millis() as u64).to_string()),
        ] {
            tx.execute(
                "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
                params![key, value],
            )?;
        }
        tx.commit()?;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct MemoryInner {
    record: Option<CounterRecord>,
    fail_writes: bool,
    fail_reads: bool,
    writes: usize,
}

/// In-process counter store. Clones share the same storage, so a test can
/// keep a handle while the monitor owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryCounterStore {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(record: CounterRecord) -> Self {
        let store = Self::new();
        store.lock().record = Some(record);
        store
    }

    pub fn record(&self) -> Option<CounterRecord> {
        self.lock().record
    }

    /// Number of successful writes.
    pub fn writes(&self) -> usize {
        self.lock().writes
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.lock().fail_reads = fail;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        // A poisoned lock only means a test panicked mid-write; the data is
        // still usable.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl CounterStore for MemoryCounterStore {
    fn load_counter(&self) -> Result<Option<CounterRecord>, StoreError> {
        let inner = self.lock();
        if inner.fail_reads {
            return Err(StoreError::Unavailable("injected read failure".into()));
        }
        Ok(inner.record)
    }

    fn save_counter(&mut self, record: &CounterRecord) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if inner.fail_writes {
            return Err(StoreError::Unavailable("injected write failure".into()));
        }
        inner.record = Some(*record);
        inner.writes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    #[test]
    fn empty_store_loads_none() {
        let store = SqliteCounterStore::open_memory().unwrap();
        assert!(store.load_counter().unwrap().is_none());
    }

    #[test]
    fn save_then_load() {
        let mut store = SqliteCounterStore::open_memory().unwrap();
        let record = CounterRecord {
            date: day(2),
            cumulative: Duration::from_millis(1_234_000),
            reset_offset: Duration::from_millis(60_000),
        };
        store.save_counter(&record).unwrap();
        assert_eq!(store.load_counter().unwrap(), Some(record));
        assert_eq!(store.kv_get(TRACK_DATE_KEY).unwrap().unwrap(), "2026-03-02");
    }

    #[test]
    fn corrupt_counter_is_reported() {
        let store = SqliteCounterStore::open_memory().unwrap();
        store.kv_set(TRACK_DATE_KEY, "2026-03-02").unwrap();
        store.kv_set(CUMULATIVE_KEY, "lots").unwrap();
        assert!(matches!(
            store.load_counter(),
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[test]
    fn on_disk_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("focusguard.db");
        {
            let mut store = SqliteCounterStore::open_at(&path).unwrap();
            store.save_counter(&CounterRecord::zero(day(5))).unwrap();
        }
        let store = SqliteCounterStore::open_at(&path).unwrap();
        assert_eq!(store.load_counter().unwrap(), Some(CounterRecord::zero(day(5))));
    }

    #[test]
    fn memory_store_injects_failures() {
        let mut store = MemoryCounterStore::new();
        let handle = store.clone();
        handle.set_fail_writes(true);
        assert!(store.save_counter(&CounterRecord::zero(day(1))).is_err());
        handle.set_fail_writes(false);
        store.save_counter(&CounterRecord::zero(day(1))).unwrap();
        assert_eq!(handle.writes(), 1);
        assert_eq!(handle.record(), Some(CounterRecord::zero(day(1))));
    }
}
