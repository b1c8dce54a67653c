//! SQLite-backed durable countdown store.
//!
//! Holds one row per blocked entity with the last persisted remaining time.
//! Rows are replaced on every refresh tick and deleted on stop/expiry.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};

use super::countdown_store::{CountdownRecord, CountdownStore};
use super::data_dir;
use crate::error::{CoreError, StoreError};

/// SQLite database for countdown snapshots.
pub struct SqliteCountdownStore {
    conn: Mutex<Connection>,
}

impl SqliteCountdownStore {
    /// Open the store at `~/.config/nterrupt/nterrupt.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the data directory or database cannot be opened.
    pub fn open() -> Result<Self, CoreError> {
        let path = data_dir()?.join("nterrupt.db");
        Ok(Self::open_path(&path)?)
    }

    /// Open the store at an explicit path.
    pub fn open_path(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|source| StoreError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    /// Open an in-memory database (for tests).
    pub fn open_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Locked)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS countdowns (
                entity_id    TEXT PRIMARY KEY,
                remaining_ms INTEGER NOT NULL,
                saved_at_ms  INTEGER NOT NULL,
                display_name TEXT
            );",
        )?;
        Ok(())
    }
}

impl CountdownStore for SqliteCountdownStore {
    fn put(&self, record: &CountdownRecord) -> Result<(), StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Locked)?;
        conn.execute(
            "INSERT OR REPLACE INTO countdowns (entity_id, remaining_ms, saved_at_ms, display_name)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                record.entity_id,
                record.remaining_ms as i64,
                record.saved_at_ms as i64,
                record.display_name,
            ],
        )?;
        Ok(())
    }

    fn get(&self, entity_id: &str) -> Result<Option<CountdownRecord>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Locked)?;
        let record = conn
            .query_row(
                "SELECT entity_id, remaining_ms, saved_at_ms, display_name
                 FROM countdowns WHERE entity_id = ?1",
                params![entity_id],
                row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    fn delete(&self, entity_id: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Locked)?;
        conn.execute(
            "DELETE FROM countdowns WHERE entity_id = ?1",
            params![entity_id],
        )?;
        Ok(())
    }

    fn list(&self) -> Result<Vec<CountdownRecord>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Locked)?;
        let mut stmt = conn.prepare(
            "SELECT entity_id, remaining_ms, saved_at_ms, display_name
             FROM countdowns ORDER BY entity_id",
        )?;
        let rows = stmt.query_map([], row_to_record)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<CountdownRecord> {
    Ok(CountdownRecord {
        entity_id: row.get(0)?,
        remaining_ms: row.get::<_, i64>(1)?.max(0) as u64,
        saved_at_ms: row.get::<_, i64>(2)?.max(0) as u64,
        display_name: row.get(3)?,
    })
}
