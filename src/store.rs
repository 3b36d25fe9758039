//! The persistent key-value store: schema bootstrap and per-worker handles.
//!
//! Bootstrap runs once, before any worker exists, on a connection nobody else
//! touches concurrently. Every worker thereafter opens its own private
//! [`WorkerStore`] and never shares it.

use std::path::Path;

use rusqlite::{Connection, OpenFlags};

use crate::{
    errors::StoreError,
    keys::{default_json, DATA_KEYS},
};

/// Creates the schema (if absent) and seeds one row per fixed key.
///
/// Idempotent: re-running against an already-seeded database changes nothing,
/// because seeding uses `INSERT OR IGNORE`.
pub fn bootstrap(db_path: &Path) -> Result<(), StoreError> {
    let conn = Connection::open_with_flags(
        db_path,
        OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX,
    )?;

    conn.execute_batch(
        "PRAGMA journal_mode=WAL;
         PRAGMA synchronous=NORMAL;
         PRAGMA temp_store=MEMORY;
         PRAGMA mmap_size=268435456;
         CREATE TABLE IF NOT EXISTS kv_store (
             data_key TEXT PRIMARY KEY,
             data_value TEXT NOT NULL,
             updated_at INTEGER NOT NULL
         );",
    )?;

    let mut seed = conn.prepare(
        "INSERT OR IGNORE INTO kv_store (data_key, data_value, updated_at)
         VALUES (?1, ?2, strftime('%s', 'now'))",
    )?;
    for key in DATA_KEYS {
        seed.execute((key, default_json(key)))?;
    }

    Ok(())
}

/// One worker's private connection plus its three long-lived prepared statements.
///
/// Opened in single-threaded (`SQLITE_OPEN_NOMUTEX`) mode: a `WorkerStore` is
/// used by exactly one thread for its entire lifetime, so SQLite's own
/// mutexing would be pure overhead.
pub struct WorkerStore {
    conn: Connection,
}

impl WorkerStore {
    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        conn.execute_batch(
            "PRAGMA busy_timeout=5000;
             PRAGMA synchronous=NORMAL;
             PRAGMA temp_store=MEMORY;
             PRAGMA mmap_size=268435456;
             PRAGMA cache_size=-32768;",
        )?;

        Ok(Self { conn })
    }

    /// Fetches the stored JSON for `key`, or `None` if the row is absent
    /// (which should not happen post-bootstrap, but is handled by the
    /// caller falling back to the key's default).
    pub fn fetch(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT data_value FROM kv_store WHERE data_key=?1")?;
        let mut rows = stmt.query([key])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    /// Inserts or overwrites `key`'s value and bumps `updated_at` to now.
    pub fn upsert(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO kv_store (data_key, data_value, updated_at)
             VALUES (?1, ?2, strftime('%s', 'now'))
             ON CONFLICT(data_key) DO UPDATE SET
                 data_value=excluded.data_value,
                 updated_at=excluded.updated_at",
        )?;
        stmt.execute((key, value))?;
        Ok(())
    }

    /// Whether `text` parses as a JSON document per SQLite's own grammar.
    pub fn json_is_valid(&self, text: &str) -> Result<bool, StoreError> {
        let mut stmt = self.conn.prepare_cached("SELECT json_valid(?1)")?;
        let valid: i64 = stmt.query_row([text], |row| row.get(0))?;
        Ok(valid != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn bootstrapped() -> (NamedTempFile, WorkerStore) {
        let file = NamedTempFile::new().unwrap();
        bootstrap(file.path()).unwrap();
        let store = WorkerStore::open(file.path()).unwrap();
        (file, store)
    }

    #[test]
    fn bootstrap_seeds_defaults_for_every_key() {
        let (_file, store) = bootstrapped();
        for key in DATA_KEYS {
            let value = store.fetch(key).unwrap().unwrap();
            assert_eq!(value, default_json(key));
        }
    }

    #[test]
    fn bootstrap_is_idempotent() {
        let file = NamedTempFile::new().unwrap();
        bootstrap(file.path()).unwrap();
        {
            let store = WorkerStore::open(file.path()).unwrap();
            store.upsert("profile", r#"{"name":"ada"}"#).unwrap();
        }
        // Re-running bootstrap must not clobber the write via INSERT OR IGNORE.
        bootstrap(file.path()).unwrap();
        let store = WorkerStore::open(file.path()).unwrap();
        assert_eq!(store.fetch("profile").unwrap().unwrap(), r#"{"name":"ada"}"#);
    }

    #[test]
    fn upsert_then_fetch_round_trips() {
        let (_file, store) = bootstrapped();
        store.upsert("activities", r#"[{"sport":"run"}]"#).unwrap();
        assert_eq!(
            store.fetch("activities").unwrap().unwrap(),
            r#"[{"sport":"run"}]"#
        );

        // Overwrite.
        store.upsert("activities", "[]").unwrap();
        assert_eq!(store.fetch("activities").unwrap().unwrap(), "[]");
    }

    #[test]
    fn json_validity_predicate_matches_sqlite_grammar() {
        let (_file, store) = bootstrapped();
        assert!(store.json_is_valid("{}").unwrap());
        assert!(store.json_is_valid("[]").unwrap());
        assert!(store.json_is_valid(r#"{"a":1}"#).unwrap());
        assert!(!store.json_is_valid("abc").unwrap());
        assert!(!store.json_is_valid("").unwrap());
    }

    #[test]
    fn fetch_of_absent_key_returns_none() {
        let (_file, store) = bootstrapped();
        assert_eq!(store.fetch("not-a-real-key").unwrap(), None);
    }
}
