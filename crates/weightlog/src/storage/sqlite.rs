//! `SQLite`-backed record store.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection};
use tracing::{debug, info};

use super::{ensure_parent_dir, migrations, RecordStore};
use crate::error::{Error, Result};
use crate::measurement::{parse_timestamp, Measurement};

/// Measurements stored in an `SQLite` database.
///
/// Row ids preserve insertion order, so reads return the same store order
/// the CSV adapter would.
#[derive(Debug)]
pub struct SqliteStore {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a database at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist.
    /// Initializes the schema if this is a new database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        ensure_parent_dir(&path)?;

        debug!("Opening database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        migrations::initialize_schema(&conn)?;

        info!("Database opened successfully at {}", path.display());
        Ok(Self {
            path,
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;

        migrations::initialize_schema(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::internal("database connection lock poisoned"))
    }
}

impl RecordStore for SqliteStore {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn location(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<Vec<Measurement>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT id, subject, value, recorded_at FROM measurements ORDER BY id")?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    // SQLite stores NaN as NULL.
                    row.get::<_, Option<f64>>(2)?.unwrap_or(f64::NAN),
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, subject, value, recorded_at)| {
                let recorded_at = parse_timestamp(&recorded_at).map_err(|e| {
                    Error::malformed(u64::try_from(id).unwrap_or(0), e.to_string())
                })?;
                Ok(Measurement::at(subject, value, recorded_at))
            })
            .collect()
    }

    fn append(&self, record: &Measurement) -> Result<()> {
        self.conn()?.execute(
            "INSERT INTO measurements (subject, value, recorded_at) VALUES (?1, ?2, ?3)",
            params![record.subject, record.value, record.timestamp()],
        )?;
        info!("Recorded {}", record);
        Ok(())
    }

    fn delete_exact(&self, record: &Measurement) -> Result<bool> {
        let affected = self.conn()?.execute(
            r"
            DELETE FROM measurements WHERE id = (
                SELECT id FROM measurements
                WHERE subject = ?1 AND value = ?2 AND recorded_at = ?3
                ORDER BY id LIMIT 1
            )
            ",
            params![record.subject, record.value, record.timestamp()],
        )?;

        if affected > 0 {
            info!("Deleted {}", record);
        }
        Ok(affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_store() -> SqliteStore {
        SqliteStore::open_in_memory().expect("failed to create test storage")
    }

    fn m(subject: &str, value: f64, at: &str) -> Measurement {
        Measurement::at(subject, value, parse_timestamp(at).unwrap())
    }

    #[test]
    fn test_open_in_memory() {
        let store = create_test_store();
        assert!(store.read_all().unwrap().is_empty());
        assert_eq!(store.location().to_string_lossy(), ":memory:");
    }

    #[test]
    fn test_append_and_read_in_store_order() {
        let store = create_test_store();
        store.append(&m("Sam", 170.0, "2024-02-01 00:00:00")).unwrap();
        store.append(&m("Sam", 180.0, "2024-01-01 00:00:00")).unwrap();

        let records = store.read_all().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], m("Sam", 170.0, "2024-02-01 00:00:00"));
        assert_eq!(records[1], m("Sam", 180.0, "2024-01-01 00:00:00"));
    }

    #[test]
    fn test_delete_exact_removes_first_match_only() {
        let store = create_test_store();
        store.append(&m("Sam", 180.0, "2024-01-01 00:00:00")).unwrap();
        store.append(&m("Sam", 180.0, "2024-01-01 00:00:00")).unwrap();
        store.append(&m("Sam", 180.0, "2024-01-01 00:00:01")).unwrap();

        assert!(store.delete_exact(&m("Sam", 180.0, "2024-01-01 00:00:00")).unwrap());
        assert_eq!(store.read_all().unwrap().len(), 2);
    }

    #[test]
    fn test_delete_nonexistent() {
        let store = create_test_store();
        store.append(&m("Sam", 180.0, "2024-01-01 00:00:00")).unwrap();
        assert!(!store.delete_exact(&m("Sam", 180.0, "2024-01-02 00:00:00")).unwrap());
    }

    #[test]
    fn test_malformed_timestamp_fails_read() {
        let store = create_test_store();
        store
            .conn()
            .unwrap()
            .execute(
                "INSERT INTO measurements (subject, value, recorded_at) VALUES ('Sam', 1.0, 'soon')",
                [],
            )
            .unwrap();

        assert!(store.read_all().unwrap_err().is_malformed_record());
    }

    #[test]
    fn test_open_file_based() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("nested/weights.db");

        let store = SqliteStore::open(&db_path).unwrap();
        store.append(&m("Sam", 180.0, "2024-01-01 00:00:00")).unwrap();
        drop(store);

        let reopened = SqliteStore::open(&db_path).unwrap();
        assert_eq!(reopened.read_all().unwrap().len(), 1);
        assert_eq!(reopened.location(), db_path);
    }
}
