//! Schema creation and version stamp for the `SQLite` store.
//!
//! The schema has a single version. Opening a database stamps it with
//! [`CURRENT_VERSION`] and refuses one stamped by a newer release.

use rusqlite::{Connection, OptionalExtension};
use tracing::debug;

use crate::error::{Error, Result};

use super::schema::SCHEMA_STATEMENTS;

/// The current schema version.
pub const CURRENT_VERSION: i32 = 1;

const VERSION_KEY: &str = "schema_version";

/// Create missing tables and indexes, then check and stamp the version.
///
/// # Errors
///
/// Returns an error if a statement fails, or if the stored version is not a
/// number or is newer than [`CURRENT_VERSION`].
pub fn initialize_schema(conn: &Connection) -> Result<()> {
    for statement in SCHEMA_STATEMENTS {
        conn.execute(statement, [])?;
    }

    match stored_version(conn)? {
        Some(CURRENT_VERSION) => Ok(()),
        Some(version) if version > CURRENT_VERSION => Err(Error::DatabaseMigration {
            message: format!(
                "database schema version {version} is newer than supported version {CURRENT_VERSION}"
            ),
        }),
        stored => {
            conn.execute(
                "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
                (VERSION_KEY, CURRENT_VERSION.to_string()),
            )?;
            debug!(from = ?stored, "stamped schema version {CURRENT_VERSION}");
            Ok(())
        }
    }
}

fn stored_version(conn: &Connection) -> Result<Option<i32>> {
    let value: Option<String> = conn
        .query_row(
            "SELECT value FROM metadata WHERE key = ?1",
            [VERSION_KEY],
            |row| row.get(0),
        )
        .optional()?;

    value
        .map(|v| {
            v.parse().map_err(|_| Error::DatabaseMigration {
                message: format!("invalid schema version: {v}"),
            })
        })
        .transpose()
}
