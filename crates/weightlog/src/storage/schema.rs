//! `SQLite` schema definitions for weightlog.
//!
//! This module contains the SQL statements for creating and managing
//! the database schema.

/// SQL statement to create the measurements table.
///
/// `id` preserves insertion order, which is the store order.
pub const CREATE_MEASUREMENTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS measurements (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    subject TEXT NOT NULL,
    value REAL,
    recorded_at TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
)
";

/// SQL statement to create an index for exact-match deletes.
pub const CREATE_SUBJECT_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_measurements_subject ON measurements(subject, recorded_at)
";

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// All schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_MEASUREMENTS_TABLE,
    CREATE_SUBJECT_INDEX,
    CREATE_METADATA_TABLE,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_statements_not_empty() {
        assert!(!SCHEMA_STATEMENTS.is_empty());
        for stmt in SCHEMA_STATEMENTS {
            assert!(!stmt.is_empty());
        }
    }

    #[test]
    fn test_create_measurements_table_contains_required_columns() {
        assert!(CREATE_MEASUREMENTS_TABLE.contains("id INTEGER PRIMARY KEY"));
        assert!(CREATE_MEASUREMENTS_TABLE.contains("subject TEXT NOT NULL"));
        assert!(CREATE_MEASUREMENTS_TABLE.contains("value REAL"));
        assert!(CREATE_MEASUREMENTS_TABLE.contains("recorded_at TEXT NOT NULL"));
    }

    #[test]
    fn test_create_metadata_table_structure() {
        assert!(CREATE_METADATA_TABLE.contains("key TEXT PRIMARY KEY"));
        assert!(CREATE_METADATA_TABLE.contains("value TEXT NOT NULL"));
    }
}
