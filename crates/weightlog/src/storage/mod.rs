//! Storage layer for weightlog.
//!
//! Measurements live behind the [`RecordStore`] trait so the aggregation and
//! web layers never touch files directly. Two adapters are provided:
//!
//! - [`CsvStore`]: an append-only flat file with a `Name,Weight,Timestamp`
//!   header. This is the default.
//! - [`SqliteStore`]: the same three operations on an `SQLite` table.
//!
//! Neither adapter coordinates between concurrent writers. Two simultaneous
//! submissions against the CSV file can interleave, and a delete that
//! rewrites the file can drop a row appended while it was running.

pub mod flat_file;
pub mod migrations;
pub mod schema;
pub mod sqlite;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::debug;

use crate::config::{Config, StorageBackend};
use crate::error::{Error, Result};
use crate::measurement::Measurement;

pub use flat_file::CsvStore;
pub use sqlite::SqliteStore;

/// A durable, ordered collection of measurements.
///
/// Store order is insertion order. Implementations re-read durable storage
/// on every call; nothing is cached between calls.
pub trait RecordStore: Send + Sync + std::fmt::Debug {
    /// Short backend name (for logging and status output).
    fn name(&self) -> &'static str;

    /// Where the store lives on disk.
    fn location(&self) -> &Path;

    /// Read every measurement in store order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedRecord`] if any stored row cannot be parsed,
    /// or an I/O or database error if the store cannot be read.
    fn read_all(&self) -> Result<Vec<Measurement>>;

    /// Append one measurement at the end of the store.
    ///
    /// # Errors
    ///
    /// Returns an I/O or database error if the write fails.
    fn append(&self, record: &Measurement) -> Result<()>;

    /// Remove the first row matching the exact (subject, value, timestamp)
    /// triple. Returns `false` if no row matched.
    ///
    /// # Errors
    ///
    /// Returns an I/O or database error if the store cannot be rewritten.
    fn delete_exact(&self, record: &Measurement) -> Result<bool>;
}

/// Open the store selected by configuration, creating it if needed.
///
/// # Errors
///
/// Returns an error if the store cannot be created or opened.
pub fn open_store(config: &Config) -> Result<Arc<dyn RecordStore>> {
    let path = config.data_path();
    debug!(backend = %config.storage.backend, path = %path.display(), "opening store");
    let store: Arc<dyn RecordStore> = match config.storage.backend {
        StorageBackend::Csv => Arc::new(CsvStore::open(&path)?),
        StorageBackend::Sqlite => Arc::new(SqliteStore::open(&path)?),
    };
    Ok(store)
}

/// Create the parent directory of `path` if it does not exist.
pub(crate) fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                path: parent.to_path_buf(),
                source,
            })?;
        }
    }
    Ok(())
}

/// Statistics about a store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreStats {
    /// Backend name.
    pub backend: &'static str,
    /// Location of the store on disk.
    pub location: PathBuf,
    /// Total number of measurements stored.
    pub total_records: usize,
    /// Number of distinct subjects.
    pub subjects: usize,
    /// Timestamp of the oldest measurement.
    pub oldest: Option<NaiveDateTime>,
    /// Timestamp of the newest measurement.
    pub newest: Option<NaiveDateTime>,
    /// Size of the store file in bytes.
    pub size_bytes: u64,
}

impl StoreStats {
    /// Gather statistics by reading the whole store.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn collect(store: &dyn RecordStore) -> Result<Self> {
        let records = store.read_all()?;
        let subjects: HashSet<&str> = records.iter().map(|r| r.subject.as_str()).collect();
        let size_bytes = std::fs::metadata(store.location())
            .map(|m| m.len())
            .unwrap_or(0);

        Ok(Self {
            backend: store.name(),
            location: store.location().to_path_buf(),
            total_records: records.len(),
            subjects: subjects.len(),
            oldest: records.iter().map(|r| r.recorded_at).min(),
            newest: records.iter().map(|r| r.recorded_at).max(),
            size_bytes,
        })
    }
}
