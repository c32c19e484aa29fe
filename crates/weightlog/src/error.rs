//! Error types for weightlog.
//!
//! This module defines all error types used throughout the weightlog crate,
//! providing detailed context for debugging and user-friendly error messages.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for weightlog operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Data Errors ===
    /// Not enough measurements to compute a change or a series.
    #[error("insufficient data: {records} measurement(s) stored, at least 2 required")]
    InsufficientData {
        /// Number of measurements that were available.
        records: usize,
    },

    /// A stored row does not have the (name, weight, timestamp) shape.
    #[error("malformed record at line {line}: {reason}")]
    MalformedRecord {
        /// 1-based line number in the store (the header is line 1).
        line: u64,
        /// What was wrong with the row.
        reason: String,
    },

    /// Caller-supplied input could not be coerced.
    #[error("invalid {field}: {message}")]
    InvalidInput {
        /// Name of the offending field.
        field: &'static str,
        /// Description of the problem.
        message: String,
    },

    // === Storage Errors ===
    /// Reading or writing the CSV store failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Failed to open or create the database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === Output Errors ===
    /// Rendering the chart failed.
    #[error("chart rendering failed: {0}")]
    Chart(String),

    /// Location lookup for a client address failed.
    #[error("location lookup failed: {0}")]
    Lookup(String),

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Generic Errors ===
    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for weightlog operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new invalid input error.
    #[must_use]
    pub fn invalid_input(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidInput {
            field,
            message: message.into(),
        }
    }

    /// Create a new malformed record error.
    #[must_use]
    pub fn malformed(line: u64, reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            line,
            reason: reason.into(),
        }
    }

    /// Create a new chart error.
    #[must_use]
    pub fn chart(message: impl Into<String>) -> Self {
        Self::Chart(message.into())
    }

    /// Create a new lookup error.
    #[must_use]
    pub fn lookup(message: impl Into<String>) -> Self {
        Self::Lookup(message.into())
    }

    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Check if this error means there were too few measurements.
    #[must_use]
    pub fn is_insufficient_data(&self) -> bool {
        matches!(self, Self::InsufficientData { .. })
    }

    /// Check if this error was caused by bad caller input.
    #[must_use]
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Self::InvalidInput { .. })
    }

    /// Check if this error was caused by a corrupt row in the store.
    #[must_use]
    pub fn is_malformed_record(&self) -> bool {
        matches!(self, Self::MalformedRecord { .. })
    }
}
