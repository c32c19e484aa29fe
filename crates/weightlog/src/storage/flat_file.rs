//! CSV-backed record store.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use tracing::{debug, info};

use super::{ensure_parent_dir, RecordStore};
use crate::error::{Error, Result};
use crate::measurement::{parse_timestamp, parse_value, Measurement};

/// Header row written when the file is first created.
pub const HEADER: [&str; 3] = ["Name", "Weight", "Timestamp"];

/// Append-only CSV file of measurements.
///
/// The file is created with a header row the first time it is needed, so
/// deleting it while the server runs simply starts a fresh store.
#[derive(Debug)]
pub struct CsvStore {
    path: PathBuf,
}

impl CsvStore {
    /// Open or create a CSV store at the given path.
    ///
    /// Creates the parent directories and the file (with its header) if
    /// they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file or its directory cannot be created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let store = Self {
            path: path.as_ref().to_path_buf(),
        };
        store.ensure_initialized()?;
        info!("CSV store ready at {}", store.path.display());
        Ok(store)
    }

    /// Get the path to the CSV file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the header if the file is missing or empty.
    ///
    /// Returns the length the file had before, `0` if the header was just
    /// written.
    fn ensure_initialized(&self) -> Result<u64> {
        let len = match std::fs::metadata(&self.path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };
        if len == 0 {
            ensure_parent_dir(&self.path)?;
            let mut writer = WriterBuilder::new().from_path(&self.path)?;
            writer.write_record(HEADER)?;
            writer.flush()?;
            debug!("Wrote header to {}", self.path.display());
        }
        Ok(len)
    }

    fn reader(&self) -> Result<csv::Reader<File>> {
        Ok(ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(&self.path)?)
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

impl RecordStore for CsvStore {
    fn name(&self) -> &'static str {
        "csv"
    }

    fn location(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<Vec<Measurement>> {
        self.ensure_initialized()?;
        let mut reader = self.reader()?;
        let mut records = Vec::new();
        for row in reader.records() {
            records.push(parse_row(&row?)?);
        }
        debug!("Read {} measurements from {}", records.len(), self.path.display());
        Ok(records)
    }

    fn append(&self, record: &Measurement) -> Result<()> {
        let len = self.ensure_initialized()?;
        let mut file = OpenOptions::new().read(true).append(true).open(&self.path)?;
        if len > 0 && !ends_with_newline(&mut file, len)? {
            // Hand-edited files may lack a final line terminator.
            file.write_all(b"\n")?;
        }
        let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);
        writer.write_record([
            record.subject.as_str(),
            record.value_text().as_str(),
            record.timestamp().as_str(),
        ])?;
        writer.flush()?;
        info!("Recorded {}", record);
        Ok(())
    }

    fn delete_exact(&self, record: &Measurement) -> Result<bool> {
        self.ensure_initialized()?;
        let mut reader = self.reader()?;
        let header = reader.headers()?.clone();
        let rows = reader
            .records()
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let Some(target) = rows.iter().position(|row| row_matches(row, record)) else {
            debug!("No row matched {}", record);
            return Ok(false);
        };

        let temp = self.temp_path();
        {
            let mut writer = WriterBuilder::new()
                .has_headers(false)
                .flexible(true)
                .from_path(&temp)?;
            writer.write_record(&header)?;
            for (i, row) in rows.iter().enumerate() {
                if i != target {
                    writer.write_record(row)?;
                }
            }
            writer.flush()?;
        }
        std::fs::rename(&temp, &self.path)?;

        info!("Deleted {}", record);
        Ok(true)
    }
}

fn ends_with_newline(file: &mut File, len: u64) -> Result<bool> {
    let mut last = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

/// Convert a CSV row into a measurement.
fn parse_row(row: &StringRecord) -> Result<Measurement> {
    let line = row.position().map_or(0, csv::Position::line);
    if row.len() != HEADER.len() {
        return Err(Error::malformed(
            line,
            format!("expected {} fields, found {}", HEADER.len(), row.len()),
        ));
    }

    let subject = &row[0];
    if subject.is_empty() {
        return Err(Error::malformed(line, "empty name"));
    }
    let value = parse_value(&row[1]).map_err(|e| Error::malformed(line, e.to_string()))?;
    let recorded_at = parse_timestamp(&row[2]).map_err(|e| Error::malformed(line, e.to_string()))?;

    Ok(Measurement::at(subject, value, recorded_at))
}

/// Lenient comparison used by delete: rows that do not parse never match.
fn row_matches(row: &StringRecord, record: &Measurement) -> bool {
    if row.len() != HEADER.len() {
        return false;
    }
    let (Ok(value), Ok(recorded_at)) = (parse_value(&row[1]), parse_timestamp(&row[2])) else {
        return false;
    };
    record.matches(&row[0], value, &recorded_at)
}
