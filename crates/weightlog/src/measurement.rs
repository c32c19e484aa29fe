//! Core measurement type for weightlog.
//!
//! A measurement is a single weigh-in: who, how much, and when. The
//! timestamp is always assigned by the system clock at write time.

use chrono::{Local, NaiveDateTime, SubsecRound};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Format used for timestamps in the store and in every rendered view.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A single recorded weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Free-form name of the person being tracked. Matched exactly.
    pub subject: String,

    /// The measured weight. Any float is accepted.
    pub value: f64,

    /// When the measurement was recorded, at second resolution.
    pub recorded_at: NaiveDateTime,
}

impl Measurement {
    /// Create a measurement stamped with the current local time.
    #[must_use]
    pub fn new(subject: impl Into<String>, value: f64) -> Self {
        Self::at(subject, value, now())
    }

    /// Create a measurement with an explicit timestamp.
    ///
    /// Used when reading back from storage and when matching rows for deletion.
    #[must_use]
    pub fn at(subject: impl Into<String>, value: f64, recorded_at: NaiveDateTime) -> Self {
        Self {
            subject: subject.into(),
            value,
            recorded_at: recorded_at.trunc_subsecs(0),
        }
    }

    /// Build a measurement from raw form or CLI input.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the name is empty, the weight is not
    /// a number, or the timestamp does not match [`TIMESTAMP_FORMAT`].
    pub fn from_input(subject: &str, value: &str, recorded_at: &str) -> Result<Self> {
        let subject = validate_subject(subject)?;
        let value = parse_value(value)?;
        let recorded_at = parse_timestamp(recorded_at)?;
        Ok(Self::at(subject, value, recorded_at))
    }

    /// The timestamp rendered in store format.
    #[must_use]
    pub fn timestamp(&self) -> String {
        format_timestamp(&self.recorded_at)
    }

    /// The value rendered in store format.
    #[must_use]
    pub fn value_text(&self) -> String {
        format_value(self.value)
    }

    /// Whether this measurement is the exact (subject, value, timestamp) triple.
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn matches(&self, subject: &str, value: f64, recorded_at: &NaiveDateTime) -> bool {
        self.subject == subject && self.value == value && &self.recorded_at == recorded_at
    }
}

impl std::fmt::Display for Measurement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} at {}",
            self.subject,
            self.value_text(),
            self.timestamp()
        )
    }
}

/// Current local time truncated to whole seconds.
#[must_use]
pub fn now() -> NaiveDateTime {
    Local::now().naive_local().trunc_subsecs(0)
}

/// Reject an empty subject. No trimming or case folding is applied.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if `subject` is empty.
pub fn validate_subject(subject: &str) -> Result<&str> {
    if subject.is_empty() {
        return Err(Error::invalid_input("name", "name must not be empty"));
    }
    Ok(subject)
}

/// Coerce a weight string to a float.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if `value` is not a number.
pub fn parse_value(value: &str) -> Result<f64> {
    value.trim().parse::<f64>().map_err(|_| {
        Error::invalid_input("weight", format!("could not convert '{value}' to a number"))
    })
}

/// Parse a `YYYY-MM-DD HH:MM:SS` timestamp.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if `value` does not match [`TIMESTAMP_FORMAT`].
pub fn parse_timestamp(value: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT).map_err(|e| {
        Error::invalid_input(
            "timestamp",
            format!("'{value}' is not YYYY-MM-DD HH:MM:SS: {e}"),
        )
    })
}

/// Render a timestamp in store format.
#[must_use]
pub fn format_timestamp(timestamp: &NaiveDateTime) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

/// Render a weight so integral values keep a trailing `.0` (`180.0`).
#[must_use]
pub fn format_value(value: f64) -> String {
    format!("{value:?}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> NaiveDateTime {
        parse_timestamp(s).unwrap()
    }

    #[test]
    fn test_measurement_new_has_whole_seconds() {
        let m = Measurement::new("Sam", 180.0);
        assert_eq!(m.subject, "Sam");
        assert_eq!(m.recorded_at, m.recorded_at.trunc_subsecs(0));
    }

    #[test]
    fn test_from_input() {
        let m = Measurement::from_input("Sam", " 172.5 ", "2024-01-01 08:30:00").unwrap();
        assert_eq!(m.subject, "Sam");
        assert!((m.value - 172.5).abs() < f64::EPSILON);
        assert_eq!(m.timestamp(), "2024-01-01 08:30:00");
    }

    #[test]
    fn test_from_input_rejects_non_numeric_weight() {
        let err = Measurement::from_input("Sam", "heavy", "2024-01-01 08:30:00").unwrap_err();
        assert!(err.is_invalid_input());
        assert!(err.to_string().contains("weight"));
    }

    #[test]
    fn test_from_input_rejects_bad_timestamp() {
        let err = Measurement::from_input("Sam", "180", "2024-01-01T08:30:00").unwrap_err();
        assert!(err.to_string().contains("timestamp"));
    }

    #[test]
    fn test_from_input_rejects_empty_name() {
        let err = Measurement::from_input("", "180", "2024-01-01 08:30:00").unwrap_err();
        assert!(err.to_string().contains("name"));
    }

    #[test]
    fn test_subject_is_not_normalized() {
        let m = Measurement::from_input(" sam ", "180", "2024-01-01 08:30:00").unwrap();
        assert_eq!(m.subject, " sam ");
    }

    #[test]
    fn test_negative_and_zero_values_accepted() {
        assert!((parse_value("-3").unwrap() + 3.0).abs() < f64::EPSILON);
        assert!(parse_value("0").unwrap().abs() < f64::EPSILON);
    }

    #[test]
    fn test_format_value_keeps_decimal_point() {
        assert_eq!(format_value(180.0), "180.0");
        assert_eq!(format_value(172.5), "172.5");
        assert_eq!(format_value(-2.0), "-2.0");
    }

    #[test]
    fn test_matches_exact_triple() {
        let when = ts("2024-02-01 00:00:00");
        let m = Measurement::at("Sam", 170.0, when);
        assert!(m.matches("Sam", 170.0, &when));
        assert!(!m.matches("sam", 170.0, &when));
        assert!(!m.matches("Sam", 170.5, &when));
        assert!(!m.matches("Sam", 170.0, &ts("2024-02-01 00:00:01")));
    }

    #[test]
    fn test_display() {
        let m = Measurement::at("Sam", 180.0, ts("2024-01-01 00:00:00"));
        assert_eq!(m.to_string(), "Sam 180.0 at 2024-01-01 00:00:00");
    }

    #[test]
    fn test_serialization() {
        let m = Measurement::at("Sam", 180.0, ts("2024-01-01 00:00:00"));
        let json = serde_json::to_string(&m).unwrap();
        let back: Measurement = serde_json::from_str(&json).unwrap();
        assert_eq!(m, back);
    }
}
