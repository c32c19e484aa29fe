//! Percentage-change aggregation over stored measurements.
//!
//! Two views are derived from the full, store-ordered list of measurements:
//!
//! - [`compute_change`] summarizes each subject's change between its first
//!   and last measurement.
//! - [`compute_series`] produces the change between each pair of consecutive
//!   measurements, which is what the chart plots.
//!
//! The two treat a zero base differently. The summary reports
//! [`PercentChange::DivisionByZero`]; the series contributes `0.0` for that
//! step. They are kept separate on purpose.

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::measurement::{format_timestamp, Measurement};

/// Minimum number of stored measurements before anything can be computed.
pub const MIN_RECORDS: usize = 2;

/// Text shown in place of a percentage when the first value is zero.
pub const DIVISION_BY_ZERO_SENTINEL: &str = "undefined, division by zero";

/// How "first" and "last" are chosen within a subject's measurements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderPolicy {
    /// Sort each subject's measurements by timestamp (then value) first.
    #[default]
    Chronological,
    /// Take measurements in the order they appear in the store.
    StoreOrder,
}

impl std::fmt::Display for OrderPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Chronological => write!(f, "chronological"),
            Self::StoreOrder => write!(f, "store_order"),
        }
    }
}

/// Change between a subject's first and last measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "percent", rename_all = "snake_case")]
pub enum PercentChange {
    /// A numeric change in percent, unrounded.
    Defined(f64),
    /// The first value was zero.
    DivisionByZero,
}

impl PercentChange {
    /// Compute the change from `first` to `last`.
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn between(first: f64, last: f64) -> Self {
        if first == 0.0 {
            Self::DivisionByZero
        } else {
            Self::Defined((last - first) / first * 100.0)
        }
    }

    /// The change rounded to two decimals, if defined.
    #[must_use]
    pub fn rounded(&self) -> Option<f64> {
        match self {
            Self::Defined(percent) => Some(round2(*percent)),
            Self::DivisionByZero => None,
        }
    }

    /// Whether the change could be computed.
    #[must_use]
    pub fn is_defined(&self) -> bool {
        matches!(self, Self::Defined(_))
    }

    /// Ordering used for reports: ascending by rounded value, undefined last.
    fn report_cmp(&self, other: &Self) -> Ordering {
        match (self.rounded(), other.rounded()) {
            (Some(a), Some(b)) => a.total_cmp(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }
}

impl std::fmt::Display for PercentChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Defined(percent) => write!(f, "{percent:.2}%"),
            Self::DivisionByZero => f.write_str(DIVISION_BY_ZERO_SENTINEL),
        }
    }
}

/// Per-subject summary produced by [`compute_change`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeSummary {
    /// The subject this summary describes.
    pub subject: String,
    /// Value of the first measurement used.
    pub first_value: f64,
    /// Value of the last measurement used.
    pub last_value: f64,
    /// Change from first to last.
    pub percent_change: PercentChange,
    /// Timestamp of the first measurement used.
    pub earliest: NaiveDateTime,
    /// Timestamp of the last measurement used.
    pub latest: NaiveDateTime,
    /// Number of measurements recorded for the subject.
    pub measurements: usize,
}

impl ChangeSummary {
    /// Time between the first and last measurement used.
    ///
    /// Negative when the store order disagrees with the clock.
    #[must_use]
    pub fn elapsed(&self) -> TimeDelta {
        self.latest - self.earliest
    }

    /// Whether `latest` is before `earliest`.
    #[must_use]
    pub fn is_out_of_order(&self) -> bool {
        self.elapsed() < TimeDelta::zero()
    }
}

/// Ordered collection of [`ChangeSummary`] values, one per subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeReport {
    /// Policy used to pick first and last measurements.
    pub policy: OrderPolicy,
    /// Summaries sorted ascending by change, undefined changes last.
    pub summaries: Vec<ChangeSummary>,
}

impl ChangeReport {
    /// Look up the summary for a subject.
    #[must_use]
    pub fn get(&self, subject: &str) -> Option<&ChangeSummary> {
        self.summaries.iter().find(|s| s.subject == subject)
    }

    /// Iterate summaries in report order.
    pub fn iter(&self) -> std::slice::Iter<'_, ChangeSummary> {
        self.summaries.iter()
    }

    /// Number of subjects in the report.
    #[must_use]
    pub fn len(&self) -> usize {
        self.summaries.len()
    }

    /// Whether no subject had two or more measurements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.summaries.is_empty()
    }
}

impl<'a> IntoIterator for &'a ChangeReport {
    type Item = &'a ChangeSummary;
    type IntoIter = std::slice::Iter<'a, ChangeSummary>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// One point of the consecutive-change series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    /// Subject the point belongs to.
    pub subject: String,
    /// Timestamp of the later measurement of the pair.
    pub recorded_at: NaiveDateTime,
    /// Change from the previous measurement, `0.0` when it was zero.
    pub percent_change: f64,
}

/// Summarize each subject's change between first and last measurement.
///
/// Subjects with a single measurement are left out.
///
/// # Errors
///
/// Returns [`Error::InsufficientData`] if fewer than [`MIN_RECORDS`]
/// measurements are stored in total.
pub fn compute_change(records: &[Measurement], policy: OrderPolicy) -> Result<ChangeReport> {
    ensure_enough(records)?;

    let mut summaries = Vec::new();
    for (subject, mut group) in group_by_subject(records) {
        if group.len() < MIN_RECORDS {
            debug!(subject, "skipping subject with a single measurement");
            continue;
        }
        if policy == OrderPolicy::Chronological {
            group.sort_by(|a, b| chronological(a, b));
        }

        let (first, last) = (group[0], group[group.len() - 1]);
        let summary = ChangeSummary {
            subject: subject.to_string(),
            first_value: first.value,
            last_value: last.value,
            percent_change: PercentChange::between(first.value, last.value),
            earliest: first.recorded_at,
            latest: last.recorded_at,
            measurements: group.len(),
        };

        if summary.is_out_of_order() {
            warn!(
                subject,
                earliest = %format_timestamp(&summary.earliest),
                latest = %format_timestamp(&summary.latest),
                "store order disagrees with timestamps"
            );
        }
        summaries.push(summary);
    }

    // Stable, so undefined changes keep their first-appearance order.
    summaries.sort_by(|a, b| a.percent_change.report_cmp(&b.percent_change));

    Ok(ChangeReport { policy, summaries })
}

/// Compute the change between consecutive measurements of each subject.
///
/// Points are grouped by subject (in order of first appearance) and
/// chronological within a subject. A subject with `n` measurements yields
/// `n - 1` points.
///
/// # Errors
///
/// Returns [`Error::InsufficientData`] if fewer than [`MIN_RECORDS`]
/// measurements are stored in total.
#[allow(clippy::float_cmp)]
pub fn compute_series(records: &[Measurement]) -> Result<Vec<SeriesPoint>> {
    ensure_enough(records)?;

    let mut points = Vec::with_capacity(records.len());
    for (subject, mut group) in group_by_subject(records) {
        group.sort_by(|a, b| chronological(a, b));
        for pair in group.windows(2) {
            let (prev, curr) = (pair[0], pair[1]);
            let percent_change = if prev.value == 0.0 {
                0.0
            } else {
                (curr.value - prev.value) / prev.value * 100.0
            };
            points.push(SeriesPoint {
                subject: subject.to_string(),
                recorded_at: curr.recorded_at,
                percent_change,
            });
        }
    }

    Ok(points)
}

/// Split a point list into consecutive runs sharing a subject.
#[must_use]
pub fn series_by_subject(points: &[SeriesPoint]) -> Vec<(&str, &[SeriesPoint])> {
    let mut runs = Vec::new();
    let mut start = 0;
    for i in 1..=points.len() {
        if i == points.len() || points[i].subject != points[start].subject {
            runs.push((points[start].subject.as_str(), &points[start..i]));
            start = i;
        }
    }
    runs
}

/// Render an elapsed duration as `"31 days, 0:00:00"`.
///
/// Negative durations borrow a whole day, so the clock part stays positive:
/// minus one second renders as `"-1 day, 23:59:59"`.
#[must_use]
pub fn format_elapsed(elapsed: TimeDelta) -> String {
    let total = elapsed.num_seconds();
    let days = total.div_euclid(86_400);
    let rest = total.rem_euclid(86_400);
    let clock = format!("{}:{:02}:{:02}", rest / 3_600, rest % 3_600 / 60, rest % 60);

    match days {
        0 => clock,
        1 | -1 => format!("{days} day, {clock}"),
        _ => format!("{days} days, {clock}"),
    }
}

fn ensure_enough(records: &[Measurement]) -> Result<()> {
    if records.len() < MIN_RECORDS {
        return Err(Error::InsufficientData {
            records: records.len(),
        });
    }
    Ok(())
}

/// Group by exact subject, keeping store order within and across groups.
fn group_by_subject(records: &[Measurement]) -> Vec<(&str, Vec<&Measurement>)> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<(&str, Vec<&Measurement>)> = Vec::new();
    for record in records {
        let subject = record.subject.as_str();
        let slot = *index.entry(subject).or_insert_with(|| {
            groups.push((subject, Vec::new()));
            groups.len() - 1
        });
        groups[slot].1.push(record);
    }
    groups
}

fn chronological(a: &Measurement, b: &Measurement) -> Ordering {
    a.recorded_at
        .cmp(&b.recorded_at)
        .then_with(|| a.value.total_cmp(&b.value))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurement::parse_timestamp;

    fn m(subject: &str, value: f64, at: &str) -> Measurement {
        Measurement::at(subject, value, parse_timestamp(at).unwrap())
    }

    #[test]
    fn test_sam_example() {
        let records = vec![
            m("Sam", 180.0, "2024-01-01 00:00:00"),
            m("Sam", 170.0, "2024-02-01 00:00:00"),
        ];
        let report = compute_change(&records, OrderPolicy::Chronological).unwrap();
        let sam = report.get("Sam").unwrap();

        assert_eq!(sam.percent_change.to_string(), "-5.56%");
        assert_eq!(sam.percent_change.rounded(), Some(-5.56));
        assert_eq!(format_timestamp(&sam.earliest), "2024-01-01 00:00:00");
        assert_eq!(format_timestamp(&sam.latest), "2024-02-01 00:00:00");
        assert_eq!(sam.elapsed(), TimeDelta::days(31));
        assert_eq!(format_elapsed(sam.elapsed()), "31 days, 0:00:00");
    }

    #[test]
    fn test_zero_first_value_is_sentinel() {
        let records = vec![
            m("Sam", 0.0, "2024-01-01 00:00:00"),
            m("Sam", 50.0, "2024-01-02 00:00:00"),
        ];
        let report = compute_change(&records, OrderPolicy::Chronological).unwrap();
        let sam = report.get("Sam").unwrap();

        assert_eq!(sam.percent_change, PercentChange::DivisionByZero);
        assert_eq!(sam.percent_change.to_string(), DIVISION_BY_ZERO_SENTINEL);
    }

    #[test]
    fn test_single_record_subject_is_absent() {
        let records = vec![
            m("Sam", 180.0, "2024-01-01 00:00:00"),
            m("Sam", 175.0, "2024-01-05 00:00:00"),
            m("Alex", 150.0, "2024-01-02 00:00:00"),
        ];
        let report = compute_change(&records, OrderPolicy::Chronological).unwrap();

        assert_eq!(report.len(), 1);
        assert!(report.get("Alex").is_none());
    }

    #[test]
    fn test_all_single_records_gives_empty_report() {
        let records = vec![
            m("Sam", 180.0, "2024-01-01 00:00:00"),
            m("Alex", 150.0, "2024-01-02 00:00:00"),
        ];
        let report = compute_change(&records, OrderPolicy::Chronological).unwrap();
        assert!(report.is_empty());
    }

    #[test]
    fn test_insufficient_data() {
        let err = compute_change(&[], OrderPolicy::Chronological).unwrap_err();
        assert!(err.is_insufficient_data());

        let one = vec![m("Sam", 180.0, "2024-01-01 00:00:00")];
        assert!(compute_change(&one, OrderPolicy::StoreOrder)
            .unwrap_err()
            .is_insufficient_data());
        assert!(compute_series(&one).unwrap_err().is_insufficient_data());
        assert!(compute_series(&[]).unwrap_err().is_insufficient_data());
    }

    #[test]
    fn test_report_sorted_with_undefined_last() {
        let records = vec![
            m("Zero", 0.0, "2024-01-01 00:00:00"),
            m("Gain", 100.0, "2024-01-01 00:00:00"),
            m("Loss", 200.0, "2024-01-01 00:00:00"),
            m("Flat", 80.0, "2024-01-01 00:00:00"),
            m("Zero", 10.0, "2024-01-02 00:00:00"),
            m("Gain", 110.0, "2024-01-02 00:00:00"),
            m("Loss", 150.0, "2024-01-02 00:00:00"),
            m("Flat", 80.0, "2024-01-02 00:00:00"),
        ];
        let report = compute_change(&records, OrderPolicy::Chronological).unwrap();
        let order: Vec<&str> = report.iter().map(|s| s.subject.as_str()).collect();

        assert_eq!(order, vec!["Loss", "Flat", "Gain", "Zero"]);
        let defined: Vec<f64> = report
            .iter()
            .filter_map(|s| s.percent_change.rounded())
            .collect();
        assert!(defined.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_percent_change_formula() {
        let records = vec![
            m("Sam", 80.0, "2024-01-01 00:00:00"),
            m("Sam", 90.0, "2024-01-02 00:00:00"),
            m("Sam", 83.0, "2024-01-03 00:00:00"),
        ];
        let report = compute_change(&records, OrderPolicy::Chronological).unwrap();
        let sam = report.get("Sam").unwrap();

        assert_eq!(sam.measurements, 3);
        assert_eq!(sam.percent_change.rounded(), Some(3.75));
        assert_eq!(sam.percent_change.to_string(), "3.75%");
    }

    #[test]
    fn test_subjects_match_exactly() {
        let records = vec![
            m("Sam", 180.0, "2024-01-01 00:00:00"),
            m("sam", 170.0, "2024-01-02 00:00:00"),
            m("Sam ", 160.0, "2024-01-03 00:00:00"),
        ];
        let report = compute_change(&records, OrderPolicy::Chronological).unwrap();
        assert!(report.is_empty());
    }

    #[test]
    fn test_policies_diverge_when_store_order_is_not_chronological() {
        // Re-inserted older measurement ends up last in the store.
        let records = vec![
            m("Sam", 170.0, "2024-02-01 00:00:00"),
            m("Sam", 180.0, "2024-01-01 00:00:00"),
        ];

        let chrono_report = compute_change(&records, OrderPolicy::Chronological).unwrap();
        let sam = chrono_report.get("Sam").unwrap();
        assert_eq!(sam.percent_change.to_string(), "-5.56%");
        assert!(!sam.is_out_of_order());

        let store_report = compute_change(&records, OrderPolicy::StoreOrder).unwrap();
        let sam = store_report.get("Sam").unwrap();
        assert_eq!(sam.percent_change.to_string(), "5.88%");
        assert!(sam.is_out_of_order());
        assert_eq!(sam.elapsed(), TimeDelta::days(-31));
        assert_eq!(format_elapsed(sam.elapsed()), "-31 days, 0:00:00");
        assert_eq!(store_report.policy, OrderPolicy::StoreOrder);
    }

    #[test]
    fn test_series_point_counts_and_order() {
        let records = vec![
            m("Sam", 180.0, "2024-01-03 00:00:00"),
            m("Alex", 150.0, "2024-01-01 00:00:00"),
            m("Sam", 200.0, "2024-01-01 00:00:00"),
            m("Sam", 190.0, "2024-01-02 00:00:00"),
            m("Solo", 70.0, "2024-01-01 00:00:00"),
            m("Alex", 165.0, "2024-01-02 00:00:00"),
        ];
        let points = compute_series(&records).unwrap();

        let sam: Vec<&SeriesPoint> = points.iter().filter(|p| p.subject == "Sam").collect();
        let alex: Vec<&SeriesPoint> = points.iter().filter(|p| p.subject == "Alex").collect();
        assert_eq!(sam.len(), 2);
        assert_eq!(alex.len(), 1);
        assert!(points.iter().all(|p| p.subject != "Solo"));

        assert_eq!(format_timestamp(&sam[0].recorded_at), "2024-01-02 00:00:00");
        assert_eq!(format_timestamp(&sam[1].recorded_at), "2024-01-03 00:00:00");
        assert!((sam[0].percent_change - -5.0).abs() < 1e-9);
        assert!((alex[0].percent_change - 10.0).abs() < 1e-9);

        // Grouped by first appearance in the store.
        assert_eq!(points[0].subject, "Sam");
        assert_eq!(points[2].subject, "Alex");
    }

    #[test]
    fn test_series_zero_previous_contributes_zero() {
        let records = vec![
            m("Sam", 0.0, "2024-01-01 00:00:00"),
            m("Sam", 50.0, "2024-01-02 00:00:00"),
            m("Sam", 100.0, "2024-01-03 00:00:00"),
        ];
        let points = compute_series(&records).unwrap();

        assert_eq!(points.len(), 2);
        assert!(points[0].percent_change.abs() < f64::EPSILON);
        assert!((points[1].percent_change - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_series_by_subject() {
        let records = vec![
            m("Sam", 100.0, "2024-01-01 00:00:00"),
            m("Sam", 110.0, "2024-01-02 00:00:00"),
            m("Sam", 121.0, "2024-01-03 00:00:00"),
            m("Alex", 50.0, "2024-01-01 00:00:00"),
            m("Alex", 40.0, "2024-01-02 00:00:00"),
        ];
        let points = compute_series(&records).unwrap();
        let runs = series_by_subject(&points);

        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].0, "Sam");
        assert_eq!(runs[0].1.len(), 2);
        assert_eq!(runs[1].0, "Alex");
        assert_eq!(runs[1].1.len(), 1);
        assert!(series_by_subject(&[]).is_empty());
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(TimeDelta::seconds(59)), "0:00:59");
        assert_eq!(format_elapsed(TimeDelta::hours(25)), "1 day, 1:00:00");
        assert_eq!(
            format_elapsed(TimeDelta::days(2) + TimeDelta::minutes(5)),
            "2 days, 0:05:00"
        );
    }

    #[test]
    fn test_format_elapsed_negative_borrows_a_day() {
        assert_eq!(format_elapsed(TimeDelta::seconds(-1)), "-1 day, 23:59:59");
        assert_eq!(
            format_elapsed(-(TimeDelta::days(1) + TimeDelta::hours(2))),
            "-2 days, 22:00:00"
        );
        assert_eq!(format_elapsed(TimeDelta::days(-31)), "-31 days, 0:00:00");
    }

    #[test]
    fn test_order_policy_display_and_default() {
        assert_eq!(OrderPolicy::default(), OrderPolicy::Chronological);
        assert_eq!(OrderPolicy::StoreOrder.to_string(), "store_order");
    }

    #[test]
    fn test_report_serializes() {
        let records = vec![
            m("Sam", 0.0, "2024-01-01 00:00:00"),
            m("Sam", 50.0, "2024-01-02 00:00:00"),
        ];
        let report = compute_change(&records, OrderPolicy::Chronological).unwrap();
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("division_by_zero"));
        assert!(json.contains("chronological"));
    }
}
