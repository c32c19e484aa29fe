//! HTML pages served by the web front end.
//!
//! Every user-supplied string goes through `html_escape` before it is
//! interpolated.

use html_escape::{encode_double_quoted_attribute as attr, encode_text as text};

use crate::aggregate::{format_elapsed, ChangeReport};
use crate::client_info::ClientReport;
use crate::measurement::{format_timestamp, Measurement};

/// Message shown when fewer than two measurements are stored.
pub const NOT_ENOUGH_FOR_CHANGE: &str = "Not enough data to calculate percentage change.";

/// Message shown when no chart can be drawn.
pub const NOT_ENOUGH_FOR_PLOT: &str = "Not enough data to create plot.";

const STYLE: &str = "body{font-family:sans-serif;margin:2em;}\
table{border-collapse:collapse;}\
td,th{border:1px solid #ccc;padding:4px 8px;text-align:left;}\
nav a{margin-right:1em;}\
form.inline{display:inline;margin:0;}";

fn layout(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>{title}</title>\n<style>{STYLE}</style>\n</head>\n<body>\n\
         <nav><a href=\"/\">Add</a><a href=\"/entries\">Entries</a>\
         <a href=\"/percentage_change\">Change</a><a href=\"/plot\">Plot</a>\
         <a href=\"/user_info\">Client info</a></nav>\n\
         <h1>{title}</h1>\n{body}\n</body>\n</html>\n",
        title = text(title),
    )
}

/// Submission form.
#[must_use]
pub fn index() -> String {
    layout(
        "Weight log",
        "<form method=\"post\" action=\"/\">\n\
         <label>Name <input type=\"text\" name=\"name\" required></label>\n\
         <label>Weight <input type=\"text\" name=\"weight\" required></label>\n\
         <button type=\"submit\">Submit</button>\n</form>",
    )
}

/// Confirmation after a measurement was stored.
#[must_use]
pub fn submitted(record: &Measurement) -> String {
    layout(
        "Entry recorded",
        &format!(
            "<p>Name: {}</p>\n<p>Weight: {}</p>\n<p>Timestamp: {}</p>\n\
             <p><a href=\"/\">Add another</a></p>",
            text(&record.subject),
            text(&record.value_text()),
            text(&record.timestamp()),
        ),
    )
}

/// All records in store order, each with a delete button.
#[must_use]
pub fn entries(records: &[Measurement]) -> String {
    if records.is_empty() {
        return layout("Entries", "<p>No entries recorded yet.</p>");
    }

    let mut rows = String::new();
    for record in records {
        let subject = record.subject.as_str();
        let value = record.value_text();
        let timestamp = record.timestamp();
        rows.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>\
             <form class=\"inline\" method=\"post\" action=\"/delete_entry\">\
             <input type=\"hidden\" name=\"name\" value=\"{}\">\
             <input type=\"hidden\" name=\"weight\" value=\"{}\">\
             <input type=\"hidden\" name=\"timestamp\" value=\"{}\">\
             <button type=\"submit\">Delete</button></form></td></tr>\n",
            text(subject),
            text(&value),
            text(&timestamp),
            attr(subject),
            attr(&value),
            attr(&timestamp),
        ));
    }

    layout(
        "Entries",
        &format!(
            "<table>\n<tr><th>Name</th><th>Weight</th><th>Timestamp</th><th></th></tr>\n\
             {rows}</table>"
        ),
    )
}

/// Confirmation after a delete request.
#[must_use]
pub fn deleted(record: &Measurement, removed: bool) -> String {
    let outcome = if removed {
        "Entry deleted"
    } else {
        "No matching entry found"
    };
    layout(
        outcome,
        &format!(
            "<p>{}</p>\n<p><a href=\"/entries\">Back to entries</a></p>",
            text(&record.to_string()),
        ),
    )
}

/// Per-subject change summary table.
#[must_use]
pub fn change_report(report: &ChangeReport) -> String {
    if report.is_empty() {
        return message("Percentage change", "No subject has two or more measurements.");
    }

    let mut rows = String::new();
    for summary in report {
        let flag = if summary.is_out_of_order() {
            " (latest precedes earliest)"
        } else {
            ""
        };
        rows.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}{flag}</td></tr>\n",
            text(&summary.subject),
            text(&summary.percent_change.to_string()),
            format_timestamp(&summary.earliest),
            format_timestamp(&summary.latest),
            format_elapsed(summary.elapsed()),
        ));
    }

    layout(
        "Percentage change",
        &format!(
            "<table>\n<tr><th>Name</th><th>Change</th><th>Earliest</th>\
             <th>Latest</th><th>Elapsed</th></tr>\n{rows}</table>"
        ),
    )
}

/// Chart page; `src` is a data URI or a static URL.
#[must_use]
pub fn plot(src: &str) -> String {
    layout(
        "Percent change over time",
        &format!(
            "<img src=\"{}\" alt=\"Percent change between measurements\">",
            attr(src)
        ),
    )
}

/// Client metadata page.
#[must_use]
pub fn user_info(report: &ClientReport) -> String {
    let a = &report.agent;
    let rows = [
        ("IP address", report.ip.clone()),
        ("Location", report.location.to_string()),
        ("Browser", format!("{} {}", a.browser, a.browser_version)),
        ("Operating system", format!("{} {}", a.os, a.os_version)),
        ("Device", a.device.clone()),
        ("Vendor", a.vendor.clone()),
    ]
    .iter()
    .map(|(label, value)| format!("<tr><th>{label}</th><td>{}</td></tr>\n", text(value)))
    .collect::<String>();

    layout("Client info", &format!("<table>\n{rows}</table>"))
}

/// A page with a title and a single paragraph.
#[must_use]
pub fn message(title: &str, body: &str) -> String {
    layout(title, &format!("<p>{}</p>", text(body)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{compute_change, OrderPolicy};
    use crate::measurement::parse_timestamp;

    fn m(subject: &str, value: f64, at: &str) -> Measurement {
        Measurement::at(subject, value, parse_timestamp(at).unwrap())
    }

    #[test]
    fn test_entries_escape_subject() {
        let html = entries(&[m("<b>Sam</b>", 180.0, "2024-01-01 00:00:00")]);
        assert!(html.contains("&lt;b&gt;Sam&lt;/b&gt;"));
        assert!(!html.contains("<b>Sam</b>"));
    }

    #[test]
    fn test_entries_include_delete_form_fields() {
        let html = entries(&[m("Sam", 180.0, "2024-01-01 00:00:00")]);
        assert!(html.contains("action=\"/delete_entry\""));
        assert!(html.contains("name=\"weight\" value=\"180.0\""));
        assert!(html.contains("name=\"timestamp\" value=\"2024-01-01 00:00:00\""));
    }

    #[test]
    fn test_entries_empty() {
        assert!(entries(&[]).contains("No entries recorded yet."));
    }

    #[test]
    fn test_change_report_rows() {
        let report = compute_change(
            &[
                m("Sam", 180.0, "2024-01-01 00:00:00"),
                m("Sam", 170.0, "2024-02-01 00:00:00"),
            ],
            OrderPolicy::Chronological,
        )
        .unwrap();
        let html = change_report(&report);
        assert!(html.contains("-5.56%"));
        assert!(html.contains("31 days, 0:00:00"));
    }

    #[test]
    fn test_change_report_flags_out_of_order() {
        let report = compute_change(
            &[
                m("Sam", 180.0, "2024-02-01 00:00:00"),
                m("Sam", 170.0, "2024-01-01 00:00:00"),
            ],
            OrderPolicy::StoreOrder,
        )
        .unwrap();
        assert!(change_report(&report).contains("(latest precedes earliest)"));
    }

    #[test]
    fn test_plot_embeds_source() {
        let html = plot("data:image/svg+xml;base64,PHN2Zy8+");
        assert!(html.contains("src=\"data:image/svg+xml;base64,PHN2Zy8+\""));
    }

    #[test]
    fn test_deleted_outcome() {
        let record = m("Sam", 180.0, "2024-01-01 00:00:00");
        assert!(deleted(&record, true).contains("Entry deleted"));
        assert!(deleted(&record, false).contains("No matching entry found"));
    }
}
