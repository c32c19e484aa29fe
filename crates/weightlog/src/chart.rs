//! Line chart of the consecutive-change series.
//!
//! Each subject gets one colored line with point markers. The x axis is the
//! measurement time and the y axis the percent change from the previous
//! measurement, as produced by [`compute_series`](crate::aggregate::compute_series).

use std::path::PathBuf;

use base64::Engine;
use chrono::{DateTime, NaiveDateTime};
use plotters::prelude::*;
use tracing::debug;

use crate::aggregate::{series_by_subject, SeriesPoint};
use crate::config::{ChartOutput, Config};
use crate::error::{Error, Result};
use crate::measurement::format_timestamp;

/// File name used when the chart is written to the static directory.
pub const CHART_FILE_NAME: &str = "plot.svg";

/// URL prefix the static directory is served under.
pub const STATIC_URL_PREFIX: &str = "/static";

/// Where a rendered chart can be fetched from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChartArtifact {
    /// The SVG embedded as a base64 data URI.
    Inline {
        /// `data:image/svg+xml;base64,...`
        data_uri: String,
    },
    /// The SVG written to disk and served as a static file.
    File {
        /// Where the file was written.
        path: PathBuf,
        /// URL the web server exposes it under.
        url: String,
    },
}

impl ChartArtifact {
    /// Value for an `<img src>` attribute.
    #[must_use]
    pub fn src(&self) -> &str {
        match self {
            Self::Inline { data_uri } => data_uri,
            Self::File { url, .. } => url,
        }
    }
}

/// Render the series as an SVG document.
///
/// # Errors
///
/// Returns [`Error::InsufficientData`] if there are no points, or
/// [`Error::Chart`] if drawing fails.
pub fn render_svg(points: &[SeriesPoint], width: u32, height: u32) -> Result<String> {
    if points.is_empty() {
        return Err(Error::InsufficientData { records: 0 });
    }

    let mut svg = String::new();
    draw(&mut svg, points, width, height)?;
    debug!(
        points = points.len(),
        bytes = svg.len(),
        "rendered percent change chart"
    );
    Ok(svg)
}

/// Make a rendered chart reachable according to `chart.output`.
///
/// # Errors
///
/// Returns an error if the static directory or file cannot be written.
pub fn publish(svg: &str, config: &Config) -> Result<ChartArtifact> {
    match config.chart.output {
        ChartOutput::Inline => {
            let encoded = base64::engine::general_purpose::STANDARD.encode(svg.as_bytes());
            Ok(ChartArtifact::Inline {
                data_uri: format!("data:image/svg+xml;base64,{encoded}"),
            })
        }
        ChartOutput::File => {
            let dir = config.static_dir();
            std::fs::create_dir_all(&dir).map_err(|source| Error::DirectoryCreate {
                path: dir.clone(),
                source,
            })?;
            let path = dir.join(CHART_FILE_NAME);
            std::fs::write(&path, svg)?;
            debug!("wrote chart to {}", path.display());
            Ok(ChartArtifact::File {
                path,
                url: format!("{STATIC_URL_PREFIX}/{CHART_FILE_NAME}"),
            })
        }
    }
}

fn draw(svg: &mut String, points: &[SeriesPoint], width: u32, height: u32) -> Result<()> {
    let root = SVGBackend::with_string(svg, (width, height)).into_drawing_area();
    root.fill(&WHITE).map_err(|e| Error::chart(e.to_string()))?;

    let (x_range, y_range) = bounds(points);
    let mut chart = ChartBuilder::on(&root)
        .caption("Percent change between measurements", ("sans-serif", 20))
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(x_range, y_range)
        .map_err(|e| Error::chart(e.to_string()))?;

    chart
        .configure_mesh()
        .x_labels(5)
        .x_label_formatter(&|x| axis_label(*x))
        .y_label_formatter(&|y| format!("{y:.1}"))
        .x_desc("Timestamp")
        .y_desc("Percent Change")
        .axis_desc_style(("sans-serif", 12))
        .draw()
        .map_err(|e| Error::chart(e.to_string()))?;

    for (idx, (subject, run)) in series_by_subject(points).into_iter().enumerate() {
        let color = Palette99::pick(idx).to_rgba();
        let coords: Vec<(f64, f64)> = run
            .iter()
            .map(|p| (seconds(&p.recorded_at), p.percent_change))
            .collect();

        chart
            .draw_series(LineSeries::new(coords.clone(), color.stroke_width(2)))
            .map_err(|e| Error::chart(e.to_string()))?
            .label(subject)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2)));

        chart
            .draw_series(coords.into_iter().map(|c| Circle::new(c, 4, color.filled())))
            .map_err(|e| Error::chart(e.to_string()))?;
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperRight)
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()
        .map_err(|e| Error::chart(e.to_string()))?;

    root.present().map_err(|e| Error::chart(e.to_string()))?;
    Ok(())
}

/// Axis ranges with padding, never empty.
fn bounds(points: &[SeriesPoint]) -> (std::ops::Range<f64>, std::ops::Range<f64>) {
    let (mut x_min, mut x_max) = (f64::INFINITY, f64::NEG_INFINITY);
    let (mut y_min, mut y_max) = (f64::INFINITY, f64::NEG_INFINITY);
    for p in points {
        let x = seconds(&p.recorded_at);
        x_min = x_min.min(x);
        x_max = x_max.max(x);
        if p.percent_change.is_finite() {
            y_min = y_min.min(p.percent_change);
            y_max = y_max.max(p.percent_change);
        }
    }
    if !y_min.is_finite() {
        (y_min, y_max) = (0.0, 0.0);
    }

    let x_pad = ((x_max - x_min) * 0.05).max(3600.0);
    let y_pad = ((y_max - y_min) * 0.1).max(1.0);
    (
        (x_min - x_pad)..(x_max + x_pad),
        (y_min - y_pad)..(y_max + y_pad),
    )
}

#[allow(clippy::cast_precision_loss)]
fn seconds(at: &NaiveDateTime) -> f64 {
    at.and_utc().timestamp() as f64
}

#[allow(clippy::cast_possible_truncation)]
fn axis_label(x: f64) -> String {
    DateTime::from_timestamp(x.round() as i64, 0)
        .map(|dt| format_timestamp(&dt.naive_utc()))
        .unwrap_or_default()
}
