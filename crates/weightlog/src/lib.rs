//! `weightlog` - Track named weight measurements and how they change
//!
//! Measurements are stored in a [`RecordStore`] (a CSV file by default),
//! summarized per subject by [`compute_change`] and [`compute_series`], and
//! exposed through the `wlog` CLI and a small web front end.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod aggregate;
pub mod chart;
pub mod cli;
pub mod client_info;
pub mod config;
pub mod error;
pub mod logging;
pub mod measurement;
pub mod server;
pub mod storage;

pub use aggregate::{
    compute_change, compute_series, ChangeReport, ChangeSummary, OrderPolicy, PercentChange,
    SeriesPoint,
};
pub use config::Config;
pub use error::{Error, Result};
pub use logging::init_logging;
pub use measurement::Measurement;
pub use storage::{open_store, RecordStore, StoreStats};
