//! Command-line interface for weightlog.
//!
//! This module provides the CLI structure for the `wlog` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    AddCommand, ChangeCommand, ConfigCommand, DeleteCommand, ListCommand, OrderArg, PlotCommand,
    SeriesCommand, ServeCommand, StatusCommand,
};

/// wlog - Track body weight over time
///
/// Records named weight measurements, reports how each person's weight
/// changed, and serves the same views over HTTP.
#[derive(Debug, Parser)]
#[command(name = "wlog")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the web front end
    Serve(ServeCommand),

    /// Record a measurement stamped with the current time
    Add(AddCommand),

    /// Delete the first entry matching name, weight and timestamp
    Delete(DeleteCommand),

    /// List stored entries
    List(ListCommand),

    /// Show each person's change from first to last measurement
    Change(ChangeCommand),

    /// Show the change between consecutive measurements
    Series(SeriesCommand),

    /// Render the consecutive-change chart to an SVG file
    Plot(PlotCommand),

    /// Show store status
    Status(StatusCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        if self.quiet {
            crate::logging::Verbosity::Quiet
        } else {
            match self.verbose {
                0 => crate::logging::Verbosity::Normal,
                1 => crate::logging::Verbosity::Verbose,
                _ => crate::logging::Verbosity::Trace,
            }
        }
    }
}
