//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

use crate::aggregate::OrderPolicy;

/// Serve command arguments.
#[derive(Debug, Args)]
pub struct ServeCommand {
    /// Address to bind, overriding `server.bind_address`
    #[arg(short, long, value_name = "ADDR")]
    pub bind: Option<String>,
}

/// Add command arguments.
#[derive(Debug, Args)]
pub struct AddCommand {
    /// Who the measurement belongs to
    pub name: String,

    /// The weight
    #[arg(allow_hyphen_values = true)]
    pub weight: String,
}

/// Delete command arguments.
#[derive(Debug, Args)]
pub struct DeleteCommand {
    /// Name of the entry to delete
    pub name: String,

    /// Weight of the entry to delete
    #[arg(allow_hyphen_values = true)]
    pub weight: String,

    /// Timestamp of the entry, as `YYYY-MM-DD HH:MM:SS`
    pub timestamp: String,
}

/// List command arguments.
#[derive(Debug, Args)]
pub struct ListCommand {
    /// Only show entries for this name
    #[arg(short, long)]
    pub subject: Option<String>,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Change command arguments.
#[derive(Debug, Args)]
pub struct ChangeCommand {
    /// How first and last measurements are chosen, overriding `aggregation.order`
    #[arg(short, long, value_enum)]
    pub order: Option<OrderArg>,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Series command arguments.
#[derive(Debug, Args)]
pub struct SeriesCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Plot command arguments.
#[derive(Debug, Args)]
pub struct PlotCommand {
    /// Where to write the SVG chart
    #[arg(short, long, value_name = "FILE")]
    pub output: PathBuf,
}

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Ordering policy argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OrderArg {
    /// First and last rows as stored
    Store,
    /// Earliest and latest by timestamp
    Chronological,
}

impl From<OrderArg> for OrderPolicy {
    fn from(arg: OrderArg) -> Self {
        match arg {
            OrderArg::Store => Self::StoreOrder,
            OrderArg::Chronological => Self::Chronological,
        }
    }
}
