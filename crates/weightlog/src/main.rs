//! `wlog` - CLI for weightlog
//!
//! This binary records and reports weight measurements and runs the web
//! front end.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use anyhow::Context;
use clap::Parser;

use weightlog::aggregate::{format_elapsed, series_by_subject};
use weightlog::cli::{
    AddCommand, ChangeCommand, Cli, Command, ConfigCommand, DeleteCommand, ListCommand,
    PlotCommand,
};
use weightlog::measurement::{format_timestamp, parse_value, validate_subject};
use weightlog::server::{self, AppState};
use weightlog::{
    chart, compute_change, compute_series, init_logging, open_store, Config, Measurement,
    StoreStats,
};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    // `config validate` reports errors instead of failing on them
    if let Command::Config(config_cmd) = &cli.command {
        return handle_config(cli.config.clone(), config_cmd);
    }

    let config = Config::load_from(cli.config.clone()).context("failed to load configuration")?;

    match cli.command {
        Command::Serve(cmd) => handle_serve(config, cmd.bind),
        Command::Add(cmd) => handle_add(&config, &cmd),
        Command::Delete(cmd) => handle_delete(&config, &cmd),
        Command::List(cmd) => handle_list(&config, &cmd),
        Command::Change(cmd) => handle_change(&config, &cmd),
        Command::Series(cmd) => handle_series(&config, cmd.json),
        Command::Plot(cmd) => handle_plot(&config, &cmd),
        Command::Status(cmd) => handle_status(&config, cmd.json),
        Command::Config(_) => Ok(()),
    }
}

fn handle_serve(mut config: Config, bind: Option<String>) -> anyhow::Result<()> {
    if let Some(bind) = bind {
        config.server.bind_address = bind;
    }
    let addr = config.bind_address()?;
    let state = AppState::from_config(config)?;

    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    runtime.block_on(server::serve(state, addr))?;
    Ok(())
}

fn handle_add(config: &Config, cmd: &AddCommand) -> anyhow::Result<()> {
    let subject = validate_subject(&cmd.name)?;
    let value = parse_value(&cmd.weight)?;
    let record = Measurement::new(subject, value);

    open_store(config)?.append(&record)?;
    println!("Recorded {record}");
    Ok(())
}

fn handle_delete(config: &Config, cmd: &DeleteCommand) -> anyhow::Result<()> {
    let record = Measurement::from_input(&cmd.name, &cmd.weight, &cmd.timestamp)?;

    if open_store(config)?.delete_exact(&record)? {
        println!("Deleted {record}");
    } else {
        println!("No entry matched {record}");
    }
    Ok(())
}

fn handle_list(config: &Config, cmd: &ListCommand) -> anyhow::Result<()> {
    let records: Vec<Measurement> = open_store(config)?
        .read_all()?
        .into_iter()
        .filter(|r| cmd.subject.as_ref().is_none_or(|s| &r.subject == s))
        .collect();

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No entries.");
        return Ok(());
    }
    println!("{:<20} {:>10}  Timestamp", "Name", "Weight");
    for record in &records {
        println!(
            "{:<20} {:>10}  {}",
            record.subject,
            record.value_text(),
            record.timestamp()
        );
    }
    Ok(())
}

fn handle_change(config: &Config, cmd: &ChangeCommand) -> anyhow::Result<()> {
    let policy = cmd.order.map_or(config.aggregation.order, Into::into);
    let records = open_store(config)?.read_all()?;

    let report = match compute_change(&records, policy) {
        Ok(report) => report,
        Err(e) if e.is_insufficient_data() => {
            println!("Not enough data to calculate percentage change.");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Percentage change ({policy})");
    println!(
        "{:<20} {:>28}  {:<19}  {:<19}  Elapsed",
        "Name", "Change", "Earliest", "Latest"
    );
    for summary in &report {
        let flag = if summary.is_out_of_order() {
            " (latest precedes earliest)"
        } else {
            ""
        };
        println!(
            "{:<20} {:>28}  {:<19}  {:<19}  {}{flag}",
            summary.subject,
            summary.percent_change.to_string(),
            format_timestamp(&summary.earliest),
            format_timestamp(&summary.latest),
            format_elapsed(summary.elapsed()),
        );
    }
    Ok(())
}

fn handle_series(config: &Config, json: bool) -> anyhow::Result<()> {
    let records = open_store(config)?.read_all()?;
    let points = match compute_series(&records) {
        Ok(points) => points,
        Err(e) if e.is_insufficient_data() => {
            println!("Not enough data to calculate percentage change.");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&points)?);
        return Ok(());
    }

    for (subject, run) in series_by_subject(&points) {
        println!("{subject}");
        for point in run {
            println!(
                "  {}  {:>8.2}%",
                format_timestamp(&point.recorded_at),
                point.percent_change
            );
        }
    }
    Ok(())
}

fn handle_plot(config: &Config, cmd: &PlotCommand) -> anyhow::Result<()> {
    let records = open_store(config)?.read_all()?;
    let svg = match compute_series(&records)
        .and_then(|points| chart::render_svg(&points, config.chart.width, config.chart.height))
    {
        Ok(svg) => svg,
        Err(e) if e.is_insufficient_data() => {
            println!("Not enough data to create plot.");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    std::fs::write(&cmd.output, svg)
        .with_context(|| format!("failed to write {}", cmd.output.display()))?;
    println!("Wrote chart to {}", cmd.output.display());
    Ok(())
}

fn handle_status(config: &Config, json: bool) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let stats = StoreStats::collect(store.as_ref())?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("wlog status");
    println!("-----------");
    println!("Backend:       {}", stats.backend);
    println!("Location:      {}", stats.location.display());
    println!("Entries:       {}", stats.total_records);
    println!("Names:         {}", stats.subjects);
    println!("Size:          {} bytes", stats.size_bytes);
    if let (Some(oldest), Some(newest)) = (stats.oldest, stats.newest) {
        println!("Oldest entry:  {}", format_timestamp(&oldest));
        println!("Newest entry:  {}", format_timestamp(&newest));
    }
    Ok(())
}

fn handle_config(
    config_path: Option<std::path::PathBuf>,
    cmd: &ConfigCommand,
) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            let config = Config::load_from(config_path)?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                print_config(&config);
            }
        }
        ConfigCommand::Path => {
            let path = config_path.unwrap_or_else(Config::default_config_path);
            println!("{}", path.display());
        }
        ConfigCommand::Validate { file } => {
            let path = file
                .clone()
                .or(config_path)
                .unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}

fn print_config(config: &Config) {
    println!("Current Configuration");
    println!("=====================");
    println!();
    println!("[Server]");
    println!("  Bind address:       {}", config.server.bind_address);
    println!();
    println!("[Storage]");
    println!("  Backend:            {}", config.storage.backend);
    println!("  Data path:          {}", config.data_path().display());
    println!();
    println!("[Aggregation]");
    println!("  Order:              {}", config.aggregation.order);
    println!();
    println!("[Chart]");
    println!(
        "  Size:               {}x{}",
        config.chart.width, config.chart.height
    );
    println!("  Output:             {:?}", config.chart.output);
    println!("  Static dir:         {}", config.static_dir().display());
    println!();
    println!("[Client info]");
    println!(
        "  Geolocation:        {}",
        config.client_info.geolocation_enabled
    );
    println!("  Lookup URL:         {}", config.client_info.lookup_url);
    println!("  Timeout (ms):       {}", config.client_info.timeout_ms);
    println!(
        "  Log path:           {}",
        config.client_log_path().display()
    );
}
