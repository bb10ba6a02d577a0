//! Static series extractor binary
//!
//! Runs the control-plane inventory queries and publishes one data point
//! per row. Runs a single sweep and exits unless `--interval` is given.

use osreport::config::{ComponentFactory, DatabaseConfig, ExtractorConfig, InfluxConfig};
use osreport::extractor::{StaticSeriesExtractor, SweepPolicy};
use osreport::series::{DataPointAssembler, SeriesRegistry};
use osreport::telemetry::Telemetry;
use osreport::Error;

use chrono::{DateTime, Utc};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

/// Publish OpenStack inventory series to InfluxDB
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Control-plane database host
    #[arg(long, env = "OSREPORT_DB_HOST", default_value = "localhost")]
    db_host: String,

    /// Control-plane database port
    #[arg(long, env = "OSREPORT_DB_PORT", default_value = "3306")]
    db_port: u16,

    /// Control-plane database user
    #[arg(long, env = "OSREPORT_DB_USER", default_value = "")]
    db_user: String,

    /// Control-plane database password
    #[arg(long, env = "OSREPORT_DB_PASSWORD", default_value = "", hide_env_values = true)]
    db_password: String,

    /// Default schema for the session
    #[arg(long, env = "OSREPORT_DB_NAME", default_value = "nova")]
    db_name: String,

    /// InfluxDB base URL
    #[arg(long, env = "INFLUX_URL", default_value = "http://localhost:8086")]
    influx_url: String,

    /// InfluxDB database
    #[arg(long, env = "INFLUX_DATABASE", default_value = "reporting")]
    influx_database: String,

    /// InfluxDB user
    #[arg(long, env = "INFLUX_USERNAME")]
    influx_username: Option<String>,

    /// InfluxDB password
    #[arg(long, env = "INFLUX_PASSWORD", hide_env_values = true)]
    influx_password: Option<String>,

    /// Series to extract (repeatable or comma separated); all when omitted
    #[arg(long, value_delimiter = ',')]
    series: Vec<String>,

    /// Print the known series names and exit
    #[arg(long)]
    list_series: bool,

    /// Maximum points per InfluxDB write
    #[arg(long, default_value = "1000")]
    batch_size: usize,

    /// What to do when a series fails: skip-failed or fail-fast
    #[arg(long, default_value = "skip-failed")]
    policy: SweepPolicy,

    /// Value for a tag whose column is supplied externally, as tag=value
    #[arg(long = "external-tag", value_parser = parse_key_value)]
    external_tags: Vec<(String, String)>,

    /// Explicit RFC 3339 timestamp for every point (backfill)
    #[arg(long, value_parser = parse_timestamp)]
    time: Option<DateTime<Utc>>,

    /// Sweep repeatedly at this interval (e.g. "1h") instead of once
    #[arg(long)]
    interval: Option<humantime::Duration>,

    /// Print points as JSON lines instead of writing to InfluxDB (single run only)
    #[arg(long, conflicts_with = "interval")]
    dry_run: bool,

    /// Log level
    #[arg(long, env = "OSREPORT_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected tag=value, got '{raw}'")),
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("invalid RFC 3339 timestamp '{raw}': {e}"))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let registry = Arc::new(SeriesRegistry::openstack_defaults());
    if args.list_series {
        for definition in registry.iter() {
            println!("{}\t{}", definition.name, definition.database);
        }
        return Ok(());
    }

    let _telemetry = Telemetry::init_for_component("osreport-static", &args.log_level)?;
    info!("Starting static series extractor");

    let config = ExtractorConfig {
        batch_size: args.batch_size,
        policy: args.policy,
        series: args.series.clone(),
        interval: args
            .interval
            .map(Into::into)
            .unwrap_or(ExtractorConfig::default().interval),
    };
    config.validate()?;
    // Fail on unknown series names before touching the database
    registry.select(&config.series)?;

    let source = ComponentFactory::create_row_source(&DatabaseConfig {
        host: args.db_host.clone(),
        port: args.db_port,
        user: args.db_user.clone(),
        password: args.db_password.clone(),
        database: args.db_name.clone(),
    })?;
    let (sink, dry_run_sink) = ComponentFactory::create_sink(
        &InfluxConfig {
            url: args.influx_url.clone(),
            database: args.influx_database.clone(),
            username: args.influx_username.clone(),
            password: args.influx_password.clone(),
            ..Default::default()
        },
        args.dry_run,
    )?;

    let mut assembler = DataPointAssembler::new().with_time(args.time);
    for (tag, value) in &args.external_tags {
        assembler = assembler.with_external_tag(tag.clone(), value.clone());
    }

    let extractor = StaticSeriesExtractor::new(config.clone(), registry, source.clone(), sink)
        .with_assembler(assembler);

    let outcome = if args.interval.is_some() {
        info!(interval = ?config.interval, "Running in loop mode");
        let shutdown = extractor.shutdown_token();
        tokio::select! {
            _ = extractor.run() => {},
            _ = shutdown_signal() => shutdown.cancel(),
        }
        info!("Extractor shutting down");
        Ok(())
    } else {
        match extractor.run_sweep().await {
            Ok(report) if report.is_success() => Ok(()),
            Ok(report) => {
                let failed: Vec<&str> = report.failed().collect();
                Err(Error::Internal(format!("every series failed: {}", failed.join(", "))))
            }
            Err(e) => Err(e),
        }
    };

    if let Some(memory) = dry_run_sink {
        for point in memory.points() {
            println!("{}", serde_json::to_string(&point)?);
        }
    }

    if let Err(e) = source.close().await {
        warn!(error = %e, "Failed to close row source");
    }
    if let Err(e) = &outcome {
        error!(error = %e, "Static series extraction failed");
    }
    outcome?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
