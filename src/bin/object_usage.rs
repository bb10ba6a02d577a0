//! Object storage usage poller binary
//!
//! Lists tenants from Keystone, asks the Swift account servers for each
//! tenant's usage and publishes one point per tenant. Polls once and exits
//! unless `--interval` is given.

use osreport::config::{ComponentFactory, IdentityConfig, InfluxConfig, PollerConfig, RingConfig};
use osreport::identity::{StaticTenantSource, TenantSource};
use osreport::telemetry::Telemetry;
use osreport::usage::{ReportPublishMode, UsagePoller};

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};

/// Publish per-tenant object storage usage to InfluxDB
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Keystone v2.0 endpoint
    #[arg(long, env = "OS_AUTH_URL", default_value = "")]
    os_auth_url: String,

    /// Keystone user
    #[arg(long, env = "OS_USERNAME", default_value = "")]
    os_username: String,

    /// Keystone password
    #[arg(long, env = "OS_PASSWORD", default_value = "", hide_env_values = true)]
    os_password: String,

    /// Tenant to scope the Keystone token to
    #[arg(long, env = "OS_TENANT_NAME", default_value = "")]
    os_tenant_name: String,

    /// Poll only these tenants instead of asking Keystone (comma separated)
    #[arg(long, value_delimiter = ',')]
    tenants: Vec<String>,

    /// Compressed account ring
    #[arg(long, env = "SWIFT_ACCOUNT_RING", default_value = "/etc/swift/account.ring.gz")]
    ring: PathBuf,

    /// swift.conf holding the [swift-hash] settings
    #[arg(long, env = "SWIFT_CONF", default_value = "/etc/swift/swift.conf")]
    swift_conf: PathBuf,

    /// Hash path prefix; overrides swift.conf
    #[arg(long, env = "SWIFT_HASH_PATH_PREFIX", hide_env_values = true)]
    hash_prefix: Option<String>,

    /// Hash path suffix; overrides swift.conf
    #[arg(long, env = "SWIFT_HASH_PATH_SUFFIX", hide_env_values = true)]
    hash_suffix: Option<String>,

    /// Account name prefix
    #[arg(long, default_value = "AUTH_")]
    reseller_prefix: String,

    /// Tenants probed concurrently
    #[arg(long, default_value = "32")]
    concurrency: usize,

    /// Timeout for a single replica request
    #[arg(long, default_value = "5s")]
    probe_timeout: humantime::Duration,

    /// Bound on a whole poll cycle; unfinished tenants are reported as timed out
    #[arg(long)]
    cycle_deadline: Option<humantime::Duration>,

    /// How the report is written: chunked or single-write
    #[arg(long, default_value = "chunked")]
    publish_mode: ReportPublishMode,

    /// Maximum points per InfluxDB write in chunked mode
    #[arg(long, default_value = "1000")]
    batch_size: usize,

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

    /// Poll repeatedly at this interval (e.g. "1h") instead of once
    #[arg(long)]
    interval: Option<humantime::Duration>,

    /// Print points as JSON lines instead of writing to InfluxDB (single run only)
    #[arg(long, conflicts_with = "interval")]
    dry_run: bool,

    /// Log level
    #[arg(long, env = "OSREPORT_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let _telemetry = Telemetry::init_for_component("osreport-object-usage", &args.log_level)?;
    info!("Starting object usage poller");

    let config = PollerConfig {
        concurrency: args.concurrency,
        probe_timeout: args.probe_timeout.into(),
        cycle_deadline: args.cycle_deadline.map(Into::into),
        reseller_prefix: args.reseller_prefix.clone(),
        batch_size: args.batch_size,
        publish_mode: args.publish_mode,
        interval: args
            .interval
            .map(Into::into)
            .unwrap_or(PollerConfig::default().interval),
    };
    config.validate()?;

    let tenants: Arc<dyn TenantSource> = if args.tenants.is_empty() {
        ComponentFactory::create_tenant_source(&IdentityConfig {
            auth_url: args.os_auth_url.clone(),
            username: args.os_username.clone(),
            password: args.os_password.clone(),
            tenant_name: args.os_tenant_name.clone(),
            timeout: Duration::from_secs(30),
        })?
    } else {
        info!(tenants = args.tenants.len(), "Polling an explicit tenant list");
        Arc::new(StaticTenantSource::new(args.tenants.clone()))
    };

    let ring = ComponentFactory::create_ring(&RingConfig {
        ring_path: args.ring.clone(),
        swift_conf: Some(args.swift_conf.clone()),
        hash_prefix: args.hash_prefix.clone(),
        hash_suffix: args.hash_suffix.clone(),
    })?;
    let probe = ComponentFactory::create_probe(&config)?;
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

    let poller = UsagePoller::new(config.clone(), tenants, ring, probe, sink);

    let outcome = if args.interval.is_some() {
        info!(interval = ?config.interval, "Running in loop mode");
        let shutdown = poller.shutdown_token();
        tokio::select! {
            _ = poller.run() => {},
            _ = shutdown_signal() => shutdown.cancel(),
        }
        info!("Usage poller shutting down");
        Ok(())
    } else {
        poller.poll_cycle().await.map(|summary| {
            if summary.is_degraded() {
                warn!(
                    failed = summary.failed,
                    timed_out = summary.timed_out,
                    "Report is missing tenants"
                );
            }
        })
    };

    if let Some(memory) = dry_run_sink {
        for point in memory.points() {
            println!("{}", serde_json::to_string(&point)?);
        }
    }

    if let Err(e) = &outcome {
        error!(error = %e, "Object usage poll failed");
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dry_run_is_single_run_only() {
        let err = Args::try_parse_from(["osreport-object-usage", "--dry-run", "--interval", "1h"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);

        let args = Args::try_parse_from(["osreport-object-usage", "--dry-run"]).unwrap();
        assert!(args.dry_run);
        assert!(args.interval.is_none());
    }
}
