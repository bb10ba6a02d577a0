//! Tests for the concurrent usage poll cycle
//!
//! Runs whole cycles against an in-memory ring, a probe that answers per
//! account and a memory sink:
//! - outcome accounting and report omission
//! - single publish per cycle in both publish modes
//! - bounded fan-out
//! - cycle deadline and degraded coverage

use osreport::identity::{StaticTenantSource, TenantSource};
use osreport::ring::{HashPathConfig, Ring, RingDevice, RingLocation, RingLocator};
use osreport::schema::ScalarValue;
use osreport::sink::MemorySink;
use osreport::usage::{
    AccountProbe, PollerConfig, ProbeResponse, ReportPublishMode, UsagePoller, HEADER_BYTES_USED,
    HEADER_CONTAINER_COUNT, HEADER_OBJECT_COUNT, USAGE_MEASUREMENT,
};
use osreport::{Error, Result};

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Behaviour keyed on the tenant id's prefix: `ok*`, `missing*`, `broken*`, `slow*`
#[derive(Default)]
struct TenantProbe {
    accounts: Mutex<Vec<String>>,
    /// Device id of every request, in request order
    devices: Mutex<Vec<u32>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    latency: Duration,
}

impl TenantProbe {
    fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Default::default()
        }
    }
}

#[async_trait]
impl AccountProbe for TenantProbe {
    async fn head(&self, node: &RingDevice, _partition: u32, account: &str) -> Result<ProbeResponse> {
        self.accounts.lock().push(account.to_string());
        self.devices.lock().push(node.id);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let tenant = account.trim_start_matches("AUTH_");
        let response = if tenant.starts_with("ok") {
            Ok(ProbeResponse::new(204)
                .with_header(HEADER_CONTAINER_COUNT, "1")
                .with_header(HEADER_OBJECT_COUNT, "2")
                .with_header(HEADER_BYTES_USED, tenant.len().to_string()))
        } else if tenant.starts_with("missing") {
            Ok(ProbeResponse::new(404))
        } else if tenant.starts_with("slow") {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(ProbeResponse::new(404))
        } else {
            Err(Error::Internal("connection reset".to_string()))
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        response
    }
}

struct FailingTenants;

#[async_trait]
impl TenantSource for FailingTenants {
    async fn list_tenants(&self) -> Result<Vec<String>> {
        Err(Error::SourceUnavailable("keystone is down".to_string()))
    }
}

/// Locates nothing
struct EmptyRing;

impl RingLocator for EmptyRing {
    fn locate(&self, account: &str) -> Result<RingLocation> {
        Err(Error::Ring(format!("no devices for {account}")))
    }
}

/// Single-partition ring with three replicas on three devices
fn ring() -> Arc<dyn RingLocator> {
    let devs = (0..3)
        .map(|id| {
            Some(RingDevice {
                id,
                ip: format!("10.0.0.{}", id + 1),
                port: 6202,
                device: "sdb".to_string(),
                region: Some(1),
                zone: Some(id),
            })
        })
        .collect();
    Arc::new(Ring::new(devs, 32, vec![vec![0], vec![1], vec![2]], HashPathConfig::default()).unwrap())
}

fn tenants(names: &[&str]) -> Arc<dyn TenantSource> {
    Arc::new(StaticTenantSource::new(names.iter().copied()))
}

fn poller(
    config: PollerConfig,
    tenants: Arc<dyn TenantSource>,
    ring: Arc<dyn RingLocator>,
    probe: Arc<TenantProbe>,
    sink: Arc<MemorySink>,
) -> UsagePoller {
    UsagePoller::new(config, tenants, ring, probe, sink)
}

#[tokio::test]
async fn test_cycle_reports_successes_only_and_publishes_once() {
    let probe = Arc::new(TenantProbe::default());
    let sink = Arc::new(MemorySink::new());
    let poller = poller(
        PollerConfig::default(),
        tenants(&["ok-b", "missing-1", "ok-a", "broken-1", "ok-c"]),
        ring(),
        probe.clone(),
        sink.clone(),
    );

    let summary = poller.poll_cycle().await.unwrap();

    assert_eq!(summary.tenants, 5);
    assert_eq!(summary.succeeded, 3);
    assert_eq!(summary.not_found, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.timed_out, 0);
    assert_eq!(summary.published, 3);
    assert!(summary.is_degraded());

    assert_eq!(sink.writes().len(), 1, "report is published in one call");
    let points = sink.points();
    let tenants: Vec<&ScalarValue> = points.iter().map(|p| &p.tags["projectid"]).collect();
    assert_eq!(
        tenants,
        vec![
            &ScalarValue::from("ok-a"),
            &ScalarValue::from("ok-b"),
            &ScalarValue::from("ok-c")
        ]
    );
    assert!(points.iter().all(|p| p.measurement == USAGE_MEASUREMENT));

    // broken tenant tried every replica, missing tenant only one
    let accounts = probe.accounts.lock().clone();
    assert_eq!(accounts.iter().filter(|a| *a == "AUTH_broken-1").count(), 3);
    assert_eq!(accounts.iter().filter(|a| *a == "AUTH_missing-1").count(), 1);
}

#[tokio::test]
async fn test_chunked_and_single_write_modes() {
    let names = ["ok-1", "ok-2", "ok-3", "ok-4", "ok-5"];

    let sink = Arc::new(MemorySink::new());
    let chunked = poller(
        PollerConfig {
            batch_size: 2,
            publish_mode: ReportPublishMode::Chunked,
            ..Default::default()
        },
        tenants(&names),
        ring(),
        Arc::new(TenantProbe::default()),
        sink.clone(),
    );
    chunked.poll_cycle().await.unwrap();
    assert_eq!(sink.writes().len(), 3);

    let sink = Arc::new(MemorySink::new());
    let single = poller(
        PollerConfig {
            batch_size: 2,
            publish_mode: ReportPublishMode::SingleWrite,
            ..Default::default()
        },
        tenants(&names),
        ring(),
        Arc::new(TenantProbe::default()),
        sink.clone(),
    );
    single.poll_cycle().await.unwrap();
    assert_eq!(sink.writes().len(), 1);
    assert_eq!(sink.points().len(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_fan_out_is_bounded_by_concurrency() {
    let names: Vec<String> = (0..40).map(|i| format!("ok-{i}")).collect();
    let probe = Arc::new(TenantProbe::with_latency(Duration::from_millis(20)));
    let sink = Arc::new(MemorySink::new());
    let poller = poller(
        PollerConfig {
            concurrency: 4,
            ..Default::default()
        },
        Arc::new(StaticTenantSource::new(names)),
        ring(),
        probe.clone(),
        sink.clone(),
    );

    let summary = poller.poll_cycle().await.unwrap();

    assert_eq!(summary.succeeded, 40);
    assert_eq!(probe.max_in_flight.load(Ordering::SeqCst), 4);
    assert_eq!(sink.points().len(), 40);
}

#[tokio::test(start_paused = true)]
async fn test_cycle_deadline_publishes_partial_report() {
    let probe = Arc::new(TenantProbe::default());
    let sink = Arc::new(MemorySink::new());
    let poller = poller(
        PollerConfig {
            concurrency: 8,
            probe_timeout: Duration::from_secs(5),
            cycle_deadline: Some(Duration::from_secs(2)),
            ..Default::default()
        },
        tenants(&["ok-1", "slow-1", "ok-2", "slow-2", "missing-1"]),
        ring(),
        probe,
        sink.clone(),
    );

    let summary = poller.poll_cycle().await.unwrap();

    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.not_found, 1);
    assert_eq!(summary.timed_out, 2);
    assert!(summary.is_degraded());
    assert_eq!(sink.writes().len(), 1);
    assert_eq!(sink.points().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_without_deadline_slow_tenants_run_to_all_failed() {
    let sink = Arc::new(MemorySink::new());
    let poller = poller(
        PollerConfig {
            probe_timeout: Duration::from_secs(1),
            ..Default::default()
        },
        tenants(&["slow-1", "ok-1"]),
        ring(),
        Arc::new(TenantProbe::default()),
        sink.clone(),
    );

    let summary = poller.poll_cycle().await.unwrap();

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.timed_out, 0);
    assert_eq!(sink.points().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_deadline_at_worker_completion_keeps_counts_consistent() {
    // Workers finish at the same instant the deadline passes
    let names: Vec<String> = (0..6).map(|i| format!("ok-{i}")).collect();
    let sink = Arc::new(MemorySink::new());
    let poller = poller(
        PollerConfig {
            concurrency: 8,
            cycle_deadline: Some(Duration::from_secs(2)),
            ..Default::default()
        },
        Arc::new(StaticTenantSource::new(names)),
        ring(),
        Arc::new(TenantProbe::with_latency(Duration::from_secs(2))),
        sink.clone(),
    );

    let summary = poller.poll_cycle().await.unwrap();

    assert_eq!(summary.published, summary.succeeded);
    assert_eq!(sink.points().len(), summary.succeeded);
    assert_eq!(
        summary.succeeded + summary.not_found + summary.failed + summary.timed_out,
        summary.tenants
    );
}

#[tokio::test]
async fn test_replica_order_is_shuffled_per_tenant() {
    // Each missing tenant is answered by the first replica asked
    let names: Vec<String> = (0..60).map(|i| format!("missing-{i}")).collect();
    let probe = Arc::new(TenantProbe::default());
    let poller = poller(
        PollerConfig::default(),
        Arc::new(StaticTenantSource::new(names)),
        ring(),
        probe.clone(),
        Arc::new(MemorySink::new()),
    );

    let summary = poller.poll_cycle().await.unwrap();
    assert_eq!(summary.not_found, 60);

    let devices = probe.devices.lock().clone();
    assert_eq!(devices.len(), 60);
    assert!(
        devices.iter().any(|id| *id != 0),
        "every tenant was sent to the ring's first replica"
    );
}

#[tokio::test]
async fn test_tenant_order_is_shuffled() {
    let names: Vec<String> = (0..30).map(|i| format!("missing-{i:02}")).collect();
    let probe = Arc::new(TenantProbe::default());
    let poller = poller(
        PollerConfig {
            concurrency: 1,
            ..Default::default()
        },
        Arc::new(StaticTenantSource::new(names.clone())),
        ring(),
        probe.clone(),
        Arc::new(MemorySink::new()),
    );

    poller.poll_cycle().await.unwrap();

    let probed: Vec<String> = probe
        .accounts
        .lock()
        .iter()
        .map(|account| account.trim_start_matches("AUTH_").to_string())
        .collect();
    let mut sorted = probed.clone();
    sorted.sort();
    assert_eq!(sorted, names, "every tenant is probed exactly once");
    assert_ne!(probed, names, "tenants were probed in listing order");
}

#[tokio::test]
async fn test_tenant_listing_failure_aborts_cycle() {
    let sink = Arc::new(MemorySink::new());
    let poller = poller(
        PollerConfig::default(),
        Arc::new(FailingTenants),
        ring(),
        Arc::new(TenantProbe::default()),
        sink.clone(),
    );

    let err = poller.poll_cycle().await.unwrap_err();

    assert!(err.is_source_unavailable());
    assert_eq!(sink.attempts(), 0);
}

#[tokio::test]
async fn test_unlocatable_accounts_count_as_failed() {
    let probe = Arc::new(TenantProbe::default());
    let sink = Arc::new(MemorySink::new());
    let poller = poller(
        PollerConfig::default(),
        tenants(&["ok-1", "ok-2"]),
        Arc::new(EmptyRing),
        probe.clone(),
        sink.clone(),
    );

    let summary = poller.poll_cycle().await.unwrap();

    assert_eq!(summary.failed, 2);
    assert!(probe.accounts.lock().is_empty());
    assert_eq!(sink.attempts(), 0);
}

#[tokio::test]
async fn test_reseller_prefix_names_accounts() {
    let probe = Arc::new(TenantProbe::default());
    let poller = poller(
        PollerConfig {
            reseller_prefix: "SERVICE_".to_string(),
            ..Default::default()
        },
        tenants(&["ok-1"]),
        ring(),
        probe.clone(),
        Arc::new(MemorySink::new()),
    );

    poller.poll_cycle().await.unwrap();

    // the probe only strips AUTH_, so the tenant is not recognised as ok
    assert_eq!(probe.accounts.lock().first().map(String::as_str), Some("SERVICE_ok-1"));
}

#[tokio::test(start_paused = true)]
async fn test_run_loop_stops_on_cancel() {
    let sink = Arc::new(MemorySink::new());
    let poller = Arc::new(poller(
        PollerConfig {
            interval: Duration::from_secs(60),
            ..Default::default()
        },
        tenants(&["ok-1"]),
        ring(),
        Arc::new(TenantProbe::default()),
        sink.clone(),
    ));

    let shutdown = poller.shutdown_token();
    let handle = tokio::spawn({
        let poller = poller.clone();
        async move { poller.run().await }
    });

    tokio::time::sleep(Duration::from_secs(150)).await;
    shutdown.cancel();
    handle.await.unwrap();

    // ticks at 0s, 60s and 120s
    assert_eq!(sink.writes().len(), 3);
}
