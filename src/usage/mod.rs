//! Object storage usage poller
//!
//! Every cycle lists tenants, locates each tenant's account in the ring and
//! asks the replicas for usage headers. Tenants are handled by a fixed-size
//! pool of workers; replicas within one tenant are asked strictly one after
//! another. A tenant's usage enters the report only when its outcome is
//! counted, so the summary and the published report always agree. The
//! report is published once at the end of the cycle.

mod probe;
mod report;
pub(crate) mod telemetry;

pub use probe::{
    probe_replicas, AccountProbe, HttpAccountProbe, ProbeOutcome, ProbeResponse, ProbeResult,
    HEADER_BYTES_USED, HEADER_CONTAINER_COUNT, HEADER_OBJECT_COUNT, HEADER_QUOTA_BYTES,
};
pub use report::{ReportPublishMode, UsageReport, USAGE_MEASUREMENT};

use crate::identity::TenantSource;
use crate::ring::RingLocator;
use crate::sink::{publish, PointSink, DEFAULT_BATCH_SIZE};
use crate::Result;

use rand::seq::SliceRandom;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Object storage usage for one tenant
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TenantUsage {
    pub tenant_id: String,
    pub container_count: u64,
    pub object_count: u64,
    pub bytes_used: u64,
    /// Absent when the account has no quota configured
    pub quota_bytes: Option<u64>,
}

/// Configuration for the usage poller
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Maximum tenants probed at once
    pub concurrency: usize,
    /// Bound on a single replica request
    pub probe_timeout: Duration,
    /// Bound on a whole cycle; `None` lets a cycle run to completion
    pub cycle_deadline: Option<Duration>,
    /// Account name prefix in front of the tenant id
    pub reseller_prefix: String,
    /// Maximum points per sink write in chunked mode
    pub batch_size: usize,
    pub publish_mode: ReportPublishMode,
    /// Interval between cycles in loop mode
    pub interval: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            concurrency: 32,
            probe_timeout: Duration::from_secs(5),
            cycle_deadline: None,
            reseller_prefix: "AUTH_".to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            publish_mode: ReportPublishMode::Chunked,
            interval: Duration::from_secs(3600),
        }
    }
}

/// Counts for one poll cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub tenants: usize,
    pub succeeded: usize,
    pub not_found: usize,
    /// All replicas failed, or the account could not be located
    pub failed: usize,
    /// Workers still running or queued when the cycle deadline passed
    pub timed_out: usize,
    /// Points written to the sink
    pub published: usize,
}

impl CycleSummary {
    fn record(&mut self, outcome: ProbeOutcome, report: &UsageReport) {
        match outcome {
            ProbeOutcome::Success(usage) => {
                report.insert(usage);
                self.succeeded += 1;
            }
            ProbeOutcome::NotFound => self.not_found += 1,
            ProbeOutcome::AllFailed => self.failed += 1,
        }
    }

    fn completed(&self) -> usize {
        self.succeeded + self.not_found + self.failed
    }

    /// Whether some tenants went unreported because of failures or the deadline
    pub fn is_degraded(&self) -> bool {
        self.failed > 0 || self.timed_out > 0
    }
}

/// Polls tenant usage into the sink
pub struct UsagePoller {
    config: PollerConfig,
    tenants: Arc<dyn TenantSource>,
    ring: Arc<dyn RingLocator>,
    probe: Arc<dyn AccountProbe>,
    sink: Arc<dyn PointSink>,
    shutdown: CancellationToken,
}

impl UsagePoller {
    /// Create a new usage poller
    pub fn new(
        config: PollerConfig,
        tenants: Arc<dyn TenantSource>,
        ring: Arc<dyn RingLocator>,
        probe: Arc<dyn AccountProbe>,
        sink: Arc<dyn PointSink>,
    ) -> Self {
        Self {
            config,
            tenants,
            ring,
            probe,
            sink,
            shutdown: CancellationToken::new(),
        }
    }

    /// Get a cancellation token that can be used to stop [`run`](Self::run).
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Poll on a timer until the shutdown token is cancelled.
    pub async fn run(&self) {
        let mut interval = tokio::time::interval(self.config.interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.poll_cycle().await {
                        error!("Usage poll cycle failed: {}", e);
                    }
                }
                _ = self.shutdown.cancelled() => {
                    info!("Usage poller shutting down gracefully");
                    break;
                }
            }
        }
    }

    /// Probe every tenant once and publish the resulting report.
    pub async fn poll_cycle(&self) -> Result<CycleSummary> {
        let start = Instant::now();
        if let Err(e) = self.ring.refresh() {
            warn!(error = %e, "Ring refresh failed");
        }

        let mut tenants = self.tenants.list_tenants().await?;
        tenants.shuffle(&mut rand::thread_rng());

        let report = UsageReport::new();
        let mut summary = CycleSummary {
            tenants: tenants.len(),
            ..Default::default()
        };
        info!(
            tenants = tenants.len(),
            concurrency = self.config.concurrency,
            "Starting usage poll cycle"
        );

        let finished = {
            let drive = self.probe_all(tenants, &report, &mut summary);
            match self.config.cycle_deadline {
                Some(deadline) => tokio::time::timeout(deadline, drive).await.is_ok(),
                None => {
                    drive.await;
                    true
                }
            }
        };
        if !finished {
            summary.timed_out = summary.tenants - summary.completed();
            warn!(
                timed_out = summary.timed_out,
                completed = summary.completed(),
                "Poll cycle deadline passed; publishing partial report"
            );
        }

        let points = report.to_points();
        let batch_size = match self.config.publish_mode {
            ReportPublishMode::SingleWrite => points.len().max(1),
            ReportPublishMode::Chunked => self.config.batch_size,
        };
        summary.published = publish(self.sink.as_ref(), &points, batch_size).await?;

        telemetry::record_cycle(start.elapsed().as_secs_f64(), !finished);
        info!(
            tenants = summary.tenants,
            succeeded = summary.succeeded,
            not_found = summary.not_found,
            failed = summary.failed,
            timed_out = summary.timed_out,
            published = summary.published,
            duration_ms = start.elapsed().as_millis() as u64,
            "Usage poll cycle complete"
        );
        Ok(summary)
    }

    /// Run tenant workers, at most `concurrency` at a time. Dropping this
    /// future aborts the workers still in flight.
    async fn probe_all(
        &self,
        tenants: Vec<String>,
        report: &UsageReport,
        summary: &mut CycleSummary,
    ) {
        let mut queue = tenants.into_iter();
        let mut workers = JoinSet::new();

        for tenant in queue.by_ref().take(self.config.concurrency.max(1)) {
            workers.spawn(self.worker(tenant));
        }

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(outcome) => summary.record(outcome, report),
                Err(e) => {
                    error!(error = %e, "Tenant worker panicked");
                    summary.failed += 1;
                }
            }
            if let Some(tenant) = queue.next() {
                workers.spawn(self.worker(tenant));
            }
        }
    }

    fn worker(
        &self,
        tenant: String,
    ) -> impl std::future::Future<Output = ProbeOutcome> + Send + 'static {
        let ring = self.ring.clone();
        let probe = self.probe.clone();
        let account = format!("{}{}", self.config.reseller_prefix, tenant);
        let timeout = self.config.probe_timeout;

        async move {
            let location = match ring.locate(&account) {
                Ok(location) => location,
                Err(e) => {
                    error!(tenant = %tenant, error = %e, "Cannot locate account");
                    telemetry::record_tenant_outcome("unlocatable");
                    return ProbeOutcome::AllFailed;
                }
            };

            let mut nodes = location.nodes;
            nodes.shuffle(&mut rand::thread_rng());

            let result = probe_replicas(
                probe.as_ref(),
                &tenant,
                &account,
                location.partition,
                &nodes,
                timeout,
            )
            .await;

            telemetry::record_tenant_outcome(result.outcome.kind());
            result.outcome
        }
    }
}

