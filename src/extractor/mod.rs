//! Static series extractor
//!
//! Sweeps the series registry one series at a time: fetch rows, assemble
//! points, publish. The relational store serves one query at a time, so the
//! sweep is deliberately sequential.

pub(crate) mod telemetry;

use crate::series::{DataPointAssembler, SeriesDefinition, SeriesRegistry};
use crate::sink::{publish, PointSink, DEFAULT_BATCH_SIZE};
use crate::source::RowSource;
use crate::{Error, Result};

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// What to do when one series fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SweepPolicy {
    /// Log the failure and carry on with the remaining series
    #[default]
    SkipFailed,
    /// Abort the sweep on the first failure
    FailFast,
}

impl std::str::FromStr for SweepPolicy {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "skip" | "skip_failed" | "skip-failed" => Ok(Self::SkipFailed),
            "fail_fast" | "fail-fast" | "abort" => Ok(Self::FailFast),
            other => Err(format!(
                "unknown sweep policy '{}'; expected one of skip-failed, fail-fast",
                other
            )),
        }
    }
}

/// Configuration for the extractor
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Maximum points per sink write
    pub batch_size: usize,
    /// Failure policy
    pub policy: SweepPolicy,
    /// Series to extract; empty means all
    pub series: Vec<String>,
    /// Interval between sweeps in loop mode
    pub interval: Duration,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            policy: SweepPolicy::SkipFailed,
            series: Vec::new(),
            interval: Duration::from_secs(3600),
        }
    }
}

/// Outcome of one series in a sweep
#[derive(Debug, Clone, PartialEq)]
pub enum SeriesOutcome {
    Published { rows: usize, points: usize },
    Failed { error: String },
}

/// Per-series results of one sweep, in sweep order
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    pub outcomes: Vec<(String, SeriesOutcome)>,
}

impl SweepReport {
    pub fn published(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, SeriesOutcome::Published { .. }))
            .count()
    }

    pub fn failed(&self) -> impl Iterator<Item = &str> {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, SeriesOutcome::Failed { .. }))
            .map(|(name, _)| name.as_str())
    }

    pub fn points(&self) -> usize {
        self.outcomes
            .iter()
            .map(|(_, o)| match o {
                SeriesOutcome::Published { points, .. } => *points,
                SeriesOutcome::Failed { .. } => 0,
            })
            .sum()
    }

    /// A sweep succeeds when at least one series was published.
    pub fn is_success(&self) -> bool {
        self.published() > 0 || self.outcomes.is_empty()
    }

    pub fn outcome(&self, series: &str) -> Option<&SeriesOutcome> {
        self.outcomes
            .iter()
            .find(|(name, _)| name == series)
            .map(|(_, o)| o)
    }
}

/// Sweeps the series registry into the sink
pub struct StaticSeriesExtractor {
    config: ExtractorConfig,
    registry: Arc<SeriesRegistry>,
    source: Arc<dyn RowSource>,
    sink: Arc<dyn PointSink>,
    assembler: DataPointAssembler,
    shutdown: CancellationToken,
}

impl StaticSeriesExtractor {
    /// Create a new extractor
    pub fn new(
        config: ExtractorConfig,
        registry: Arc<SeriesRegistry>,
        source: Arc<dyn RowSource>,
        sink: Arc<dyn PointSink>,
    ) -> Self {
        Self {
            config,
            registry,
            source,
            sink,
            assembler: DataPointAssembler::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Replace the assembler (external tags, explicit timestamp)
    pub fn with_assembler(mut self, assembler: DataPointAssembler) -> Self {
        self.assembler = assembler;
        self
    }

    /// Get a cancellation token that can be used to stop [`run`](Self::run).
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Sweep on a timer until the shutdown token is cancelled.
    pub async fn run(&self) {
        let mut interval = tokio::time::interval(self.config.interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.run_sweep().await {
                        error!("Series sweep failed: {}", e);
                    }
                }
                _ = self.shutdown.cancelled() => {
                    info!("Extractor shutting down gracefully");
                    break;
                }
            }
        }
    }

    /// Extract, assemble and publish every selected series once.
    ///
    /// An unreachable store aborts the sweep under either policy; other
    /// per-series failures follow [`SweepPolicy`].
    pub async fn run_sweep(&self) -> Result<SweepReport> {
        let selected = self.registry.select(&self.config.series)?;
        let start = Instant::now();
        info!(series = selected.len(), "Starting series sweep");

        let mut report = SweepReport::default();
        for definition in selected {
            match self.extract_series(definition).await {
                Ok((rows, points)) => {
                    telemetry::record_series_outcome("published");
                    report.outcomes.push((
                        definition.name.clone(),
                        SeriesOutcome::Published { rows, points },
                    ));
                }
                Err(e) if e.is_source_unavailable() => {
                    telemetry::record_series_outcome("source_unavailable");
                    error!(series = %definition.name, error = %e, "Row source unavailable; aborting sweep");
                    return Err(e);
                }
                Err(e) => {
                    telemetry::record_series_outcome("failed");
                    error!(series = %definition.name, error = %e, "Series extraction failed");
                    if self.config.policy == SweepPolicy::FailFast {
                        return Err(e);
                    }
                    report.outcomes.push((
                        definition.name.clone(),
                        SeriesOutcome::Failed {
                            error: e.to_string(),
                        },
                    ));
                }
            }
        }

        let failed: Vec<&str> = report.failed().collect();
        if !failed.is_empty() {
            warn!(failed = ?failed, "Some series were skipped this sweep");
        }
        telemetry::record_sweep(start.elapsed().as_secs_f64());
        info!(
            published = report.published(),
            failed = failed.len(),
            points = report.points(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Series sweep complete"
        );
        Ok(report)
    }

    async fn extract_series(&self, definition: &SeriesDefinition) -> Result<(usize, usize)> {
        let rows = self
            .source
            .fetch(&definition.query)
            .await
            .map_err(|e| match e {
                Error::Query { message, .. } => Error::Query {
                    series: definition.name.clone(),
                    message,
                },
                other => other,
            })?;
        telemetry::record_rows_fetched(rows.len() as u64);

        let points = self.assembler.assemble_all(definition, &rows);
        info!(
            series = %definition.name,
            database = %definition.database,
            rows = rows.len(),
            points = points.len(),
            "Writing points"
        );

        let written = publish(self.sink.as_ref(), &points, self.config.batch_size).await?;
        Ok((rows.len(), written))
    }
}
