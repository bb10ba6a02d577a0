//! Time-series sinks and the batch publisher
//!
//! Publishing is chunked and not transactional: a failed chunk is reported
//! with the number of points already written, and nothing is rolled back.
//! The next scheduled run republishes current state.

mod influx;
mod line_protocol;
mod memory;
pub(crate) mod telemetry;

pub use influx::{InfluxSink, InfluxSinkConfig};
pub use line_protocol::{encode_point, encode_points};
pub use memory::MemorySink;

use crate::schema::DataPoint;
use crate::{Error, Result};
use async_trait::async_trait;
use std::time::Instant;
use tracing::{debug, error, warn};

/// Default number of points per sink write
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// A destination for data points
#[async_trait]
pub trait PointSink: Send + Sync {
    /// Persist one batch of points, returning how many the sink accepted.
    async fn write(&self, points: &[DataPoint]) -> Result<usize>;
}

/// Submit `points` to `sink` in order, in chunks of at most `batch_size`.
///
/// Returns the number of points the sink accepted, which is less than
/// `points.len()` when it dropped points it could not store. On failure the returned error is
/// [`Error::Publish`], carrying how many points made it before the failing
/// chunk.
pub async fn publish(sink: &dyn PointSink, points: &[DataPoint], batch_size: usize) -> Result<usize> {
    if batch_size == 0 {
        return Err(Error::Config("batch size must be greater than zero".to_string()));
    }

    let start = Instant::now();
    let mut written = 0;
    for chunk in points.chunks(batch_size) {
        let accepted = match sink.write(chunk).await {
            Ok(accepted) => accepted,
            Err(e) => {
                error!(
                    written,
                    total = points.len(),
                    chunk_size = chunk.len(),
                    error = %e,
                    "Sink write failed"
                );
                telemetry::record_write_failure();
                return Err(Error::Publish {
                    written,
                    total: points.len(),
                    source: Box::new(e),
                });
            }
        };
        if accepted < chunk.len() {
            warn!(
                dropped = chunk.len() - accepted,
                chunk_size = chunk.len(),
                "Sink dropped points from chunk"
            );
        }
        written += accepted;
        telemetry::record_write(accepted as u64);
        debug!(written, total = points.len(), "Chunk written");
    }

    telemetry::record_publish(start.elapsed().as_secs_f64());
    Ok(written)
}
