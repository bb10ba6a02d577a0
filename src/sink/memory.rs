//! In-memory sink for dry runs and tests

use super::PointSink;
use crate::schema::DataPoint;
use crate::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;

/// Sink that keeps every write call in memory
#[derive(Default)]
pub struct MemorySink {
    writes: Mutex<Vec<Vec<DataPoint>>>,
    /// Zero-based write call indexes that should fail
    fail_on: Vec<usize>,
    attempts: Mutex<usize>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the given (zero-based) write attempts fail
    pub fn failing_on(attempts: impl IntoIterator<Item = usize>) -> Self {
        Self {
            fail_on: attempts.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Successful write calls, in order
    pub fn writes(&self) -> Vec<Vec<DataPoint>> {
        self.writes.lock().clone()
    }

    /// All successfully written points, flattened in order
    pub fn points(&self) -> Vec<DataPoint> {
        self.writes.lock().iter().flatten().cloned().collect()
    }

    /// Number of write calls attempted, including failed ones
    pub fn attempts(&self) -> usize {
        *self.attempts.lock()
    }
}

#[async_trait]
impl PointSink for MemorySink {
    async fn write(&self, points: &[DataPoint]) -> Result<usize> {
        let attempt = {
            let mut attempts = self.attempts.lock();
            let current = *attempts;
            *attempts += 1;
            current
        };
        if self.fail_on.contains(&attempt) {
            return Err(Error::Sink(format!("injected failure on write {attempt}")));
        }
        self.writes.lock().push(points.to_vec());
        Ok(points.len())
    }
}
