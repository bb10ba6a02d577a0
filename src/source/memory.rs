//! In-memory row source for development and tests

use super::RowSource;
use crate::schema::Row;
use crate::{Error, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Row source that answers queries from a fixed table of results
#[derive(Default)]
pub struct StaticRowSource {
    results: DashMap<String, std::result::Result<Vec<Row>, String>>,
    calls: AtomicUsize,
}

impl StaticRowSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `query` with `rows`
    pub fn with_rows(self, query: impl Into<String>, rows: Vec<Row>) -> Self {
        self.results.insert(query.into(), Ok(rows));
        self
    }

    /// Fail `query` with a query error
    pub fn with_failure(self, query: impl Into<String>, message: impl Into<String>) -> Self {
        self.results.insert(query.into(), Err(message.into()));
        self
    }

    /// Number of fetches made so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RowSource for StaticRowSource {
    async fn fetch(&self, query: &str) -> Result<Vec<Row>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.results.get(query) {
            Some(entry) => match entry.value() {
                Ok(rows) => Ok(rows.clone()),
                Err(message) => Err(Error::Query {
                    series: String::new(),
                    message: message.clone(),
                }),
            },
            None => Err(Error::Query {
                series: String::new(),
                message: "no result registered for query".to_string(),
            }),
        }
    }
}
