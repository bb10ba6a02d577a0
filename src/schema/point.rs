//! The published time-series unit

use super::value::ScalarValue;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// One time-series data point.
///
/// `fields` always holds every column of the source row; `tags` is an
/// indexed view over a subset of them, not a partition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataPoint {
    /// Series name
    pub measurement: String,
    /// Indexed dimensions
    pub tags: BTreeMap<String, ScalarValue>,
    /// Value columns
    pub fields: BTreeMap<String, ScalarValue>,
    /// Explicit timestamp; the sink assigns ingestion time when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,
}

impl DataPoint {
    pub fn new(measurement: impl Into<String>) -> Self {
        Self {
            measurement: measurement.into(),
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
            time: None,
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn with_time(mut self, time: Option<DateTime<Utc>>) -> Self {
        self.time = time;
        self
    }
}
