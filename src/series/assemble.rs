//! Row -> data point assembly
//!
//! Every column of the row becomes a field. Columns named by the series tag
//! mapping are additionally copied into `tags` under their logical name. A
//! mapping that names a column the row does not have produces no tag and no
//! error; existing series definitions rely on that.

use super::SeriesDefinition;
use crate::schema::{DataPoint, Row, ScalarValue};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Assemble a single row into a data point.
pub fn assemble_data_point(
    measurement: &str,
    row: &Row,
    tag_fields: &BTreeMap<String, String>,
    time: Option<DateTime<Utc>>,
) -> DataPoint {
    let mut tags = BTreeMap::new();
    for (tag, column) in tag_fields {
        if column.is_empty() {
            continue;
        }
        if let Some(value) = row.get(column) {
            tags.insert(tag.clone(), value.clone());
        }
    }

    DataPoint {
        measurement: measurement.to_string(),
        tags,
        fields: row.clone(),
        time,
    }
}

/// Assemble every row, preserving row order.
pub fn assemble_data_points(
    measurement: &str,
    rows: &[Row],
    tag_fields: &BTreeMap<String, String>,
    time: Option<DateTime<Utc>>,
) -> Vec<DataPoint> {
    rows.iter()
        .map(|row| assemble_data_point(measurement, row, tag_fields, time))
        .collect()
}

/// Assembly settings that hold for a whole sweep
#[derive(Debug, Clone, Default)]
pub struct DataPointAssembler {
    /// Values for tags whose mapping has no source column
    external_tags: BTreeMap<String, ScalarValue>,
    /// Explicit timestamp for backfills
    time: Option<DateTime<Utc>>,
}

impl DataPointAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Supply a value for an externally valued tag
    pub fn with_external_tag(mut self, tag: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        self.external_tags.insert(tag.into(), value.into());
        self
    }

    /// Stamp every point with an explicit time
    pub fn with_time(mut self, time: Option<DateTime<Utc>>) -> Self {
        self.time = time;
        self
    }

    pub fn time(&self) -> Option<DateTime<Utc>> {
        self.time
    }

    /// Assemble one row for `definition`
    pub fn assemble(&self, definition: &SeriesDefinition, row: &Row) -> DataPoint {
        let mut point =
            assemble_data_point(&definition.name, row, &definition.tag_fields, self.time);
        for tag in definition.external_tags() {
            if let Some(value) = self.external_tags.get(tag) {
                point.tags.insert(tag.to_string(), value.clone());
            }
        }
        point
    }

    /// Assemble all rows for `definition`, preserving row order
    pub fn assemble_all(&self, definition: &SeriesDefinition, rows: &[Row]) -> Vec<DataPoint> {
        rows.iter().map(|row| self.assemble(definition, row)).collect()
    }
}
