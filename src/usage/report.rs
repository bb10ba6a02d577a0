//! Per-cycle usage report

use super::TenantUsage;
use crate::schema::{DataPoint, ScalarValue};
use dashmap::DashMap;

/// Measurement name for object storage usage points
pub const USAGE_MEASUREMENT: &str = "project-usage.object";

/// How the report is handed to the publisher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportPublishMode {
    /// The whole report in a single sink write
    SingleWrite,
    /// Sink writes of at most the configured batch size
    #[default]
    Chunked,
}

impl std::str::FromStr for ReportPublishMode {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "single" | "single_write" | "single-write" => Ok(Self::SingleWrite),
            "chunked" | "batched" => Ok(Self::Chunked),
            other => Err(format!(
                "unknown report publish mode '{}'; expected one of single-write, chunked",
                other
            )),
        }
    }
}

/// Tenant id -> usage collected during one cycle
#[derive(Debug, Default)]
pub struct UsageReport {
    entries: DashMap<String, TenantUsage>,
}

impl UsageReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, usage: TenantUsage) {
        self.entries.insert(usage.tenant_id.clone(), usage);
    }

    pub fn get(&self, tenant: &str) -> Option<TenantUsage> {
        self.entries.get(tenant).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, tenant: &str) -> bool {
        self.entries.contains_key(tenant)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// One point per tenant, sorted by tenant id
    pub fn to_points(&self) -> Vec<DataPoint> {
        let mut usages: Vec<TenantUsage> =
            self.entries.iter().map(|entry| entry.value().clone()).collect();
        usages.sort_by(|a, b| a.tenant_id.cmp(&b.tenant_id));
        usages.iter().map(TenantUsage::to_point).collect()
    }
}

impl TenantUsage {
    /// `project-usage.object,projectid=.. projectid=..,containers=..,...`
    ///
    /// The quota field is omitted when the account has no quota.
    pub fn to_point(&self) -> DataPoint {
        let mut point = DataPoint::new(USAGE_MEASUREMENT)
            .with_tag("projectid", self.tenant_id.as_str())
            .with_field("projectid", self.tenant_id.as_str())
            .with_field("containers", saturating_i64(self.container_count))
            .with_field("objects", saturating_i64(self.object_count))
            .with_field("bytes", saturating_i64(self.bytes_used));
        if let Some(quota) = self.quota_bytes {
            point = point.with_field("quota", saturating_i64(quota));
        }
        point
    }
}

fn saturating_i64(value: u64) -> ScalarValue {
    ScalarValue::Int(i64::try_from(value).unwrap_or(i64::MAX))
}
