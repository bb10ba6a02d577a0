//! Per-tenant replica probing
//!
//! Replicas are tried one at a time, in the order given:
//!
//! - `204 No Content` with usable headers: success, stop.
//! - `404 Not Found`: the account does not exist in object storage, stop.
//!   A consistent ring reports this uniformly, so no other replica is asked.
//! - anything else, a transport error or a timeout: try the next replica.
//!
//! Running out of replicas is `AllFailed`; the tenant is left out of the
//! report.

use super::telemetry;
use super::TenantUsage;
use crate::ring::RingDevice;
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, error, warn};

pub const HEADER_CONTAINER_COUNT: &str = "x-account-container-count";
pub const HEADER_OBJECT_COUNT: &str = "x-account-object-count";
pub const HEADER_BYTES_USED: &str = "x-account-bytes-used";
pub const HEADER_QUOTA_BYTES: &str = "x-account-meta-quota-bytes";

/// Status and headers of a metadata request. Header names are lower case.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
}

impl ProbeResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HashMap::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }
}

/// Issues an account metadata request against one storage node
#[async_trait]
pub trait AccountProbe: Send + Sync {
    async fn head(&self, node: &RingDevice, partition: u32, account: &str) -> Result<ProbeResponse>;
}

/// `HEAD http://{ip}:{port}/{device}/{partition}/{account}` straight to the
/// account server, bypassing the proxy.
pub struct HttpAccountProbe {
    client: Client,
}

impl HttpAccountProbe {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    pub fn url(node: &RingDevice, partition: u32, account: &str) -> String {
        format!(
            "http://{}/{}/{}/{}",
            node.authority(),
            node.device,
            partition,
            account
        )
    }
}

#[async_trait]
impl AccountProbe for HttpAccountProbe {
    async fn head(&self, node: &RingDevice, partition: u32, account: &str) -> Result<ProbeResponse> {
        let response = self
            .client
            .head(Self::url(node, partition, account))
            .send()
            .await?;

        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();

        Ok(ProbeResponse {
            status: response.status().as_u16(),
            headers,
        })
    }
}

/// Terminal state of one tenant's probe sequence
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    Success(TenantUsage),
    NotFound,
    AllFailed,
}

impl ProbeOutcome {
    pub fn kind(&self) -> &'static str {
        match self {
            ProbeOutcome::Success(_) => "success",
            ProbeOutcome::NotFound => "not_found",
            ProbeOutcome::AllFailed => "all_failed",
        }
    }
}

/// Outcome plus the number of replicas asked
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResult {
    pub outcome: ProbeOutcome,
    pub attempts: usize,
}

/// Probe `nodes` in order until one answers authoritatively.
pub async fn probe_replicas(
    probe: &dyn AccountProbe,
    tenant: &str,
    account: &str,
    partition: u32,
    nodes: &[RingDevice],
    timeout: Duration,
) -> ProbeResult {
    for (index, node) in nodes.iter().enumerate() {
        let attempts = index + 1;
        debug!(tenant, node = %node.authority(), attempt = attempts, "Probing replica");

        let failure = match tokio::time::timeout(timeout, probe.head(node, partition, account)).await
        {
            Ok(Ok(response)) => match response.status {
                204 => {
                    match TenantUsage::from_headers(tenant, &response.headers) {
                        Ok(usage) => {
                            telemetry::record_probe_attempt("success");
                            return ProbeResult {
                                outcome: ProbeOutcome::Success(usage),
                                attempts,
                            };
                        }
                        Err(e) => e.to_string(),
                    }
                }
                404 => {
                    telemetry::record_probe_attempt("not_found");
                    return ProbeResult {
                        outcome: ProbeOutcome::NotFound,
                        attempts,
                    };
                }
                _ => format!("HTTP {}", response.status),
            },
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("no response within {:?}", timeout),
        };

        telemetry::record_probe_attempt("failure");
        warn!(
            tenant,
            url = %HttpAccountProbe::url(node, partition, account),
            error = %failure,
            "Error fetching account usage"
        );
    }

    error!(tenant, replicas = nodes.len(), "Failed to fetch usage for tenant");
    ProbeResult {
        outcome: ProbeOutcome::AllFailed,
        attempts: nodes.len(),
    }
}

impl TenantUsage {
    /// Parse usage from account HEAD headers. Counts are required; an absent
    /// quota means none is configured.
    pub fn from_headers(tenant: &str, headers: &HashMap<String, String>) -> Result<Self> {
        let required = |name: &str| -> Result<u64> {
            let raw = headers
                .get(name)
                .ok_or_else(|| Error::Internal(format!("response has no {} header", name)))?;
            raw.trim()
                .parse::<u64>()
                .map_err(|e| Error::Internal(format!("invalid {} header '{}': {}", name, raw, e)))
        };

        let quota_bytes = match headers.get(HEADER_QUOTA_BYTES) {
            None => None,
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(quota) => Some(quota),
                Err(_) => {
                    warn!(tenant, quota = %raw, "Ignoring unparseable quota header");
                    None
                }
            },
        };

        Ok(Self {
            tenant_id: tenant.to_string(),
            container_count: required(HEADER_CONTAINER_COUNT)?,
            object_count: required(HEADER_OBJECT_COUNT)?,
            bytes_used: required(HEADER_BYTES_USED)?,
            quota_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_usage_headers() {
        let usage = TenantUsage::from_headers(
            "t1",
            &headers(&[
                (HEADER_CONTAINER_COUNT, "3"),
                (HEADER_OBJECT_COUNT, "120"),
                (HEADER_BYTES_USED, "4096"),
                (HEADER_QUOTA_BYTES, "1000000"),
            ]),
        )
        .unwrap();
        assert_eq!(usage.container_count, 3);
        assert_eq!(usage.object_count, 120);
        assert_eq!(usage.bytes_used, 4096);
        assert_eq!(usage.quota_bytes, Some(1_000_000));
    }

    #[test]
    fn test_missing_count_header_is_an_error() {
        let err = TenantUsage::from_headers(
            "t1",
            &headers(&[(HEADER_CONTAINER_COUNT, "3"), (HEADER_OBJECT_COUNT, "1")]),
        )
        .unwrap_err();
        assert!(format!("{err}").contains(HEADER_BYTES_USED));
    }

    #[test]
    fn test_garbage_quota_is_treated_as_absent() {
        let usage = TenantUsage::from_headers(
            "t1",
            &headers(&[
                (HEADER_CONTAINER_COUNT, "0"),
                (HEADER_OBJECT_COUNT, "0"),
                (HEADER_BYTES_USED, "0"),
                (HEADER_QUOTA_BYTES, "lots"),
            ]),
        )
        .unwrap();
        assert_eq!(usage.quota_bytes, None);
    }

    #[test]
    fn test_probe_url() {
        let node = RingDevice {
            id: 0,
            ip: "10.1.1.1".to_string(),
            port: 6202,
            device: "sdb1".to_string(),
            region: None,
            zone: None,
        };
        assert_eq!(
            HttpAccountProbe::url(&node, 1234, "AUTH_abc"),
            "http://10.1.1.1:6202/sdb1/1234/AUTH_abc"
        );
    }
}
