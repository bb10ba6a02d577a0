//! Tenant enumeration
//!
//! The usage poller only needs the list of tenant identifiers; the identity
//! service behind it is swappable.

mod keystone;

pub use keystone::{KeystoneClient, KeystoneConfig};

use crate::Result;
use async_trait::async_trait;

/// Source of tenant (project) identifiers
#[async_trait]
pub trait TenantSource: Send + Sync {
    /// List every tenant identifier known to the identity service
    async fn list_tenants(&self) -> Result<Vec<String>>;
}

/// Fixed tenant list, for tests and for polling an explicit subset
#[derive(Debug, Clone, Default)]
pub struct StaticTenantSource {
    tenants: Vec<String>,
}

impl StaticTenantSource {
    pub fn new(tenants: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            tenants: tenants.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl TenantSource for StaticTenantSource {
    async fn list_tenants(&self) -> Result<Vec<String>> {
        Ok(self.tenants.clone())
    }
}
