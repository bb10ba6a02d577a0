//! Keystone v2.0 tenant listing
//!
//! Authenticates with password credentials, then lists tenants from the
//! identity admin endpoint advertised in the service catalog, falling back
//! to the auth URL when the catalog has none.

use super::TenantSource;
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Keystone credentials, usually taken from the `OS_*` environment
#[derive(Clone)]
pub struct KeystoneConfig {
    pub auth_url: String,
    pub username: String,
    pub password: String,
    pub tenant_name: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for KeystoneConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeystoneConfig")
            .field("auth_url", &self.auth_url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("tenant_name", &self.tenant_name)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Serialize)]
struct AuthRequest<'a> {
    auth: AuthBody<'a>,
}

#[derive(Serialize)]
struct AuthBody<'a> {
    #[serde(rename = "tenantName")]
    tenant_name: &'a str,
    #[serde(rename = "passwordCredentials")]
    password_credentials: PasswordCredentials<'a>,
}

#[derive(Serialize)]
struct PasswordCredentials<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct AuthResponse {
    access: Access,
}

#[derive(Deserialize)]
struct Access {
    token: Token,
    #[serde(rename = "serviceCatalog", default)]
    service_catalog: Vec<CatalogEntry>,
}

#[derive(Deserialize)]
struct Token {
    id: String,
}

#[derive(Deserialize)]
struct CatalogEntry {
    #[serde(rename = "type")]
    service_type: String,
    #[serde(default)]
    endpoints: Vec<CatalogEndpoint>,
}

#[derive(Deserialize)]
struct CatalogEndpoint {
    #[serde(rename = "adminURL")]
    admin_url: Option<String>,
}

#[derive(Deserialize)]
struct TenantList {
    tenants: Vec<Tenant>,
}

#[derive(Deserialize)]
struct Tenant {
    id: String,
}

/// Minimal Keystone v2.0 client
pub struct KeystoneClient {
    client: Client,
    config: KeystoneConfig,
}

impl KeystoneClient {
    pub fn new(config: KeystoneConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    async fn authenticate(&self) -> Result<(String, String)> {
        let auth_url = self.config.auth_url.trim_end_matches('/');
        let request = AuthRequest {
            auth: AuthBody {
                tenant_name: &self.config.tenant_name,
                password_credentials: PasswordCredentials {
                    username: &self.config.username,
                    password: &self.config.password,
                },
            },
        };

        let response = self
            .client
            .post(format!("{}/tokens", auth_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::SourceUnavailable(format!("Keystone at {}: {}", auth_url, e)))?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::UNAUTHORIZED => {
                return Err(Error::Identity(format!(
                    "Keystone rejected credentials for user '{}'",
                    self.config.username
                )));
            }
            status => {
                return Err(Error::Identity(format!(
                    "Keystone authentication returned HTTP {}",
                    status.as_u16()
                )));
            }
        }

        let body: AuthResponse = response
            .json()
            .await
            .map_err(|e| Error::Identity(format!("malformed token response: {}", e)))?;

        let endpoint = body
            .access
            .service_catalog
            .iter()
            .filter(|entry| entry.service_type == "identity")
            .flat_map(|entry| entry.endpoints.iter())
            .find_map(|endpoint| endpoint.admin_url.clone())
            .unwrap_or_else(|| auth_url.to_string());

        debug!(endpoint = %endpoint, "Keystone token issued");
        Ok((body.access.token.id, endpoint))
    }
}

#[async_trait]
impl TenantSource for KeystoneClient {
    async fn list_tenants(&self) -> Result<Vec<String>> {
        let (token, endpoint) = self.authenticate().await?;

        let response = self
            .client
            .get(format!("{}/tenants", endpoint.trim_end_matches('/')))
            .header("X-Auth-Token", token)
            .send()
            .await
            .map_err(|e| Error::SourceUnavailable(format!("Keystone at {}: {}", endpoint, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Identity(format!(
                "tenant listing returned HTTP {}",
                status.as_u16()
            )));
        }

        let list: TenantList = response
            .json()
            .await
            .map_err(|e| Error::Identity(format!("malformed tenant list: {}", e)))?;

        info!(tenants = list.tenants.len(), "Listed tenants");
        Ok(list.tenants.into_iter().map(|t| t.id).collect())
    }
}
