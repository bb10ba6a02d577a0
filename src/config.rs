//! Validated configuration and the component factory
//!
//! Binaries parse their command line into these structs, call `validate()`
//! and hand them to [`ComponentFactory`], which builds the trait objects the
//! pipelines run against. Nothing here reads process-global state; the
//! `OS_*` style environment fallbacks live on the clap arguments.

use crate::identity::{KeystoneClient, TenantSource};
use crate::ring::{HashPathConfig, RingFile, RingLocator};
use crate::sink::{InfluxSink, MemorySink, PointSink};
use crate::source::{MysqlRowSource, RowSource};
use crate::usage::{AccountProbe, HttpAccountProbe};
use crate::{Error, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

pub use crate::extractor::ExtractorConfig;
pub use crate::identity::KeystoneConfig as IdentityConfig;
pub use crate::sink::InfluxSinkConfig as InfluxConfig;
pub use crate::source::MysqlSourceConfig as DatabaseConfig;
pub use crate::usage::PollerConfig;

/// Where the account ring lives and how account names are hashed
#[derive(Debug, Clone)]
pub struct RingConfig {
    /// Compressed account ring, e.g. `/etc/swift/account.ring.gz`
    pub ring_path: PathBuf,
    /// `swift.conf` to read `[swift-hash]` from when no explicit values are given
    pub swift_conf: Option<PathBuf>,
    pub hash_prefix: Option<String>,
    pub hash_suffix: Option<String>,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            ring_path: PathBuf::from("/etc/swift/account.ring.gz"),
            swift_conf: Some(PathBuf::from("/etc/swift/swift.conf")),
            hash_prefix: None,
            hash_suffix: None,
        }
    }
}

impl RingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.ring_path.as_os_str().is_empty() {
            return Err(Error::Config("ring path must not be empty".to_string()));
        }
        if self.hash_prefix.is_none() && self.hash_suffix.is_none() && self.swift_conf.is_none() {
            return Err(Error::Config(
                "either a hash path prefix/suffix or a swift.conf path is required".to_string(),
            ));
        }
        Ok(())
    }

    /// Explicit prefix/suffix win over `swift.conf`.
    pub fn hash_path(&self) -> Result<HashPathConfig> {
        if self.hash_prefix.is_some() || self.hash_suffix.is_some() {
            return Ok(HashPathConfig::new(
                self.hash_prefix.clone().unwrap_or_default(),
                self.hash_suffix.clone().unwrap_or_default(),
            ));
        }
        match &self.swift_conf {
            Some(path) => HashPathConfig::from_swift_conf(path),
            None => Err(Error::Config("no hash path configuration".to_string())),
        }
    }
}

impl DatabaseConfig {
    pub fn validate(&self) -> Result<()> {
        require("database host", &self.host)?;
        require("database user", &self.user)?;
        require("database password", &self.password)?;
        if self.port == 0 {
            return Err(Error::Config("database port must be non-zero".to_string()));
        }
        Ok(())
    }
}

impl InfluxConfig {
    pub fn validate(&self) -> Result<()> {
        require("InfluxDB URL", &self.url)?;
        require("InfluxDB database", &self.database)?;
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "InfluxDB URL must be http(s), got '{}'",
                self.url
            )));
        }
        if self.password.is_some() && self.username.is_none() {
            return Err(Error::Config(
                "InfluxDB password given without a username".to_string(),
            ));
        }
        Ok(())
    }
}

impl IdentityConfig {
    pub fn validate(&self) -> Result<()> {
        require("OS_AUTH_URL", &self.auth_url)?;
        require("OS_USERNAME", &self.username)?;
        require("OS_PASSWORD", &self.password)?;
        require("OS_TENANT_NAME", &self.tenant_name)?;
        Ok(())
    }
}

impl ExtractorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::Config("batch size must be greater than zero".to_string()));
        }
        Ok(())
    }
}

impl PollerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(Error::Config("concurrency must be greater than zero".to_string()));
        }
        if self.batch_size == 0 {
            return Err(Error::Config("batch size must be greater than zero".to_string()));
        }
        if self.probe_timeout.is_zero() {
            return Err(Error::Config("probe timeout must be greater than zero".to_string()));
        }
        if matches!(self.cycle_deadline, Some(d) if d.is_zero()) {
            return Err(Error::Config("cycle deadline must be greater than zero".to_string()));
        }
        Ok(())
    }
}

fn require(what: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::Config(format!("{} is required", what)));
    }
    Ok(())
}

/// Builds pipeline collaborators from validated configuration
pub struct ComponentFactory;

impl ComponentFactory {
    pub fn create_row_source(config: &DatabaseConfig) -> Result<Arc<dyn RowSource>> {
        config.validate()?;
        Ok(Arc::new(MysqlRowSource::new(config)))
    }

    /// InfluxDB sink, or an in-memory sink when `dry_run` is set. The caller
    /// keeps the returned [`MemorySink`] to print what would have been written.
    pub fn create_sink(
        config: &InfluxConfig,
        dry_run: bool,
    ) -> Result<(Arc<dyn PointSink>, Option<Arc<MemorySink>>)> {
        if dry_run {
            info!("Dry run: points are collected in memory and printed");
            let memory = Arc::new(MemorySink::new());
            let sink: Arc<dyn PointSink> = memory.clone();
            return Ok((sink, Some(memory)));
        }
        config.validate()?;
        Ok((Arc::new(InfluxSink::new(config.clone())?), None))
    }

    pub fn create_tenant_source(config: &IdentityConfig) -> Result<Arc<dyn TenantSource>> {
        config.validate()?;
        Ok(Arc::new(KeystoneClient::new(config.clone())?))
    }

    pub fn create_ring(config: &RingConfig) -> Result<Arc<dyn RingLocator>> {
        config.validate()?;
        let hash = config.hash_path()?;
        Ok(Arc::new(RingFile::open(config.ring_path.clone(), hash)?))
    }

    pub fn create_probe(config: &PollerConfig) -> Result<Arc<dyn AccountProbe>> {
        config.validate()?;
        Ok(Arc::new(HttpAccountProbe::new(config.probe_timeout)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn database() -> DatabaseConfig {
        DatabaseConfig {
            host: "db.internal".to_string(),
            port: 3306,
            user: "reporting".to_string(),
            password: "secret".to_string(),
            database: "nova".to_string(),
        }
    }

    #[test]
    fn test_database_requires_credentials() {
        assert!(database().validate().is_ok());
        let mut config = database();
        config.password = "  ".to_string();
        let err = config.validate().unwrap_err();
        assert!(format!("{err}").contains("password"));
    }

    #[test]
    fn test_influx_url_scheme() {
        let mut config = InfluxConfig::default();
        assert!(config.validate().is_ok());
        config.url = "influx:8086".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_poller_rejects_zero_concurrency() {
        let config = PollerConfig {
            concurrency: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = PollerConfig {
            cycle_deadline: Some(Duration::ZERO),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_explicit_hash_path_wins() {
        let config = RingConfig {
            hash_prefix: None,
            hash_suffix: Some("cluster-secret".to_string()),
            swift_conf: Some(PathBuf::from("/does/not/exist")),
            ..Default::default()
        };
        let hash = config.hash_path().unwrap();
        assert_eq!(hash, HashPathConfig::new("", "cluster-secret"));
    }

    #[test]
    fn test_dry_run_sink_skips_influx_validation() {
        let config = InfluxConfig {
            url: String::new(),
            ..Default::default()
        };
        let (_, memory) = ComponentFactory::create_sink(&config, true).unwrap();
        assert!(memory.is_some());
        assert!(ComponentFactory::create_sink(&config, false).is_err());
    }
}
