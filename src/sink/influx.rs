//! InfluxDB v1 HTTP sink

use super::line_protocol::encode_points;
use super::PointSink;
use crate::schema::DataPoint;
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info};

/// InfluxDB connection settings
#[derive(Debug, Clone)]
pub struct InfluxSinkConfig {
    /// Base URL, e.g. `http://influx:8086`
    pub url: String,
    /// Target database
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for InfluxSinkConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8086".to_string(),
            database: "reporting".to_string(),
            username: None,
            password: None,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Writes points to `/write` using line protocol with nanosecond precision
pub struct InfluxSink {
    client: Client,
    write_url: String,
    config: InfluxSinkConfig,
}

impl InfluxSink {
    pub fn new(config: InfluxSinkConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        let write_url = format!("{}/write", config.url.trim_end_matches('/'));

        info!(url = %config.url, database = %config.database, "Using InfluxDB sink");

        Ok(Self {
            client,
            write_url,
            config,
        })
    }
}

#[async_trait]
impl PointSink for InfluxSink {
    async fn write(&self, points: &[DataPoint]) -> Result<usize> {
        let (body, encoded) = encode_points(points);
        if encoded == 0 {
            return Ok(0);
        }

        let mut query = vec![
            ("db", self.config.database.as_str()),
            ("precision", "ns"),
        ];
        if let Some(user) = &self.config.username {
            query.push(("u", user.as_str()));
        }
        if let Some(password) = &self.config.password {
            query.push(("p", password.as_str()));
        }

        let response = self
            .client
            .post(&self.write_url)
            .query(&query)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            debug!(points = encoded, "InfluxDB write accepted");
            return Ok(encoded);
        }

        let detail = response.text().await.unwrap_or_default();
        Err(Error::Sink(format!(
            "InfluxDB write returned HTTP {}: {}",
            status.as_u16(),
            detail.trim()
        )))
    }
}
