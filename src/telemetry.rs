//! Shared logging and metrics bootstrap for the reporting binaries.

use crate::{Error, Result};

use opentelemetry::global;
use opentelemetry::KeyValue;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::Resource;
use std::collections::BTreeMap;
use tracing::info;
use tracing_subscriber::EnvFilter;

const ATTR_SERVICE_NAME: &str = "service.name";
const ATTR_SERVICE_NAMESPACE: &str = "service.namespace";
const ATTR_RUN_ID: &str = "osreport.run_id";

/// Log line encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Text,
}

impl LogFormat {
    fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "text" | "pretty" | "plain" => Ok(LogFormat::Text),
            other => Err(Error::Config(format!(
                "OSREPORT_LOG_FORMAT must be one of [json, text], got '{other}'"
            ))),
        }
    }
}

/// Telemetry settings read from the environment
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub enabled: bool,
    pub service_name: String,
    pub run_id: Option<String>,
    pub log_format: LogFormat,
    pub resource_attributes: Vec<KeyValue>,
}

impl TelemetryConfig {
    pub fn from_env(default_service_name: &str) -> Result<Self> {
        let service_name =
            std::env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| default_service_name.to_string());
        let service_name = service_name.trim();
        if service_name.is_empty() {
            return Err(Error::Config("OTEL_SERVICE_NAME cannot be empty".to_string()));
        }

        let enabled = parse_optional_bool("OSREPORT_TELEMETRY_ENABLED")?.unwrap_or(true);
        let run_id = std::env::var("OSREPORT_TELEMETRY_RUN_ID")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let log_format = match std::env::var("OSREPORT_LOG_FORMAT") {
            Ok(raw) => LogFormat::parse(&raw)?,
            Err(_) => LogFormat::Json,
        };

        let mut attr_map: BTreeMap<String, String> = BTreeMap::new();
        if let Ok(attr_str) = std::env::var("OTEL_RESOURCE_ATTRIBUTES") {
            for (key, value) in parse_resource_attributes(&attr_str)? {
                attr_map.insert(key, value);
            }
        }
        attr_map.insert(ATTR_SERVICE_NAME.to_string(), service_name.to_string());
        attr_map
            .entry(ATTR_SERVICE_NAMESPACE.to_string())
            .or_insert_with(|| "osreport".to_string());
        if let Some(run_id) = &run_id {
            attr_map.insert(ATTR_RUN_ID.to_string(), run_id.clone());
        }

        Ok(Self {
            enabled,
            service_name: service_name.to_string(),
            run_id,
            log_format,
            resource_attributes: attr_map
                .into_iter()
                .map(|(k, v)| KeyValue::new(k, v))
                .collect(),
        })
    }
}

/// Keeps the meter provider alive for the life of the process.
pub struct Telemetry {
    config: TelemetryConfig,
    meter_provider: Option<SdkMeterProvider>,
}

impl Telemetry {
    /// Install the log subscriber and, unless disabled, the metrics provider.
    ///
    /// `RUST_LOG` overrides `log_level` when set.
    pub fn init_for_component(default_service_name: &str, log_level: &str) -> Result<Self> {
        let config = TelemetryConfig::from_env(default_service_name)?;
        let filter = match std::env::var("RUST_LOG") {
            Ok(directives) if !directives.trim().is_empty() => EnvFilter::try_new(directives),
            _ => EnvFilter::try_new(parse_log_level(log_level)?),
        }
        .map_err(|e| Error::Config(format!("invalid log filter: {e}")))?;

        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr);
        let installed = match config.log_format {
            LogFormat::Json => builder.json().try_init(),
            LogFormat::Text => builder.try_init(),
        };
        installed
            .map_err(|e| Error::Config(format!("failed to initialize log subscriber: {e}")))?;

        let meter_provider = if config.enabled {
            let resource =
                Resource::default().merge(&Resource::new(config.resource_attributes.clone()));
            let provider = SdkMeterProvider::builder().with_resource(resource).build();
            global::set_meter_provider(provider.clone());
            Some(provider)
        } else {
            None
        };

        info!(
            service_name = %config.service_name,
            metrics_enabled = config.enabled,
            run_id = %config.run_id.as_deref().unwrap_or("none"),
            "Telemetry initialized"
        );

        Ok(Self {
            config,
            meter_provider,
        })
    }

    pub fn run_id(&self) -> Option<&str> {
        self.config.run_id.as_deref()
    }

    pub fn service_name(&self) -> &str {
        &self.config.service_name
    }
}

impl Drop for Telemetry {
    fn drop(&mut self) {
        if let Some(provider) = &self.meter_provider {
            let _ = provider.shutdown();
        }
    }
}

fn parse_log_level(raw: &str) -> Result<&'static str> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok("trace"),
        "debug" => Ok("debug"),
        "info" => Ok("info"),
        "warn" | "warning" => Ok("warn"),
        "error" => Ok("error"),
        other => Err(Error::Config(format!(
            "invalid log level '{other}', expected one of [trace, debug, info, warn, error]"
        ))),
    }
}

fn parse_optional_bool(name: &str) -> Result<Option<bool>> {
    let Some(raw) = std::env::var(name).ok() else {
        return Ok(None);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(Some(true)),
        "0" | "false" | "no" | "off" => Ok(Some(false)),
        _ => Err(Error::Config(format!(
            "{name} must be a boolean (true/false/1/0), got '{raw}'"
        ))),
    }
}

fn parse_resource_attributes(raw: &str) -> Result<Vec<(String, String)>> {
    let mut attrs = Vec::new();
    for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let Some((key, value)) = pair.split_once('=') else {
            return Err(Error::Config(format!(
                "OTEL_RESOURCE_ATTRIBUTES entry '{pair}' is invalid, expected key=value"
            )));
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(Error::Config(
                "OTEL_RESOURCE_ATTRIBUTES contains an empty attribute key".to_string(),
            ));
        }
        attrs.push((key.to_string(), value.trim().to_string()));
    }
    Ok(attrs)
}
