//! # osreport
//!
//! Publishes OpenStack control-plane inventory and object storage usage as
//! InfluxDB time series.
//!
//! ## Pipelines
//!
//! - **Static series** ([`extractor`]): runs a registry of named SQL queries
//!   against the control-plane databases, turns every row into a data point
//!   and publishes the points in batches.
//! - **Object usage** ([`usage`]): lists tenants from the identity service,
//!   locates each tenant's account in the Swift account ring and asks the
//!   replicas for usage headers, many tenants at once. The merged report is
//!   published once per cycle.
//!
//! Both pipelines talk to their collaborators through traits
//! ([`source::RowSource`], [`sink::PointSink`], [`identity::TenantSource`],
//! [`ring::RingLocator`], [`usage::AccountProbe`]) so tests can run them
//! against in-memory fakes.

pub mod config;
pub mod extractor;
pub mod identity;
pub mod ring;
pub mod schema;
pub mod series;
pub mod sink;
pub mod source;
pub mod telemetry;
pub mod usage;

mod error;

pub use error::{Error, Result};

/// Re-exports for convenience
pub mod prelude {
    pub use crate::config::{ComponentFactory, RingConfig};
    pub use crate::extractor::{
        ExtractorConfig, SeriesOutcome, StaticSeriesExtractor, SweepPolicy, SweepReport,
    };
    pub use crate::identity::TenantSource;
    pub use crate::ring::{Ring, RingLocator};
    pub use crate::schema::{DataPoint, Row, ScalarValue};
    pub use crate::series::{DataPointAssembler, SeriesDefinition, SeriesRegistry};
    pub use crate::sink::{publish, PointSink};
    pub use crate::source::RowSource;
    pub use crate::usage::{CycleSummary, PollerConfig, ReportPublishMode, TenantUsage, UsagePoller};
    pub use crate::{Error, Result};
}
