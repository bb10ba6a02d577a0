//! Static series registry
//!
//! Each series pairs a query against the control-plane database with a
//! mapping from logical tag names to the result columns that feed them.
//! The registry is built once at startup and shared read-only.

mod assemble;
mod queries;

pub use assemble::{assemble_data_point, assemble_data_points, DataPointAssembler};

use crate::{Error, Result};
use std::collections::BTreeMap;

/// One named measurement and the query that fills it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesDefinition {
    /// Measurement name (unique within a registry)
    pub name: String,
    /// Control-plane schema the query reads
    pub database: String,
    /// Query text, opaque to everything but the row source
    pub query: String,
    /// Logical tag name -> source column. An empty column means the tag
    /// value is supplied externally rather than read from the row.
    pub tag_fields: BTreeMap<String, String>,
}

impl SeriesDefinition {
    /// Create a definition with no tags
    pub fn new(
        name: impl Into<String>,
        database: impl Into<String>,
        query: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            database: database.into(),
            query: query.into(),
            tag_fields: BTreeMap::new(),
        }
    }

    /// Map a logical tag to a source column
    pub fn with_tag(mut self, tag: impl Into<String>, column: impl Into<String>) -> Self {
        self.tag_fields.insert(tag.into(), column.into());
        self
    }

    /// Tags whose value comes from outside the row
    pub fn external_tags(&self) -> impl Iterator<Item = &str> {
        self.tag_fields
            .iter()
            .filter(|(_, column)| column.is_empty())
            .map(|(tag, _)| tag.as_str())
    }
}

/// Immutable name -> definition mapping
#[derive(Debug, Clone, Default)]
pub struct SeriesRegistry {
    series: BTreeMap<String, SeriesDefinition>,
}

impl SeriesRegistry {
    /// Create a new registry builder
    pub fn builder() -> SeriesRegistryBuilder {
        SeriesRegistryBuilder::default()
    }

    /// Look up a series by name
    pub fn lookup(&self, name: &str) -> Option<&SeriesDefinition> {
        self.series.get(name)
    }

    /// All registered series names, sorted
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(|s| s.as_str())
    }

    /// All definitions, sorted by name
    pub fn iter(&self) -> impl Iterator<Item = &SeriesDefinition> {
        self.series.values()
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Resolve a subset of series by name, preserving the requested order.
    ///
    /// An empty selection means every registered series.
    pub fn select(&self, names: &[String]) -> Result<Vec<&SeriesDefinition>> {
        if names.is_empty() {
            return Ok(self.iter().collect());
        }
        names
            .iter()
            .map(|name| {
                self.lookup(name).ok_or_else(|| {
                    Error::Config(format!(
                        "unknown series '{}'; registered series are: {}",
                        name,
                        self.names().collect::<Vec<_>>().join(", ")
                    ))
                })
            })
            .collect()
    }

    /// The control-plane series: hypervisors, projects, instances, flavours,
    /// images and volumes.
    pub fn openstack_defaults() -> Self {
        Self {
            series: [
                SeriesDefinition::new("hypervisors", "nova", queries::HYPERVISORS)
                    .with_tag("node", ""),
                SeriesDefinition::new("projects", "keystone", queries::PROJECTS)
                    .with_tag("project_id", "project_id"),
                // Several of these columns are not produced by the query and
                // therefore never become tags.
                SeriesDefinition::new("instances", "nova", queries::INSTANCES)
                    .with_tag("instance_id", "instance_id")
                    .with_tag("project_id", "project_id")
                    .with_tag("node", "availability_zone")
                    .with_tag("flavour_id", "flavourid")
                    .with_tag("image_id", "imageid")
                    .with_tag("hypervisor_id", "hypervisor_id")
                    .with_tag("user_id", "user_id"),
                SeriesDefinition::new("flavours", "nova", queries::FLAVOURS)
                    .with_tag("flavour_id", "flavour_id"),
                SeriesDefinition::new("images", "glance", queries::IMAGES)
                    .with_tag("image_id", "image_id")
                    .with_tag("project_id", "project_id"),
                SeriesDefinition::new("volumes", "cinder", queries::VOLUMES)
                    .with_tag("volume_id", "volume_id")
                    .with_tag("project_id", "project_id")
                    .with_tag("node", "availability_zone"),
            ]
            .into_iter()
            .map(|def| (def.name.clone(), def))
            .collect(),
        }
    }
}

/// Builder for SeriesRegistry
#[derive(Debug, Default)]
pub struct SeriesRegistryBuilder {
    series: Vec<SeriesDefinition>,
}

impl SeriesRegistryBuilder {
    /// Add a series definition
    pub fn with_series(mut self, definition: SeriesDefinition) -> Self {
        self.series.push(definition);
        self
    }

    /// Build the registry, rejecting empty or duplicate names
    pub fn build(self) -> Result<SeriesRegistry> {
        let mut series = BTreeMap::new();
        for definition in self.series {
            if definition.name.trim().is_empty() {
                return Err(Error::Config("series name cannot be empty".to_string()));
            }
            if series.contains_key(&definition.name) {
                return Err(Error::Config(format!(
                    "series '{}' is registered twice",
                    definition.name
                )));
            }
            series.insert(definition.name.clone(), definition);
        }
        Ok(SeriesRegistry { series })
    }
}
