//! Node configuration.
//!
//! Loaded from a TOML file or built programmatically. Timing parameters are
//! expressed in seconds on disk; the accessors expose [`Duration`]s.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading or storing configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read or written.
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid TOML for this schema.
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config could not be rendered to TOML.
    #[error("config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Node id must be non-empty and unique in the cluster.
    #[error("node id cannot be empty")]
    EmptyNodeId,
}

/// Per-unit deployment properties.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingUnitProps {
    /// Unit name, unique within the node.
    pub name: String,
    /// Trust weight for tie-breaks; normalized to at least 1.
    #[serde(default = "default_mistrust_factor")]
    pub mistrust_factor: u32,
}

impl ProcessingUnitProps {
    /// Create props with the default trust weight.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mistrust_factor: 1,
        }
    }
}

fn default_mistrust_factor() -> u32 {
    1
}

/// Complete node configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Node identifier, unique in the cluster.
    pub node_id: String,
    /// Logical name of the mesh this node joins.
    pub system_name: String,
    /// Roles assigned to this node, in addition to the mesh role.
    pub roles: Vec<String>,
    /// Replication latency estimate of the underlying store; the delay
    /// between read/poll retries.
    pub gossip_time_frame_secs: f64,
    /// Readiness poll attempts before startup is declared failed.
    pub gossip_sync_attempt_count: u32,
    /// Bounded attempts for store reads and writes.
    pub store_attempt_count: u32,
    /// Default timeout for request/response dispatch.
    pub ask_timeout_secs: f64,
    /// Deployed processing units.
    pub units: Vec<ProcessingUnitProps>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: "node1".to_owned(),
            system_name: "relay-mesh".to_owned(),
            roles: Vec::new(),
            gossip_time_frame_secs: 2.0,
            gossip_sync_attempt_count: 3,
            store_attempt_count: 3,
            ask_timeout_secs: 10.0,
            units: Vec::new(),
        }
    }
}

impl NodeConfig {
    /// Create a configuration for the given node id, defaults elsewhere.
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            ..Self::default()
        }
    }

    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&raw)?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Write configuration to a TOML file.
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let raw = toml::to_string_pretty(self)?;
        std::fs::write(path, raw)?;
        Ok(())
    }

    /// Validate structural requirements.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node_id.is_empty() {
            return Err(ConfigError::EmptyNodeId);
        }
        Ok(())
    }

    /// Clamp every configured trust weight to at least 1.
    pub fn normalize(&mut self) {
        for unit in &mut self.units {
            unit.mistrust_factor = unit.mistrust_factor.max(1);
        }
    }

    /// Register or replace deployment properties for a unit.
    pub fn set_unit_props(&mut self, mut props: ProcessingUnitProps) {
        props.mistrust_factor = props.mistrust_factor.max(1);
        if let Some(existing) = self.units.iter_mut().find(|u| u.name == props.name) {
            *existing = props;
        } else {
            self.units.push(props);
        }
    }

    /// Deployment properties of a unit, if configured.
    #[must_use]
    pub fn unit_props(&self, unit_id: &str) -> Option<&ProcessingUnitProps> {
        self.units.iter().find(|u| u.name == unit_id)
    }

    /// Trust weight of a unit; unconfigured units are fully trusted.
    #[must_use]
    pub fn mistrust_factor(&self, unit_id: &str) -> u32 {
        self.unit_props(unit_id).map_or(1, |u| u.mistrust_factor.max(1))
    }

    /// The gossip time-frame as a duration.
    #[must_use]
    pub fn gossip_time_frame(&self) -> Duration {
        Duration::from_secs_f64(self.gossip_time_frame_secs)
    }

    /// The ask timeout as a duration.
    #[must_use]
    pub fn ask_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.ask_timeout_secs)
    }

    /// Trust weights indexed by unit name, for publication.
    #[must_use]
    pub fn mistrust_factors(&self) -> HashMap<String, u32> {
        self.units
            .iter()
            .map(|u| (u.name.clone(), u.mistrust_factor.max(1)))
            .collect()
    }
}
