//! Directory entities.
//!
//! A node publishes one [`DirectoryRecord`] describing all of its
//! processing units; the record is the single value written under the
//! node's own address in the replicated store. Matching a message against
//! the directory yields one [`MatchResult`] per matching unit.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cluster::NodeAddress;
use crate::pattern::Pattern;

/// Address-independent path of a processing unit: `<node-id>/<unit-id>`.
///
/// The path stays valid wherever the owning node binds its transport, so
/// directory records never embed physical addresses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitPath(String);

impl UnitPath {
    /// Build a unit path from its node and unit components.
    pub fn new(node_id: &str, unit_id: &str) -> Self {
        Self(format!("{node_id}/{unit_id}"))
    }

    /// The string form of the path.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The node component of the path.
    #[must_use]
    pub fn node_id(&self) -> &str {
        self.0.split_once('/').map_or(self.0.as_str(), |(n, _)| n)
    }

    /// The unit component of the path.
    #[must_use]
    pub fn unit_id(&self) -> &str {
        self.0.split_once('/').map_or("", |(_, u)| u)
    }
}

impl fmt::Display for UnitPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One addressable message handler, as advertised in the directory.
///
/// Immutable once published; republishing the owning node's record is the
/// only way to change it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingUnitDescriptor {
    /// Node-local unit identifier.
    pub unit_id: String,
    /// Address-independent path used for delivery.
    pub path: UnitPath,
    /// Advertised patterns, in registration order.
    pub patterns: Vec<Pattern>,
    /// Trust weight for tie-breaks; 1 = fully trusted, larger = less trusted.
    pub mistrust_factor: u32,
}

/// The set of processing units published by one node.
///
/// Written with overwrite semantics under the owning node's address, never
/// merged: the owner is the only writer of its key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryRecord {
    /// The owning node.
    pub node: NodeAddress,
    /// Units published by the owning node.
    pub units: Vec<ProcessingUnitDescriptor>,
}

/// Outcome of matching a message against one published unit.
///
/// Computed per dispatch, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    /// Delivery path of the matching unit.
    pub path: UnitPath,
    /// Conjunct count of the matched pattern; 0 for secondary matches.
    pub score: u32,
    /// Trust weight of the matching unit.
    pub mistrust_factor: u32,
    /// Whether the unit matched through a secondary pattern.
    pub secondary: bool,
}
