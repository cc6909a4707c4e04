//! # Mesh Types - Shared Domain Types
//!
//! Defines the types shared by every mesh subsystem: cluster membership,
//! message patterns, wire messages, processing-unit descriptors, directory
//! records and node configuration.
//!
//! The matching model is content-based: a message is never addressed to a
//! fixed destination. Instead each processing unit advertises one or more
//! [`Pattern`]s, and the dispatcher resolves receivers at send time by
//! matching the message structure against every published pattern.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod cluster;
pub mod config;
pub mod entities;
pub mod message;
pub mod pattern;

// Re-export main types
pub use cluster::{ClusterEvent, ClusterNode, MemberStatus, NodeAddress};
pub use config::{ConfigError, NodeConfig, ProcessingUnitProps};
pub use entities::{DirectoryRecord, MatchResult, ProcessingUnitDescriptor, UnitPath};
pub use message::{ContentType, Message, MessageError};
pub use pattern::{Conjunct, Pattern, PatternError};

/// The cluster role carried by every node that participates in the mesh.
///
/// Membership events for nodes without this role are ignored by the
/// convergence watcher.
pub const MESH_ROLE: &str = "_mesh_";

/// Build the cluster-unique name of a processing unit.
#[must_use]
pub fn processing_unit_name(node_id: &str, unit_id: &str) -> String {
    format!("{node_id}_{unit_id}")
}
