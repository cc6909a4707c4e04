//! Cluster membership types.
//!
//! The membership provider itself (node discovery, failure detection) is an
//! external collaborator; these types describe what the mesh consumes from
//! it: the current member set and the join/leave event stream.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique address of a cluster member.
///
/// The address doubles as the directory record key: each node writes its
/// published processing units under its own address, which is what keeps the
/// replicated directory single-writer-per-key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeAddress(String);

impl NodeAddress {
    /// Create a node address from its string form.
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// The string form of the address.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeAddress {
    fn from(address: &str) -> Self {
        Self(address.to_owned())
    }
}

impl From<String> for NodeAddress {
    fn from(address: String) -> Self {
        Self(address)
    }
}

/// Lifecycle status of a cluster member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberStatus {
    /// Joining the cluster, not yet seen by all members.
    Joining,
    /// Full member, eligible to publish and receive.
    Up,
    /// Gracefully leaving.
    Leaving,
    /// Finished leaving, about to be removed.
    Exiting,
    /// Marked unreachable by failure detection.
    Down,
    /// Removed from the member set.
    Removed,
}

/// A cluster member as reported by the membership provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterNode {
    /// Unique address of the member.
    pub address: NodeAddress,
    /// Roles carried by the member.
    pub roles: BTreeSet<String>,
    /// Current lifecycle status.
    pub status: MemberStatus,
}

impl ClusterNode {
    /// Create a member entry in the `Up` state.
    pub fn up(address: impl Into<NodeAddress>, roles: impl IntoIterator<Item = String>) -> Self {
        Self {
            address: address.into(),
            roles: roles.into_iter().collect(),
            status: MemberStatus::Up,
        }
    }

    /// Whether the member carries the given role.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    /// Whether the member is a full cluster member.
    #[must_use]
    pub fn is_up(&self) -> bool {
        self.status == MemberStatus::Up
    }
}

/// Membership events consumed from the cluster provider.
#[derive(Debug, Clone)]
pub enum ClusterEvent {
    /// A member reached the `Up` state.
    MemberUp(ClusterNode),
    /// A member left the cluster.
    MemberRemoved {
        /// The removed member.
        node: ClusterNode,
        /// The member's status right before removal. A node removed while
        /// still `Joining` never published anything.
        previous_status: MemberStatus,
    },
}

impl ClusterEvent {
    /// The address the event refers to.
    #[must_use]
    pub fn address(&self) -> &NodeAddress {
        match self {
            ClusterEvent::MemberUp(node) => &node.address,
            ClusterEvent::MemberRemoved { node, .. } => &node.address,
        }
    }
}
