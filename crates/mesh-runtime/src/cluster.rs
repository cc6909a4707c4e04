//! In-process cluster membership.
//!
//! Reference implementation of the membership collaborator for a
//! single-process mesh: every node of the process joins one
//! [`LocalCluster`], which tracks the member set and broadcasts join/leave
//! events. Distributed deployments plug a real membership provider behind
//! the same [`ClusterMembership`] port.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::broadcast;
use tracing::{debug, info};

use mesh_directory::ClusterMembership;
use mesh_types::{ClusterEvent, ClusterNode, MemberStatus, NodeAddress, MESH_ROLE};

/// Events buffered per subscriber before the oldest are dropped.
const EVENT_CHANNEL_CAPACITY: usize = 256;

struct Shared {
    members: RwLock<HashMap<NodeAddress, ClusterNode>>,
    events: broadcast::Sender<ClusterEvent>,
}

/// The cluster-wide membership state.
///
/// Clone-cheap: handles share state through an [`Arc`].
#[derive(Clone)]
pub struct LocalCluster {
    shared: Arc<Shared>,
}

impl LocalCluster {
    /// Create an empty cluster.
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                members: RwLock::new(HashMap::new()),
                events,
            }),
        }
    }

    /// Join a node to the cluster in the `Up` state and announce it.
    ///
    /// The mesh role is always added to the given roles. Returns the
    /// membership handle through which the node sees the cluster.
    pub fn join(
        &self,
        address: impl Into<NodeAddress>,
        roles: impl IntoIterator<Item = String>,
    ) -> LocalClusterHandle {
        let address = address.into();
        let mut node = ClusterNode::up(address.clone(), roles);
        node.roles.insert(MESH_ROLE.to_owned());

        if let Ok(mut members) = self.shared.members.write() {
            members.insert(address.clone(), node.clone());
        }
        info!(node = %address, "Member up");
        let _ = self.shared.events.send(ClusterEvent::MemberUp(node));

        LocalClusterHandle {
            shared: Arc::clone(&self.shared),
            self_address: address,
        }
    }

    /// Record a node that is still joining; no event is announced until it
    /// reaches `Up`.
    pub fn add_joining(&self, address: impl Into<NodeAddress>) {
        let address = address.into();
        let mut node = ClusterNode::up(address.clone(), Vec::new());
        node.status = MemberStatus::Joining;
        node.roles.insert(MESH_ROLE.to_owned());
        if let Ok(mut members) = self.shared.members.write() {
            members.insert(address, node);
        }
    }

    /// Remove a node from the cluster and announce the removal with the
    /// status it held at that moment.
    pub fn remove(&self, address: &NodeAddress) {
        let removed = self
            .shared
            .members
            .write()
            .ok()
            .and_then(|mut members| members.remove(address));
        let Some(node) = removed else {
            debug!(node = %address, "Removal of unknown member ignored");
            return;
        };
        let previous_status = node.status;
        let mut node = node;
        node.status = MemberStatus::Removed;
        info!(node = %address, ?previous_status, "Member removed");
        let _ = self.shared.events.send(ClusterEvent::MemberRemoved {
            node,
            previous_status,
        });
    }

    /// Snapshot of the current member set.
    #[must_use]
    pub fn members(&self) -> Vec<ClusterNode> {
        self.shared
            .members
            .read()
            .map_or_else(|_| Vec::new(), |members| members.values().cloned().collect())
    }
}

impl Default for LocalCluster {
    fn default() -> Self {
        Self::new()
    }
}

/// One node's view of the cluster.
pub struct LocalClusterHandle {
    shared: Arc<Shared>,
    self_address: NodeAddress,
}

impl ClusterMembership for LocalClusterHandle {
    fn self_address(&self) -> NodeAddress {
        self.self_address.clone()
    }

    fn current_members(&self) -> Vec<ClusterNode> {
        self.shared
            .members
            .read()
            .map_or_else(|_| Vec::new(), |members| members.values().cloned().collect())
    }

    fn subscribe(&self) -> broadcast::Receiver<ClusterEvent> {
        self.shared.events.subscribe()
    }
}
