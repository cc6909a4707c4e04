//! Cluster membership driven port.
//!
//! The membership provider (discovery, failure detection, gossip of member
//! state) is an external collaborator; the mesh consumes the member set and
//! the join/leave event stream through this interface.

use tokio::sync::broadcast;

use mesh_types::{ClusterEvent, ClusterNode, NodeAddress};

/// Abstract interface to the cluster membership provider.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; the watcher and the composition
/// root share one handle.
pub trait ClusterMembership: Send + Sync {
    /// The address of the local node.
    fn self_address(&self) -> NodeAddress;

    /// Snapshot of the current member set.
    fn current_members(&self) -> Vec<ClusterNode>;

    /// Subscribe to membership events.
    ///
    /// Events published before the subscription are not replayed; callers
    /// reconcile against [`Self::current_members`] at startup.
    fn subscribe(&self) -> broadcast::Receiver<ClusterEvent>;
}
