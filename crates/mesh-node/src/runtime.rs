//! Node runtime wiring.

use std::sync::Arc;

use tracing::info;

use mesh_runtime::{
    LocalCluster, LocalTransport, MessageSystem, PatternActionsRegistry, ScriptEngine, StartError,
};
use mesh_store::InMemoryReplicatedStore;
use mesh_types::{ConfigError, NodeAddress, NodeConfig};

/// Builder for a [`NodeRuntime`].
///
/// Several runtimes in one process share a mesh by sharing the same
/// cluster, store and transport; each builder call that is omitted gets a
/// fresh single-node instance.
pub struct NodeRuntimeBuilder {
    config: NodeConfig,
    cluster: Option<LocalCluster>,
    store: Option<InMemoryReplicatedStore>,
    transport: Option<Arc<LocalTransport>>,
    script_engine: Option<Arc<dyn ScriptEngine>>,
}

impl NodeRuntimeBuilder {
    /// Share an existing cluster.
    #[must_use]
    pub fn cluster(mut self, cluster: LocalCluster) -> Self {
        self.cluster = Some(cluster);
        self
    }

    /// Share an existing replicated store.
    #[must_use]
    pub fn store(mut self, store: InMemoryReplicatedStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Share an existing transport.
    #[must_use]
    pub fn transport(mut self, transport: Arc<LocalTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Wire the external script interpreter.
    #[must_use]
    pub fn script_engine(mut self, engine: Arc<dyn ScriptEngine>) -> Self {
        self.script_engine = Some(engine);
        self
    }

    /// Validate the configuration, join the cluster and wire the system.
    pub fn build(self) -> Result<NodeRuntime, ConfigError> {
        let mut config = self.config;
        config.normalize();
        config.validate()?;

        let cluster = self.cluster.unwrap_or_default();
        let store = self.store.unwrap_or_default();
        let transport = self.transport.unwrap_or_default();

        let address = NodeAddress::new(config.node_id.clone());
        let membership = Arc::new(cluster.join(address.clone(), config.roles.clone()));
        let replica = Arc::new(store.replica(address.clone()));

        let system = MessageSystem::new(
            config,
            replica,
            Arc::clone(&transport),
            membership,
            self.script_engine,
        );

        Ok(NodeRuntime {
            address,
            cluster,
            store,
            system,
        })
    }
}

/// One node's composition root.
///
/// Owns the message system and the node's cluster membership; dropping the
/// runtime without [`NodeRuntime::shutdown`] leaves the member registered,
/// so embedders keep the runtime alive for the node's whole life.
pub struct NodeRuntime {
    address: NodeAddress,
    cluster: LocalCluster,
    store: InMemoryReplicatedStore,
    system: MessageSystem,
}

impl NodeRuntime {
    /// Start building a runtime for the given configuration.
    #[must_use]
    pub fn builder(config: NodeConfig) -> NodeRuntimeBuilder {
        NodeRuntimeBuilder {
            config,
            cluster: None,
            store: None,
            transport: None,
            script_engine: None,
        }
    }

    /// The node's cluster address.
    #[must_use]
    pub fn address(&self) -> &NodeAddress {
        &self.address
    }

    /// The running message system.
    #[must_use]
    pub fn system(&self) -> &MessageSystem {
        &self.system
    }

    /// The cluster this node joined.
    #[must_use]
    pub fn cluster(&self) -> &LocalCluster {
        &self.cluster
    }

    /// The replicated store backing the directory.
    #[must_use]
    pub fn store(&self) -> &InMemoryReplicatedStore {
        &self.store
    }

    /// Start the message system with the node's registrations.
    pub async fn start(&self, registry: PatternActionsRegistry) -> Result<(), StartError> {
        self.system.start(registry).await
    }

    /// Stop the system and leave the cluster; peers purge this node's
    /// directory record on the resulting membership event.
    pub async fn shutdown(&self) {
        self.system.shutdown().await;
        self.cluster.remove(&self.address);
        info!(node = %self.address, "Node runtime shut down");
    }
}
