//! Cross-crate integration scenarios.

pub mod convergence;
pub mod dispatch;
pub mod lifecycle;

use std::sync::Arc;

use mesh_node::NodeRuntime;
use mesh_runtime::{LocalCluster, LocalTransport};
use mesh_store::InMemoryReplicatedStore;
use mesh_types::NodeConfig;

/// Shared in-process collaborators for a simulated multi-node mesh.
pub struct TestMesh {
    pub cluster: LocalCluster,
    pub store: InMemoryReplicatedStore,
    pub transport: Arc<LocalTransport>,
}

impl TestMesh {
    /// A mesh whose store propagates instantly.
    pub fn new() -> Self {
        Self::with_store(InMemoryReplicatedStore::new())
    }

    /// A mesh on a specific store (e.g. one with gossip lag).
    pub fn with_store(store: InMemoryReplicatedStore) -> Self {
        Self {
            cluster: LocalCluster::new(),
            store,
            transport: Arc::new(LocalTransport::new()),
        }
    }

    /// Wire a node runtime into this mesh.
    pub fn node(&self, config: NodeConfig) -> NodeRuntime {
        NodeRuntime::builder(config)
            .cluster(self.cluster.clone())
            .store(self.store.clone())
            .transport(Arc::clone(&self.transport))
            .build()
            .expect("valid test config")
    }
}

/// Handlers shared across scenario modules.
pub mod support {
    use async_trait::async_trait;
    use serde_json::json;

    use mesh_runtime::{HandlerError, MessageHandler, UnitContext};
    use mesh_types::Message;

    /// Acknowledges every delivery with `{"ack": true}`.
    pub struct Ack;

    #[async_trait]
    impl MessageHandler for Ack {
        async fn handle(
            &self,
            message: &Message,
            _ctx: &mut UnitContext<'_>,
        ) -> Result<Option<Message>, HandlerError> {
            Ok(Some(message.reply_with(&json!({"ack": true}))))
        }
    }
}

/// A node config with test-friendly timing.
pub fn fast_config(node_id: &str) -> NodeConfig {
    let mut config = NodeConfig::new(node_id);
    config.gossip_time_frame_secs = 0.01;
    config.gossip_sync_attempt_count = 20;
    config.ask_timeout_secs = 2.0;
    config
}
