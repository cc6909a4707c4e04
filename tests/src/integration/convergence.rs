//! Readiness gating and directory convergence scenarios.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;

    use mesh_directory::{ConvergenceWatcher, DirectorySettings, PatternDirectory};
    use mesh_runtime::{PatternActionsRegistry, StartError};
    use mesh_store::{Consistency, InMemoryReplicatedStore, ReplicatedStore};
    use mesh_types::{
        DirectoryRecord, Message, NodeAddress, Pattern, ProcessingUnitDescriptor, UnitPath,
    };

    use crate::integration::{fast_config, TestMesh};

    /// Encode a peer record the way publish does.
    fn record_for(node: &str) -> Vec<u8> {
        let record = DirectoryRecord {
            node: NodeAddress::new(node),
            units: vec![ProcessingUnitDescriptor {
                unit_id: "unit".to_owned(),
                path: UnitPath::new(node, "unit"),
                patterns: vec![Pattern::new(&["/ping"]).unwrap()],
                mistrust_factor: 1,
            }],
        };
        bincode::serialize(&record).expect("record encodes")
    }

    fn fast_settings() -> DirectorySettings {
        DirectorySettings {
            gossip_time_frame: Duration::from_millis(10),
            store_attempt_count: 3,
        }
    }

    #[tokio::test]
    async fn test_ready_needs_both_local_and_quorum_visible_records() {
        // Store gossip is far slower than the test: locally invisible
        // records stay invisible unless written at quorum.
        let store = InMemoryReplicatedStore::with_gossip_delay(Duration::from_secs(120));
        let mesh = TestMesh::with_store(store.clone());

        let observer = mesh.cluster.join("n1", vec![]);
        let _peer2 = mesh.cluster.join("n2", vec![]);
        let _peer3 = mesh.cluster.join("n3", vec![]);

        // n2's record has fully propagated: readable by a local read.
        store
            .replica(NodeAddress::new("n2"))
            .write("n2", record_for("n2"), Consistency::Quorum)
            .await
            .unwrap();

        let directory = Arc::new(PatternDirectory::new(
            Arc::new(store.replica(NodeAddress::new("n1"))),
            NodeAddress::new("n1"),
            fast_settings(),
        ));
        let watcher = ConvergenceWatcher::spawn(
            Arc::clone(&directory),
            Arc::new(observer),
            Duration::from_millis(10),
        );

        // n3 has not published at all yet: no amount of escalation helps.
        assert!(watcher.await_ready(3).await.is_err());
        assert!(!watcher.is_ready());

        // n3 publishes through its own lagging replica: n1's local read
        // misses for another two minutes, the quorum escalation hits now.
        store
            .replica(NodeAddress::new("n3"))
            .write("n3", record_for("n3"), Consistency::Local)
            .await
            .unwrap();

        watcher.await_ready(20).await.unwrap();
        assert!(watcher.is_ready());
        watcher.shutdown().await;
    }

    #[tokio::test]
    async fn test_peer_leaving_before_publication_unblocks_watcher() {
        let mesh = TestMesh::new();
        let observer = mesh.cluster.join("n2", vec![]);
        let _n1 = mesh.cluster.join("n1", vec![]);

        let directory = Arc::new(PatternDirectory::new(
            Arc::new(mesh.store.replica(NodeAddress::new("n2"))),
            NodeAddress::new("n2"),
            fast_settings(),
        ));
        let watcher = ConvergenceWatcher::spawn(
            Arc::clone(&directory),
            Arc::new(observer),
            Duration::from_millis(10),
        );
        assert!(!watcher.is_ready());

        // n1 leaves before its record was ever readable here. The watch
        // set drops it without a read; removing the absent record is a
        // no-op that still succeeds.
        mesh.cluster.remove(&NodeAddress::new("n1"));
        watcher.await_ready(20).await.unwrap();
        assert!(mesh.store.is_empty());
        watcher.shutdown().await;
    }

    #[tokio::test]
    async fn test_startup_aborts_when_peer_never_publishes() {
        let mesh = TestMesh::new();
        let mut config = fast_config("n1");
        config.gossip_sync_attempt_count = 3;
        let n1 = mesh.node(config);
        // n2 joins the cluster but never starts its system.
        let _n2 = mesh.node(fast_config("n2"));

        let mut registry = PatternActionsRegistry::new();
        registry.add_handler(
            Pattern::new(&["/ping"]).unwrap(),
            Arc::new(crate::integration::support::Ack),
            "ping",
        );

        let err = n1.start(registry).await.unwrap_err();
        assert!(matches!(err, StartError::NotReady(_)));
        // The aborted node must not answer dispatches as if it were up.
        assert!(!n1.system().is_ready());
    }

    #[tokio::test]
    async fn test_departed_node_record_purged_end_to_end() {
        let mesh = TestMesh::new();
        let n1 = mesh.node(fast_config("n1"));
        let n2 = mesh.node(fast_config("n2"));

        let mut reg1 = PatternActionsRegistry::new();
        reg1.add_handler(
            Pattern::new(&["/keepalive"]).unwrap(),
            Arc::new(crate::integration::support::Ack),
            "keeper",
        );
        let mut reg2 = PatternActionsRegistry::new();
        reg2.add_handler(
            Pattern::new(&["/ping"]).unwrap(),
            Arc::new(crate::integration::support::Ack),
            "pinger",
        );

        let (r1, r2) = tokio::join!(n1.start(reg1), n2.start(reg2));
        r1.unwrap();
        r2.unwrap();

        let ping = Message::json(&json!({"ping": true}));
        let matches = n1.system().directory().match_message(&ping).await.unwrap();
        assert_eq!(matches.len(), 1, "n2's unit is matchable while n2 is up");

        n2.shutdown().await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        // n1's watcher saw the removal and purged n2's record.
        let replica = mesh.store.replica(NodeAddress::new("n1"));
        assert_eq!(replica.read("n2", Consistency::Quorum).await.unwrap(), None);
        let matches = n1.system().directory().match_message(&ping).await.unwrap();
        assert!(matches.is_empty());

        n1.shutdown().await;
    }
}
