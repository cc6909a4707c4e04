//! Multi-node runtime lifecycle, cross-node dispatch and script actions.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::json;

    use mesh_node::echo;
    use mesh_runtime::{
        PatternActionsRegistry, ScriptEngine, ScriptError, StartError,
    };
    use mesh_types::{Message, Pattern};

    use crate::integration::{fast_config, support::Ack, TestMesh};

    /// A stand-in interpreter: understands one statement, `reply <text>`.
    struct StubEngine;

    #[async_trait]
    impl ScriptEngine for StubEngine {
        async fn run(
            &self,
            script: &str,
            message: &Message,
        ) -> Result<Option<Message>, ScriptError> {
            match script.strip_prefix("reply ") {
                Some(text) => Ok(Some(message.reply_with(&json!({ "scripted": text })))),
                None => Err(ScriptError::Failed(format!("unknown statement {script:?}"))),
            }
        }
    }

    #[tokio::test]
    async fn test_cross_node_ask_through_two_runtimes() {
        let mesh = TestMesh::new();
        let n1 = mesh.node(fast_config("n1"));
        let n2 = mesh.node(fast_config("n2"));

        let mut reg1 = PatternActionsRegistry::new();
        echo::register(&mut reg1).unwrap();
        let mut reg2 = PatternActionsRegistry::new();
        reg2.add_handler(Pattern::new(&["/status"]).unwrap(), Arc::new(Ack), "status");

        let (r1, r2) = tokio::join!(n1.start(reg1), n2.start(reg2));
        r1.unwrap();
        r2.unwrap();
        assert!(n1.system().is_ready());
        assert!(n2.system().is_ready());

        // n2 reaches n1's echo unit purely by message content.
        let response = n2
            .system()
            .ask(Message::json(&json!({"echo": "over there"})), None, None)
            .await
            .unwrap()
            .expect("echo is a primary receiver");
        assert_eq!(response.structure().unwrap()["echo"], "over there");

        // And n1 reaches n2's status unit the same way.
        let response = n1
            .system()
            .ask(Message::json(&json!({"status": {}})), None, None)
            .await
            .unwrap()
            .expect("status is a primary receiver");
        assert_eq!(response.structure().unwrap()["ack"], true);

        n1.shutdown().await;
        n2.shutdown().await;
    }

    #[tokio::test]
    async fn test_script_action_runs_through_engine() {
        let mesh = TestMesh::new();
        let n1 = mesh_node::NodeRuntime::builder(fast_config("s1"))
            .cluster(mesh.cluster.clone())
            .store(mesh.store.clone())
            .transport(Arc::clone(&mesh.transport))
            .script_engine(Arc::new(StubEngine))
            .build()
            .unwrap();

        let mut registry = PatternActionsRegistry::new();
        registry.add_script(
            Pattern::new(&["/greet/name"]).unwrap(),
            "reply hello",
            "greeter",
        );
        n1.start(registry).await.unwrap();

        let response = n1
            .system()
            .ask(Message::json(&json!({"greet": {"name": "ada"}})), None, None)
            .await
            .unwrap()
            .expect("greeter is a primary receiver");
        assert_eq!(response.structure().unwrap()["scripted"], "hello");

        n1.shutdown().await;
    }

    #[tokio::test]
    async fn test_script_actions_require_an_engine() {
        let mesh = TestMesh::new();
        let n1 = mesh.node(fast_config("n1"));

        let mut registry = PatternActionsRegistry::new();
        registry.add_script(Pattern::new(&["/greet"]).unwrap(), "reply hi", "greeter");

        let err = n1.start(registry).await.unwrap_err();
        assert!(matches!(err, StartError::MissingScriptEngine));
    }

    #[tokio::test]
    async fn test_restarted_node_republishes_over_old_record() {
        let mesh = TestMesh::new();
        let n1 = mesh.node(fast_config("n1"));

        let mut registry = PatternActionsRegistry::new();
        registry.add_handler(Pattern::new(&["/old"]).unwrap(), Arc::new(Ack), "worker");
        n1.start(registry).await.unwrap();
        n1.shutdown().await;

        // The node comes back with a different pattern set under the same
        // address: the overwrite replaces the old record wholesale.
        let n1 = mesh.node(fast_config("n1"));
        let mut registry = PatternActionsRegistry::new();
        registry.add_handler(Pattern::new(&["/new"]).unwrap(), Arc::new(Ack), "worker");
        n1.start(registry).await.unwrap();

        let old = Message::json(&json!({"old": 1}));
        let new = Message::json(&json!({"new": 1}));
        assert!(n1
            .system()
            .directory()
            .match_message(&old)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(
            n1.system().directory().match_message(&new).await.unwrap().len(),
            1
        );

        n1.shutdown().await;
    }
}
