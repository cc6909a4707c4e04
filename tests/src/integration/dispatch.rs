//! Routing scenarios: score precedence, secondary isolation, tie-breaks.

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::{json, Value};

    use mesh_runtime::{
        DispatchError, HandlerError, MessageHandler, PatternActionsRegistry, UnitContext,
    };
    use mesh_types::{Message, Pattern, ProcessingUnitProps};

    use crate::integration::{fast_config, TestMesh};

    /// Counts deliveries and optionally answers with a fixed body.
    struct Recording {
        count: Arc<AtomicU32>,
        reply: Option<Value>,
    }

    impl Recording {
        fn new(count: &Arc<AtomicU32>) -> Arc<Self> {
            Arc::new(Self {
                count: Arc::clone(count),
                reply: None,
            })
        }

        fn replying(count: &Arc<AtomicU32>, reply: Value) -> Arc<Self> {
            Arc::new(Self {
                count: Arc::clone(count),
                reply: Some(reply),
            })
        }
    }

    #[async_trait]
    impl MessageHandler for Recording {
        async fn handle(
            &self,
            message: &Message,
            _ctx: &mut UnitContext<'_>,
        ) -> Result<Option<Message>, HandlerError> {
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(self.reply.as_ref().map(|body| message.reply_with(body)))
        }
    }

    /// Answers after a delay longer than short ask timeouts.
    struct Slow;

    #[async_trait]
    impl MessageHandler for Slow {
        async fn handle(
            &self,
            message: &Message,
            _ctx: &mut UnitContext<'_>,
        ) -> Result<Option<Message>, HandlerError> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(Some(message.reply_with(&json!({"late": true}))))
        }
    }

    async fn drain() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn test_higher_score_wins_and_loser_not_notified() {
        let mesh = TestMesh::new();
        let n1 = mesh.node(fast_config("n1"));
        let n2 = mesh.node(fast_config("n2"));

        let specific = Arc::new(AtomicU32::new(0));
        let broad = Arc::new(AtomicU32::new(0));

        let mut reg1 = PatternActionsRegistry::new();
        reg1.add_handler(
            Pattern::new(&["/order/id", "/order/side=buy"]).unwrap(),
            Recording::replying(&specific, json!({"handled": "specific"})),
            "specific",
        );
        let mut reg2 = PatternActionsRegistry::new();
        reg2.add_handler(
            Pattern::new(&["/order/id"]).unwrap(),
            Recording::new(&broad),
            "broad",
        );

        let (r1, r2) = tokio::join!(n1.start(reg1), n2.start(reg2));
        r1.unwrap();
        r2.unwrap();

        let buy = Message::json(&json!({"order": {"id": 1, "side": "buy"}}));
        n1.system().send(buy, None).await.unwrap();
        drain().await;

        // The two-conjunct match outranks the one-conjunct match; the
        // losing primary candidate receives nothing.
        assert_eq!(specific.load(Ordering::SeqCst), 1);
        assert_eq!(broad.load(Ordering::SeqCst), 0);

        // A sell order only satisfies the broad pattern.
        let sell = Message::json(&json!({"order": {"id": 2, "side": "sell"}}));
        n1.system().send(sell, None).await.unwrap();
        drain().await;
        assert_eq!(specific.load(Ordering::SeqCst), 1);
        assert_eq!(broad.load(Ordering::SeqCst), 1);

        n1.shutdown().await;
        n2.shutdown().await;
    }

    #[tokio::test]
    async fn test_ask_routed_to_best_score() {
        let mesh = TestMesh::new();
        let n1 = mesh.node(fast_config("n1"));
        let n2 = mesh.node(fast_config("n2"));

        let specific = Arc::new(AtomicU32::new(0));
        let broad = Arc::new(AtomicU32::new(0));

        let mut reg1 = PatternActionsRegistry::new();
        reg1.add_handler(
            Pattern::new(&["/order/id", "/order/side=buy"]).unwrap(),
            Recording::replying(&specific, json!({"filled": true})),
            "specific",
        );
        let mut reg2 = PatternActionsRegistry::new();
        reg2.add_handler(
            Pattern::new(&["/order/id"]).unwrap(),
            Recording::replying(&broad, json!({"filled": false})),
            "broad",
        );

        let (r1, r2) = tokio::join!(n1.start(reg1), n2.start(reg2));
        r1.unwrap();
        r2.unwrap();

        let request = Message::json(&json!({"order": {"id": 1, "side": "buy"}}));
        let response = n2
            .system()
            .ask(request.clone(), None, None)
            .await
            .unwrap()
            .expect("a primary receiver exists");
        assert_eq!(response.structure().unwrap()["filled"], true);
        assert_eq!(response.correlation_id(), request.correlation_id());
        assert_eq!(broad.load(Ordering::SeqCst), 0);

        n1.shutdown().await;
        n2.shutdown().await;
    }

    #[tokio::test]
    async fn test_secondary_observes_but_is_never_asked() {
        let mesh = TestMesh::new();
        let n1 = mesh.node(fast_config("n1"));

        let audits = Arc::new(AtomicU32::new(0));
        let mut registry = PatternActionsRegistry::new();
        registry.add_handler(
            Pattern::secondary(&["/order/id"]).unwrap(),
            Recording::replying(&audits, json!({"should": "never-arrive"})),
            "audit",
        );
        n1.start(registry).await.unwrap();

        let message = Message::json(&json!({"order": {"id": 3}}));

        // Fire-and-forget proceeds without a primary.
        n1.system().send(message.clone(), None).await.unwrap();
        drain().await;
        assert_eq!(audits.load(Ordering::SeqCst), 1);

        // Ask returns immediately with no response instead of blocking on
        // a receiver that is never eligible.
        let response = n1.system().ask(message, None, None).await.unwrap();
        assert!(response.is_none());
        drain().await;
        assert_eq!(audits.load(Ordering::SeqCst), 2);

        n1.shutdown().await;
    }

    #[tokio::test]
    async fn test_secondary_gets_copy_alongside_primary() {
        let mesh = TestMesh::new();
        let n1 = mesh.node(fast_config("n1"));
        let n2 = mesh.node(fast_config("n2"));

        let workers = Arc::new(AtomicU32::new(0));
        let audits = Arc::new(AtomicU32::new(0));

        let mut reg1 = PatternActionsRegistry::new();
        reg1.add_handler(
            Pattern::new(&["/order/id"]).unwrap(),
            Recording::new(&workers),
            "worker",
        );
        let mut reg2 = PatternActionsRegistry::new();
        reg2.add_handler(
            Pattern::secondary(&["/order/id"]).unwrap(),
            Recording::new(&audits),
            "audit",
        );

        let (r1, r2) = tokio::join!(n1.start(reg1), n2.start(reg2));
        r1.unwrap();
        r2.unwrap();

        n1.system()
            .send(Message::json(&json!({"order": {"id": 4}})), None)
            .await
            .unwrap();
        drain().await;
        assert_eq!(workers.load(Ordering::SeqCst), 1);
        assert_eq!(audits.load(Ordering::SeqCst), 1);

        n1.shutdown().await;
        n2.shutdown().await;
    }

    #[tokio::test]
    async fn test_only_primary_can_answer_the_sender() {
        use mesh_runtime::{Action, ProcessingUnit, UnitSpec};
        use mesh_types::UnitPath;

        let mesh = TestMesh::new();
        let n1 = mesh.node(fast_config("n1"));

        let primaries = Arc::new(AtomicU32::new(0));
        let audits = Arc::new(AtomicU32::new(0));
        let mut registry = PatternActionsRegistry::new();
        registry.add_handler(
            Pattern::new(&["/order/id"]).unwrap(),
            Recording::replying(&primaries, json!({"from": "worker"})),
            "worker",
        );
        registry.add_handler(
            Pattern::secondary(&["/order/id"]).unwrap(),
            Recording::replying(&audits, json!({"from": "audit"})),
            "audit",
        );
        n1.start(registry).await.unwrap();

        // A probe unit acts as the originator; replies land in its mailbox.
        let received = Arc::new(AtomicU32::new(0));
        let probe = ProcessingUnit::spawn(
            UnitSpec {
                unit_id: "probe".to_owned(),
                path: UnitPath::new("n1", "probe"),
                actions: vec![(
                    Pattern::new(&["/from"]).unwrap(),
                    Action::Handler(Recording::new(&received)),
                )],
                resource_ctor: None,
            },
            None,
        );
        let sender = probe.receiver().as_sender();

        n1.system()
            .send(Message::json(&json!({"order": {"id": 11}})), Some(sender))
            .await
            .unwrap();
        drain().await;

        // Both receivers processed the message...
        assert_eq!(primaries.load(Ordering::SeqCst), 1);
        assert_eq!(audits.load(Ordering::SeqCst), 1);
        // ...but only the primary's answer reached the originator: the
        // secondary held a read-only sender.
        assert_eq!(received.load(Ordering::SeqCst), 1);

        probe.stop().await;
        n1.shutdown().await;
    }

    #[tokio::test]
    async fn test_no_receiver_fails_immediately() {
        let mesh = TestMesh::new();
        let n1 = mesh.node(fast_config("n1"));

        let count = Arc::new(AtomicU32::new(0));
        let mut registry = PatternActionsRegistry::new();
        registry.add_handler(
            Pattern::new(&["/order/id"]).unwrap(),
            Recording::new(&count),
            "worker",
        );
        n1.start(registry).await.unwrap();

        let unmatched = Message::json(&json!({"invoice": {"id": 9}}));
        let err = n1.system().send(unmatched.clone(), None).await.unwrap_err();
        assert!(matches!(err, DispatchError::NoReceiver));

        let err = n1.system().ask(unmatched, None, None).await.unwrap_err();
        assert!(matches!(err, DispatchError::NoReceiver));
        assert_eq!(count.load(Ordering::SeqCst), 0);

        n1.shutdown().await;
    }

    #[tokio::test]
    async fn test_tie_break_prefers_trusted_unit() {
        let mesh = TestMesh::new();
        let n1 = mesh.node(fast_config("n1"));
        let mut config2 = fast_config("n2");
        config2.set_unit_props(ProcessingUnitProps {
            name: "worker".to_owned(),
            mistrust_factor: 3,
        });
        let n2 = mesh.node(config2);

        let trusted = Arc::new(AtomicU32::new(0));
        let mistrusted = Arc::new(AtomicU32::new(0));

        let mut reg1 = PatternActionsRegistry::new();
        reg1.add_handler(
            Pattern::new(&["/job/id"]).unwrap(),
            Recording::new(&trusted),
            "worker",
        );
        let mut reg2 = PatternActionsRegistry::new();
        reg2.add_handler(
            Pattern::new(&["/job/id"]).unwrap(),
            Recording::new(&mistrusted),
            "worker",
        );

        let (r1, r2) = tokio::join!(n1.start(reg1), n2.start(reg2));
        r1.unwrap();
        r2.unwrap();

        const ROUNDS: u32 = 400;
        for i in 0..ROUNDS {
            n1.system()
                .send(Message::json(&json!({"job": {"id": i}})), None)
                .await
                .unwrap();
        }
        drain().await;

        let trusted_count = trusted.load(Ordering::SeqCst);
        let mistrusted_count = mistrusted.load(Ordering::SeqCst);
        // Every send reaches exactly one of the tied receivers.
        assert_eq!(trusted_count + mistrusted_count, ROUNDS);
        // Factor 1 vs 3: the trusted unit should win about three times as
        // often; both must be exercised.
        assert!(
            trusted_count > mistrusted_count,
            "trusted={trusted_count} mistrusted={mistrusted_count}"
        );
        assert!(mistrusted_count > 0);

        n1.shutdown().await;
        n2.shutdown().await;
    }

    #[tokio::test]
    async fn test_ask_timeout_surfaces() {
        let mesh = TestMesh::new();
        let n1 = mesh.node(fast_config("n1"));

        let mut registry = PatternActionsRegistry::new();
        registry.add_handler(Pattern::new(&["/slow"]).unwrap(), Arc::new(Slow), "slow");
        n1.start(registry).await.unwrap();

        let err = n1
            .system()
            .ask(
                Message::json(&json!({"slow": true})),
                None,
                Some(Duration::from_millis(20)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::AskTimeout(_)));

        n1.shutdown().await;
    }
}
