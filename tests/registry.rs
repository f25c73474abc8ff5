use greenroom::config::{ConfigManager, NodeConfig};
use greenroom::event_bus::Event;
use greenroom::node::{NodeContext, NodeError, NodeHandler, NodePartial};
use greenroom::registry::{NodeRegistry, RegistryError};
use greenroom::state::StateSnapshot;
use greenroom::types::NodeId;
use async_trait::async_trait;

mod common;
use common::*;

fn events() -> (flume::Sender<Event>, flume::Receiver<Event>) {
    flume::unbounded()
}

#[tokio::test]
async fn execute_runs_handler_and_emits_execution_event() {
    init_tracing();
    let registry = NodeRegistry::new().with_handler("collect", ArticleNode::new("https://e.com/1"));
    let config = ConfigManager::new().with_node(NodeConfig::new("collect"));
    let (tx, rx) = events();

    let partial = registry
        .execute("collect", empty_snapshot(), &config, None, 1, tx)
        .await
        .unwrap();

    assert_eq!(partial.articles.as_ref().unwrap().len(), 1);

    let execution = rx
        .try_iter()
        .find_map(|event| match event {
            Event::Execution(e) => Some(e),
            _ => None,
        })
        .expect("execution event emitted");
    assert_eq!(execution.node_id, "collect");
    assert!(execution.success);
}

#[tokio::test]
async fn timeout_is_captured_not_raised() {
    init_tracing();
    let registry = NodeRegistry::new().with_handler("slow", SleepyNode);
    let config =
        ConfigManager::new().with_node(NodeConfig::new("slow").with_timeout_seconds(1));
    let (tx, rx) = events();

    let partial = registry
        .execute("slow", empty_snapshot(), &config, None, 3, tx)
        .await
        .unwrap();

    let errors = partial.errors.as_ref().expect("captured error");
    assert_eq!(errors.len(), 1);
    assert!(errors[0].is_timeout());
    assert!(errors[0].error.message.contains("timed out after 1s"));

    let control = partial.control.as_ref().expect("control update");
    assert!(
        control
            .last_error
            .as_ref()
            .unwrap()
            .as_ref()
            .unwrap()
            .contains("timed out")
    );

    let execution = rx
        .try_iter()
        .find_map(|event| match event {
            Event::Execution(e) => Some(e),
            _ => None,
        })
        .expect("execution event emitted");
    assert!(!execution.success);
}

#[tokio::test]
async fn handler_error_is_captured_not_raised() {
    let registry = NodeRegistry::new().with_handler("broken", FailingNode);
    let config = ConfigManager::new().with_node(NodeConfig::new("broken"));
    let (tx, _rx) = events();

    let partial = registry
        .execute("broken", empty_snapshot(), &config, None, 1, tx)
        .await
        .unwrap();

    let errors = partial.errors.as_ref().expect("captured error");
    assert!(errors[0].error.message.contains("missing expected input"));
    assert!(errors[0].tags.contains(&"handler".to_string()));
}

#[tokio::test]
async fn failing_node_does_not_abort_siblings() {
    let registry = NodeRegistry::new()
        .with_handler("a", ArticleNode::new("https://e.com/a"))
        .with_handler("broken", FailingNode)
        .with_handler("b", ArticleNode::new("https://e.com/b"));
    let config = ConfigManager::new()
        .with_node(NodeConfig::new("a"))
        .with_node(NodeConfig::new("broken"))
        .with_node(NodeConfig::new("b"));
    let (tx, _rx) = events();

    let ids = [
        NodeId::named("a"),
        NodeId::named("broken"),
        NodeId::named("b"),
    ];
    let result = registry
        .execute_many(&ids, empty_snapshot(), &config, 1, tx)
        .await
        .unwrap();

    // Outputs come back in requested order regardless of completion order.
    assert_eq!(result.ran, ids.to_vec());
    assert_eq!(result.outputs.len(), 3);

    let articles: usize = result
        .outputs
        .iter()
        .filter_map(|(_, p)| p.articles.as_ref().map(Vec::len))
        .sum();
    assert_eq!(articles, 2);

    let failed = &result.outputs[1].1;
    assert!(failed.errors.is_some());
}

#[tokio::test]
async fn virtual_and_disabled_nodes_are_skipped() {
    let registry = NodeRegistry::new().with_handler("a", ArticleNode::new("https://e.com/a"));
    let config = ConfigManager::new()
        .with_node(NodeConfig::new("a"))
        .with_node(NodeConfig::new("off").disabled());
    let (tx, _rx) = events();

    let ids = [NodeId::End, NodeId::named("off"), NodeId::named("a")];
    let result = registry
        .execute_many(&ids, empty_snapshot(), &config, 1, tx)
        .await
        .unwrap();

    assert_eq!(result.ran, vec![NodeId::named("a")]);
    assert_eq!(
        result.skipped,
        vec![NodeId::End, NodeId::named("off")]
    );
}

#[tokio::test]
async fn unknown_handler_fails_at_execution_time() {
    let registry = NodeRegistry::new();
    let config = ConfigManager::new().with_node(NodeConfig::new("ghost"));
    let (tx, _rx) = events();

    let err = registry
        .execute("ghost", empty_snapshot(), &config, None, 1, tx)
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::UnknownNode { .. }));
}

#[tokio::test]
async fn missing_config_fails_at_execution_time() {
    let registry = NodeRegistry::new().with_handler("a", NoopNode);
    let config = ConfigManager::new();
    let (tx, _rx) = events();

    let err = registry
        .execute("a", empty_snapshot(), &config, None, 1, tx)
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::MissingConfig { .. }));
}

#[tokio::test]
async fn reregistration_replaces_handler() {
    struct Second;

    #[async_trait]
    impl NodeHandler for Second {
        async fn run(
            &self,
            _snapshot: StateSnapshot,
            ctx: NodeContext,
        ) -> Result<NodePartial, NodeError> {
            ctx.emit("swap", "second handler active")?;
            Ok(NodePartial::new()
                .with_articles(vec![greenroom::content::Article::new(
                    "https://e.com/second",
                    "Example Wire",
                    "second",
                )]))
        }
    }

    let mut registry = NodeRegistry::new();
    registry.register("swap", ArticleNode::new("https://e.com/first"));
    registry.register("swap", Second);

    let config = ConfigManager::new().with_node(NodeConfig::new("swap"));
    let (tx, _rx) = events();
    let partial = registry
        .execute("swap", empty_snapshot(), &config, None, 1, tx)
        .await
        .unwrap();

    assert_eq!(
        partial.articles.unwrap()[0].source_url,
        "https://e.com/second"
    );
}

#[tokio::test]
async fn overrides_reach_the_handler() {
    struct EchoTimeout;

    #[async_trait]
    impl NodeHandler for EchoTimeout {
        async fn run(
            &self,
            _snapshot: StateSnapshot,
            ctx: NodeContext,
        ) -> Result<NodePartial, NodeError> {
            let mut extra = greenroom::utils::collections::new_extra_map();
            extra.insert(
                "effective_timeout".into(),
                serde_json::json!(ctx.config.timeout_seconds),
            );
            Ok(NodePartial::new().with_extra(extra))
        }
    }

    let registry = NodeRegistry::new().with_handler("echo", EchoTimeout);
    let config =
        ConfigManager::new().with_node(NodeConfig::new("echo").with_timeout_seconds(120));

    let mut overrides = serde_json::Map::new();
    overrides.insert("timeout_seconds".into(), serde_json::json!(45));

    let (tx, _rx) = events();
    let partial = registry
        .execute("echo", empty_snapshot(), &config, Some(&overrides), 1, tx)
        .await
        .unwrap();

    assert_eq!(
        partial.extra.unwrap().get("effective_timeout"),
        Some(&serde_json::json!(45))
    );
}
