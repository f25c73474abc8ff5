//! Barrier determinism: concurrently-produced partials must merge into the
//! same state regardless of completion order, and re-applying a merge must
//! not duplicate anything.

use greenroom::channels::Channel;
use greenroom::channels::errors::{ErrorEvent, FaultDetail};
use greenroom::config::NodeConfig;
use greenroom::engine::Engine;
use greenroom::graphs::GraphBuilder;
use greenroom::node::{ControlUpdate, NodePartial};
use greenroom::state::WorkflowState;
use greenroom::types::NodeId;

mod common;
use common::*;

fn three_node_engine() -> Engine {
    GraphBuilder::new()
        .add_node(NodeConfig::new("a"), ArticleNode::new("https://e.com/a"))
        .add_node(NodeConfig::new("b"), ArticleNode::new("https://e.com/b"))
        .add_node(NodeConfig::new("c"), ArticleNode::new("https://e.com/c"))
        .compile()
        .unwrap()
}

fn partial_for(url: &str) -> NodePartial {
    NodePartial::new().with_articles(vec![keyed_article(url)])
}

#[test]
fn parallel_branches_merge_to_three_elements_in_any_order() {
    let engine = three_node_engine();
    let ran = [NodeId::named("a"), NodeId::named("b"), NodeId::named("c")];
    let urls = ["https://e.com/a", "https://e.com/b", "https://e.com/c"];

    // Simulate every completion order the scheduler could observe.
    let orders: [[usize; 3]; 6] = [
        [0, 1, 2],
        [0, 2, 1],
        [1, 0, 2],
        [1, 2, 0],
        [2, 0, 1],
        [2, 1, 0],
    ];

    let mut results: Vec<Vec<String>> = Vec::new();
    for order in orders {
        let mut state = WorkflowState::new();
        let partials: Vec<NodePartial> = order.iter().map(|&i| partial_for(urls[i])).collect();
        let run_ids: Vec<NodeId> = order.iter().map(|&i| ran[i].clone()).collect();
        engine.apply_barrier(&mut state, &run_ids, partials).unwrap();
        assert_eq!(state.articles.len(), 3);
        results.push(article_urls(&state));
    }
    // Same URL set whatever the order.
    for window in results.windows(2) {
        assert_eq!(window[0], window[1]);
    }
}

#[test]
fn reapplying_a_merge_does_not_duplicate() {
    let engine = three_node_engine();
    let mut state = WorkflowState::new();
    let ran = [NodeId::named("a"), NodeId::named("b")];
    let partials = vec![
        partial_for("https://e.com/a"),
        partial_for("https://e.com/b"),
    ];

    let first = engine
        .apply_barrier(&mut state, &ran, partials.clone())
        .unwrap();
    assert_eq!(first.updated_channels, vec!["articles"]);
    assert_eq!(state.articles.len(), 2);
    let version_after_first = state.articles.version();

    // Same fragments again: contents unchanged, version untouched.
    let second = engine.apply_barrier(&mut state, &ran, partials).unwrap();
    assert!(second.updated_channels.is_empty());
    assert_eq!(state.articles.len(), 2);
    assert_eq!(state.articles.version(), version_after_first);
}

#[test]
fn version_bumps_only_on_change() {
    let engine = three_node_engine();
    let mut state = WorkflowState::new();
    let before = state.articles.version();

    engine
        .apply_barrier(
            &mut state,
            &[NodeId::named("a")],
            vec![partial_for("https://e.com/a")],
        )
        .unwrap();
    assert_eq!(state.articles.version(), before + 1);

    // An empty partial changes nothing.
    engine
        .apply_barrier(&mut state, &[NodeId::named("b")], vec![NodePartial::default()])
        .unwrap();
    assert_eq!(state.articles.version(), before + 1);
}

#[test]
fn concurrent_failures_aggregate_deterministically() {
    let engine = three_node_engine();

    let failure = |node: &str| {
        NodePartial::new()
            .with_errors(vec![ErrorEvent::node(
                node,
                1,
                FaultDetail::msg(format!("node '{node}' failed")),
            )])
            .with_control(
                ControlUpdate::default().with_last_error(Some(format!("node '{node}' failed"))),
            )
    };

    // Feed the same two failures in both "completion orders"; the barrier
    // receives partials in stable node-id order, so the outcome is fixed:
    // every error is kept, sorted by node, and last_error is the last in
    // that order.
    let ran = [NodeId::named("a"), NodeId::named("c")];
    let mut state = WorkflowState::new();
    let outcome = engine
        .apply_barrier(&mut state, &ran, vec![failure("a"), failure("c")])
        .unwrap();

    assert_eq!(outcome.errors.len(), 2);
    assert!(outcome.errors[0].error.message.contains("'a'"));
    assert!(outcome.errors[1].error.message.contains("'c'"));
    assert_eq!(state.errors.len(), 2);
    assert_eq!(
        state.control.get().last_error.as_deref(),
        Some("node 'c' failed")
    );
}

#[test]
fn draft_overwrite_keeps_last_in_node_order() {
    let engine = three_node_engine();
    let mut state = WorkflowState::new();

    let ran = [NodeId::named("a"), NodeId::named("b")];
    let partials = vec![
        NodePartial::new().with_draft(greenroom::content::Draft::new("from a")),
        NodePartial::new().with_draft(greenroom::content::Draft::new("from b")),
    ];
    engine.apply_barrier(&mut state, &ran, partials).unwrap();

    assert_eq!(state.draft.get().as_ref().unwrap().content, "from b");
}
