use std::sync::Arc;

use greenroom::config::{ConfigManager, NodeConfig};
use greenroom::gates::GateSpec;
use greenroom::graphs::{ConditionalEdge, GraphBuilder, RoutePredicate, RouteTarget};
use greenroom::planner::PlanError;
use greenroom::types::NodeId;

mod common;
use common::*;

fn always(label: &'static str) -> RoutePredicate {
    Arc::new(move |_| label.to_string())
}

#[test]
fn compile_builds_plan_in_dependency_order() {
    let engine = GraphBuilder::new()
        .add_node(NodeConfig::new("collect"), ArticleNode::new("https://e.com/1"))
        .add_node(
            NodeConfig::new("extract").with_depends_on(["collect"]),
            FactNode,
        )
        .add_node(
            NodeConfig::new("compile").with_depends_on(["extract"]),
            CompileNode::new(),
        )
        .compile()
        .unwrap();

    assert_eq!(
        engine.plan().stage_names(),
        vec![
            vec!["collect".to_string()],
            vec!["extract".to_string()],
            vec!["compile".to_string()],
        ]
    );
    assert_eq!(engine.initial_frontier(), vec![NodeId::named("collect")]);
}

#[test]
fn compile_rejects_cycles() {
    let result = GraphBuilder::new()
        .add_node(NodeConfig::new("a").with_depends_on(["b"]), NoopNode)
        .add_node(NodeConfig::new("b").with_depends_on(["a"]), NoopNode)
        .compile();

    match result {
        Err(greenroom::graphs::GraphCompileError::Plan(PlanError::CyclicGraph { nodes })) => {
            assert_eq!(nodes, vec!["a".to_string(), "b".to_string()]);
        }
        other => panic!("expected CyclicGraph, got {other:?}"),
    }
}

#[test]
fn compile_rejects_unknown_dependency() {
    let result = GraphBuilder::new()
        .add_node(NodeConfig::new("a").with_depends_on(["ghost"]), NoopNode)
        .compile();
    assert!(matches!(
        result,
        Err(greenroom::graphs::GraphCompileError::Plan(
            PlanError::UnknownDependency { .. }
        ))
    ));
}

#[test]
fn compile_rejects_unknown_revision_entry() {
    let result = GraphBuilder::new()
        .add_node(NodeConfig::new("compile"), CompileNode::new())
        .add_gate(GateSpec::new("review", "ghost").with_depends_on(["compile"]))
        .compile();
    assert!(matches!(
        result,
        Err(greenroom::graphs::GraphCompileError::UnknownRevisionEntry { .. })
    ));
}

#[test]
fn compile_rejects_gate_as_revision_entry() {
    let result = GraphBuilder::new()
        .add_node(NodeConfig::new("compile"), CompileNode::new())
        .add_gate(GateSpec::new("first_review", "compile").with_depends_on(["compile"]))
        .add_gate(GateSpec::new("second_review", "first_review").with_depends_on(["first_review"]))
        .compile();
    assert!(matches!(
        result,
        Err(greenroom::graphs::GraphCompileError::GateRevisionEntry { .. })
    ));
}

#[test]
fn compile_rejects_duplicate_gates() {
    let result = GraphBuilder::new()
        .add_node(NodeConfig::new("compile"), CompileNode::new())
        .add_gate(GateSpec::new("review", "compile").with_depends_on(["compile"]))
        .add_gate(GateSpec::new("review", "compile").with_depends_on(["compile"]))
        .compile();
    assert!(matches!(
        result,
        Err(greenroom::graphs::GraphCompileError::DuplicateGate { .. })
    ));
}

#[test]
fn compile_rejects_undeclared_route_target_nodes() {
    let result = GraphBuilder::new()
        .add_node(NodeConfig::new("a"), NoopNode)
        .add_conditional_edge(
            ConditionalEdge::new("a", always("next"))
                .with_target("next", RouteTarget::Node(NodeId::named("ghost"))),
        )
        .compile();
    assert!(matches!(
        result,
        Err(greenroom::graphs::GraphCompileError::UnknownRouteTarget { .. })
    ));
}

#[test]
fn route_after_resolves_declared_labels() {
    let engine = GraphBuilder::new()
        .add_node(NodeConfig::new("a"), NoopNode)
        .add_node(NodeConfig::new("b"), NoopNode)
        .add_conditional_edge(
            ConditionalEdge::new("a", always("forward"))
                .with_target("forward", RouteTarget::Node(NodeId::named("b")))
                .with_end(),
        )
        .compile()
        .unwrap();

    let snapshot = empty_snapshot();
    let targets = engine
        .route_after(&[NodeId::named("a")], &snapshot)
        .unwrap()
        .expect("edge fired");
    assert_eq!(targets, vec![RouteTarget::Node(NodeId::named("b"))]);

    // Nodes without edges fire nothing.
    assert!(
        engine
            .route_after(&[NodeId::named("b")], &snapshot)
            .unwrap()
            .is_none()
    );
}

#[test]
fn route_after_rejects_undeclared_labels() {
    let engine = GraphBuilder::new()
        .add_node(NodeConfig::new("a"), NoopNode)
        .add_conditional_edge(ConditionalEdge::new("a", always("surprise")).with_end())
        .compile()
        .unwrap();

    let err = engine
        .route_after(&[NodeId::named("a")], &empty_snapshot())
        .unwrap_err();
    assert!(matches!(
        err,
        greenroom::engine::EngineError::UnknownRouteTarget { .. }
    ));
}

#[test]
fn execution_order_view_matches_dependencies() {
    let config = ConfigManager::new()
        .with_node(NodeConfig::new("collect"))
        .with_node(NodeConfig::new("extract").with_depends_on(["collect"]))
        .with_node(NodeConfig::new("publish").with_depends_on(["extract"]));

    assert_eq!(
        config.execution_order().unwrap(),
        vec![
            vec!["collect".to_string()],
            vec!["extract".to_string()],
            vec!["publish".to_string()],
        ]
    );
}
