//! Graph validation and compilation into an executable engine.
//!
//! Compilation is where configuration errors become hard failures: cyclic or
//! dangling dependency declarations, gates whose revision entry does not
//! exist (or is itself a gate), and conditional edges pointing at unknown
//! nodes are all rejected here, before any thread runs.

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::engine::Engine;
use crate::gates::GateSpec;
use crate::graphs::edges::RouteTarget;
use crate::planner::{PlanError, Planner};
use crate::types::NodeId;

#[derive(Debug, Error, Diagnostic)]
pub enum GraphCompileError {
    #[error(transparent)]
    #[diagnostic(code(greenroom::graphs::plan))]
    Plan(#[from] PlanError),

    #[error("gate id must be a named node, got {id}")]
    #[diagnostic(code(greenroom::graphs::virtual_gate))]
    VirtualGate { id: NodeId },

    #[error("gate {gate} routes rejections to unknown node {target}")]
    #[diagnostic(
        code(greenroom::graphs::unknown_revision_entry),
        help("on_reject must name a configured node that can be re-run.")
    )]
    UnknownRevisionEntry { gate: NodeId, target: NodeId },

    #[error("gate {gate} routes rejections to another gate {target}")]
    #[diagnostic(
        code(greenroom::graphs::gate_revision_entry),
        help("Revision loops must re-enter a processing node, not a gate.")
    )]
    GateRevisionEntry { gate: NodeId, target: NodeId },

    #[error("conditional edge from {from} declares unknown target node {target}")]
    #[diagnostic(
        code(greenroom::graphs::unknown_route_target),
        help("Every declared route target must be a configured node or End.")
    )]
    UnknownRouteTarget { from: NodeId, target: NodeId },

    #[error("duplicate gate declaration for {id}")]
    #[diagnostic(code(greenroom::graphs::duplicate_gate))]
    DuplicateGate { id: NodeId },
}

impl super::builder::GraphBuilder {
    /// Validate the graph and compile it into an [`Engine`].
    pub fn compile(self) -> Result<Engine, GraphCompileError> {
        let mut gates: FxHashMap<NodeId, GateSpec> = FxHashMap::default();
        for spec in &self.gates {
            if spec.id.name().is_none() {
                return Err(GraphCompileError::VirtualGate {
                    id: spec.id.clone(),
                });
            }
            if gates.insert(spec.id.clone(), spec.clone()).is_some() {
                return Err(GraphCompileError::DuplicateGate {
                    id: spec.id.clone(),
                });
            }
        }

        for spec in gates.values() {
            let target_name =
                spec.on_reject
                    .name()
                    .ok_or_else(|| GraphCompileError::UnknownRevisionEntry {
                        gate: spec.id.clone(),
                        target: spec.on_reject.clone(),
                    })?;
            if !self.config.contains(target_name) {
                return Err(GraphCompileError::UnknownRevisionEntry {
                    gate: spec.id.clone(),
                    target: spec.on_reject.clone(),
                });
            }
            if gates.contains_key(&spec.on_reject) {
                return Err(GraphCompileError::GateRevisionEntry {
                    gate: spec.id.clone(),
                    target: spec.on_reject.clone(),
                });
            }
        }

        for edge in &self.conditional_edges {
            for target in edge.targets().values() {
                if let RouteTarget::Node(node) = target {
                    let known = node.name().is_some_and(|name| self.config.contains(name));
                    if !known {
                        return Err(GraphCompileError::UnknownRouteTarget {
                            from: edge.from().clone(),
                            target: node.clone(),
                        });
                    }
                }
            }
        }

        // Plan construction is itself the cycle/dangling-dependency check.
        let gate_ids: Vec<NodeId> = gates.keys().cloned().collect();
        let plan = Planner::plan(&self.config, &gate_ids)?;

        Ok(Engine::from_parts(
            self.registry,
            self.config,
            self.conditional_edges,
            gates,
            plan,
            self.runtime_config,
        ))
    }
}
