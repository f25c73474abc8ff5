//! Dependency-based execution planning.
//!
//! The planner turns `depends_on` declarations into an ordered sequence of
//! *stages*: each stage is a set of nodes whose dependencies are all
//! satisfied by earlier stages and which are therefore safe to run
//! concurrently. Intra-stage order carries no execution guarantee (merge
//! commutativity makes it irrelevant); stages are name-sorted only so the
//! operator view and tests are stable.
//!
//! Disabled nodes are dropped from the plan and must not block dependents:
//! a dependent inherits the disabled node's own dependencies instead of
//! waiting for it. Declared cycles are rejected with
//! [`PlanError::CyclicGraph`] at plan-build time, never silently dropped.
//!
//! Gate nodes always occupy singleton stages so the runner can pause exactly
//! at the gate without holding back or re-running unrelated work.

use miette::Diagnostic;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeSet;
use thiserror::Error;

use crate::config::ConfigManager;
use crate::types::NodeId;

/// An ordered sequence of concurrently-safe stages.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExecutionPlan {
    stages: Vec<Vec<NodeId>>,
}

impl ExecutionPlan {
    pub fn new(stages: Vec<Vec<NodeId>>) -> Self {
        Self { stages }
    }

    #[must_use]
    pub fn stages(&self) -> &[Vec<NodeId>] {
        &self.stages
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    #[must_use]
    pub fn first_stage(&self) -> Option<&Vec<NodeId>> {
        self.stages.first()
    }

    /// String form for operator/admin surfaces.
    #[must_use]
    pub fn stage_names(&self) -> Vec<Vec<String>> {
        self.stages
            .iter()
            .map(|stage| stage.iter().map(NodeId::encode).collect())
            .collect()
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum PlanError {
    #[error("cyclic dependency declaration among nodes: {}", nodes.join(", "))]
    #[diagnostic(
        code(greenroom::planner::cyclic_graph),
        help("Break the cycle in the depends_on declarations of the listed nodes.")
    )]
    CyclicGraph { nodes: Vec<String> },

    #[error("node {node} depends on unknown node {dependency}")]
    #[diagnostic(
        code(greenroom::planner::unknown_dependency),
        help("Every depends_on entry must name a configured node.")
    )]
    UnknownDependency { node: String, dependency: String },
}

/// Stateless planning routines over a [`ConfigManager`].
pub struct Planner;

impl Planner {
    /// Full plan over all enabled nodes.
    pub fn plan(config: &ConfigManager, gates: &[NodeId]) -> Result<ExecutionPlan, PlanError> {
        let deps = effective_dependencies(config)?;
        let nodes: BTreeSet<String> = deps.keys().cloned().collect();
        layer(&nodes, &deps, gates)
    }

    /// Forward sub-plan from a frontier: the frontier nodes plus all their
    /// transitive dependents, in dependency order. Dependencies outside the
    /// sub-plan are considered already satisfied.
    ///
    /// Frontier entries that are virtual, unknown, or disabled are skipped
    /// (a node may have been disabled between checkpoint and resume).
    pub fn plan_from(
        config: &ConfigManager,
        frontier: &[NodeId],
        gates: &[NodeId],
    ) -> Result<ExecutionPlan, PlanError> {
        let deps = effective_dependencies(config)?;

        let mut reachable: BTreeSet<String> = BTreeSet::new();
        let mut pending: Vec<String> = Vec::new();
        for id in frontier {
            match id.name() {
                Some(name) if deps.contains_key(name) => {
                    if reachable.insert(name.to_string()) {
                        pending.push(name.to_string());
                    }
                }
                Some(name) => {
                    tracing::warn!(node = %name, "frontier node unknown or disabled; skipping");
                }
                None => {}
            }
        }

        // Expand to transitive dependents over the effective dependency graph.
        while let Some(current) = pending.pop() {
            for (node, node_deps) in &deps {
                if node_deps.contains(&current) && reachable.insert(node.clone()) {
                    pending.push(node.clone());
                }
            }
        }

        let restricted: FxHashMap<String, BTreeSet<String>> = reachable
            .iter()
            .map(|node| {
                let node_deps = deps
                    .get(node)
                    .map(|d| d.intersection(&reachable).cloned().collect())
                    .unwrap_or_default();
                (node.clone(), node_deps)
            })
            .collect();

        layer(&reachable, &restricted, gates)
    }

    /// Direct dependents of `id` among enabled nodes, sorted by name.
    pub fn dependents_of(config: &ConfigManager, id: &str) -> Result<Vec<NodeId>, PlanError> {
        let deps = effective_dependencies(config)?;
        let mut out: Vec<NodeId> = deps
            .iter()
            .filter(|(_, node_deps)| node_deps.contains(id))
            .map(|(node, _)| NodeId::named(node.clone()))
            .collect();
        out.sort_by_key(|n| n.encode());
        Ok(out)
    }
}

/// Dependency sets of enabled nodes with disabled nodes spliced out:
/// a dependency on a disabled node is replaced by that node's own
/// (recursively resolved) dependencies.
fn effective_dependencies(
    config: &ConfigManager,
) -> Result<FxHashMap<String, BTreeSet<String>>, PlanError> {
    let mut result: FxHashMap<String, BTreeSet<String>> = FxHashMap::default();

    for node in config.list_enabled() {
        let mut resolved: BTreeSet<String> = BTreeSet::new();
        let mut visited: FxHashSet<String> = FxHashSet::default();
        let mut stack: Vec<(String, String)> = node
            .depends_on
            .iter()
            .map(|d| (node.id.clone(), d.clone()))
            .collect();

        while let Some((dependent, dep)) = stack.pop() {
            let Some(dep_config) = config.get(&dep) else {
                return Err(PlanError::UnknownDependency {
                    node: dependent,
                    dependency: dep,
                });
            };
            if !visited.insert(dep.clone()) {
                continue;
            }
            if dep_config.enabled {
                resolved.insert(dep.clone());
            } else {
                // Splice through: inherit the disabled node's dependencies.
                for inner in &dep_config.depends_on {
                    stack.push((dep.clone(), inner.clone()));
                }
            }
        }

        result.insert(node.id.clone(), resolved);
    }

    Ok(result)
}

/// Layered topological sort. `deps` must be restricted to the node set.
fn layer(
    nodes: &BTreeSet<String>,
    deps: &FxHashMap<String, BTreeSet<String>>,
    gates: &[NodeId],
) -> Result<ExecutionPlan, PlanError> {
    let gate_names: FxHashSet<&str> = gates.iter().filter_map(NodeId::name).collect();

    let mut satisfied: FxHashSet<String> = FxHashSet::default();
    let mut remaining: BTreeSet<String> = nodes.clone();
    let mut stages: Vec<Vec<NodeId>> = Vec::new();

    while !remaining.is_empty() {
        // BTreeSet iteration keeps ready sets name-sorted.
        let ready: Vec<String> = remaining
            .iter()
            .filter(|node| {
                deps.get(*node)
                    .is_none_or(|d| d.iter().all(|dep| satisfied.contains(dep)))
            })
            .cloned()
            .collect();

        if ready.is_empty() {
            return Err(PlanError::CyclicGraph {
                nodes: remaining.into_iter().collect(),
            });
        }

        let (gate_ready, plain): (Vec<_>, Vec<_>) = ready
            .iter()
            .cloned()
            .partition(|node| gate_names.contains(node.as_str()));

        if !plain.is_empty() {
            stages.push(plain.iter().map(NodeId::named).collect());
        }
        for gate in gate_ready {
            stages.push(vec![NodeId::named(gate)]);
        }

        for node in ready {
            remaining.remove(&node);
            satisfied.insert(node);
        }
    }

    Ok(ExecutionPlan::new(stages))
}
