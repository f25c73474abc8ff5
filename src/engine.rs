//! The compiled workflow engine.
//!
//! An `Engine` owns the node registry, config manager, reducer registry,
//! gate table, conditional edges, and the compiled execution plan. It is the
//! barrier authority: node partials from one stage are aggregated in stable
//! node order, pushed through the merge algebra exactly once, and channel
//! versions are bumped only when content changed - so repeated or reordered
//! merges cannot produce divergent state.
//!
//! Thread lifecycle (checkpoints, pausing, resuming) lives in
//! [`crate::runtimes::WorkflowRunner`]; the engine itself is stateless with
//! respect to threads and can be shared across any number of them.

use rustc_hash::FxHashMap;
use serde_json::Value;

use miette::Diagnostic;
use thiserror::Error;
use tracing::instrument;

use crate::channels::Channel;
use crate::channels::errors::{ErrorEvent, ErrorScope};
use crate::config::ConfigManager;
use crate::content::{Article, DecisionRecord, Fact};
use crate::event_bus::Event;
use crate::gates::GateSpec;
use crate::graphs::{ConditionalEdge, RouteTarget};
use crate::node::{ControlUpdate, NodePartial};
use crate::planner::{ExecutionPlan, PlanError, Planner};
use crate::reducers::{ReducerError, ReducerRegistry};
use crate::registry::{NodeRegistry, RegistryError, StageRunResult};
use crate::runtimes::RuntimeConfig;
use crate::state::{StateSnapshot, WorkflowState};
use crate::types::NodeId;

/// Result of applying node partials at a stage barrier.
///
/// Errors are reported in a deterministic order (scope, then time, then
/// message) so checkpoints and logs are stable across reruns regardless of
/// task completion order.
#[derive(Debug, Clone, Default)]
pub struct BarrierOutcome {
    /// Channel identifiers that changed during the barrier.
    pub updated_channels: Vec<&'static str>,
    /// Aggregated error events from the stage, deterministically ordered.
    pub errors: Vec<ErrorEvent>,
}

#[derive(Debug, Error, Diagnostic)]
pub enum EngineError {
    /// A routing function returned a label outside its declared target map.
    #[error("conditional edge from {from} returned undeclared route label '{label}'")]
    #[diagnostic(
        code(greenroom::engine::unknown_route_target),
        help("Declare the label in the edge's target map, or fix the routing function.")
    )]
    UnknownRouteTarget { from: NodeId, label: String },

    #[error("barrier merge failed: {0}")]
    #[diagnostic(code(greenroom::engine::barrier))]
    Barrier(#[source] ReducerError),

    #[error(transparent)]
    #[diagnostic(code(greenroom::engine::registry))]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    #[diagnostic(code(greenroom::engine::plan))]
    Plan(#[from] PlanError),
}

/// Compiled, shareable workflow engine. Cheap to clone.
#[derive(Clone)]
pub struct Engine {
    registry: NodeRegistry,
    config: ConfigManager,
    conditional_edges: Vec<ConditionalEdge>,
    gates: FxHashMap<NodeId, GateSpec>,
    reducers: ReducerRegistry,
    plan: ExecutionPlan,
    runtime_config: RuntimeConfig,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("plan", &self.plan)
            .field("gates", &self.gate_ids())
            .field("conditional_edges", &self.conditional_edges.len())
            .finish()
    }
}

impl Engine {
    /// Internal (crate) factory used by graph compilation.
    pub(crate) fn from_parts(
        registry: NodeRegistry,
        config: ConfigManager,
        conditional_edges: Vec<ConditionalEdge>,
        gates: FxHashMap<NodeId, GateSpec>,
        plan: ExecutionPlan,
        runtime_config: RuntimeConfig,
    ) -> Self {
        Self {
            registry,
            config,
            conditional_edges,
            gates,
            reducers: ReducerRegistry::default(),
            plan,
            runtime_config,
        }
    }

    /// The full compiled plan (operator view).
    #[must_use]
    pub fn plan(&self) -> &ExecutionPlan {
        &self.plan
    }

    #[must_use]
    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    #[must_use]
    pub fn config(&self) -> &ConfigManager {
        &self.config
    }

    #[must_use]
    pub fn runtime_config(&self) -> &RuntimeConfig {
        &self.runtime_config
    }

    #[must_use]
    pub fn gate(&self, id: &NodeId) -> Option<&GateSpec> {
        self.gates.get(id)
    }

    #[must_use]
    pub fn gate_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.gates.keys().cloned().collect();
        ids.sort_by_key(NodeId::encode);
        ids
    }

    /// First stage of the full plan: the nodes with no (enabled)
    /// dependencies.
    #[must_use]
    pub fn initial_frontier(&self) -> Vec<NodeId> {
        self.plan.first_stage().cloned().unwrap_or_default()
    }

    /// Forward sub-plan from an arbitrary frontier; used for resume,
    /// post-approval continuation, and revision re-entry.
    pub fn plan_from(&self, frontier: &[NodeId]) -> Result<ExecutionPlan, PlanError> {
        Planner::plan_from(&self.config, frontier, &self.gate_ids())
    }

    /// The nodes that directly depend on `gate` - the frontier to continue
    /// with after an approval.
    pub fn frontier_after(&self, gate: &NodeId) -> Result<Vec<NodeId>, PlanError> {
        match gate.name() {
            Some(name) => Planner::dependents_of(&self.config, name),
            None => Ok(Vec::new()),
        }
    }

    /// Execute one stage's nodes concurrently. Structural errors (missing
    /// handler/config) abort; node-level failures come back captured inside
    /// the partials.
    pub async fn execute_stage(
        &self,
        snapshot: StateSnapshot,
        stage: &[NodeId],
        step: u64,
        events: flume::Sender<Event>,
    ) -> Result<StageRunResult, RegistryError> {
        self.registry
            .execute_many(stage, snapshot, &self.config, step, events)
            .await
    }

    /// Evaluate the conditional edges of the nodes that just ran, against
    /// the fully-merged post-barrier snapshot.
    ///
    /// Returns `None` when no edge fired (the run continues with the default
    /// plan), or the resolved targets. An undeclared route label is fatal.
    pub fn route_after(
        &self,
        ran: &[NodeId],
        snapshot: &StateSnapshot,
    ) -> Result<Option<Vec<RouteTarget>>, EngineError> {
        let mut targets: Vec<RouteTarget> = Vec::new();
        let mut fired = false;
        for edge in self
            .conditional_edges
            .iter()
            .filter(|edge| ran.contains(edge.from()))
        {
            fired = true;
            let (label, target) = edge.evaluate(snapshot);
            match target {
                Some(target) => {
                    tracing::debug!(from = %edge.from(), %label, "conditional edge routed");
                    if !targets.contains(&target) {
                        targets.push(target);
                    }
                }
                None => {
                    return Err(EngineError::UnknownRouteTarget {
                        from: edge.from().clone(),
                        label,
                    });
                }
            }
        }
        Ok(fired.then_some(targets))
    }

    /// Merge node outputs into state at a stage barrier.
    ///
    /// Partials are aggregated in the given (stable node-id) order into one
    /// combined partial, the reducer registry is applied exactly once, and
    /// channel versions are bumped only where content changed.
    #[instrument(skip(self, state, ran, partials), err)]
    pub fn apply_barrier(
        &self,
        state: &mut WorkflowState,
        ran: &[NodeId],
        partials: Vec<NodePartial>,
    ) -> Result<BarrierOutcome, EngineError> {
        let mut articles_all: Vec<Article> = Vec::new();
        let mut facts_all: Vec<Fact> = Vec::new();
        let mut decisions_all: Vec<DecisionRecord> = Vec::new();
        let mut extra_all: FxHashMap<String, Value> = FxHashMap::default();
        let mut draft_last = None;
        let mut control_all = ControlUpdate::default();
        let mut errors_all: Vec<ErrorEvent> = Vec::new();

        for (i, partial) in partials.iter().enumerate() {
            let fallback = NodeId::named("?");
            let nid = ran.get(i).unwrap_or(&fallback);

            if let Some(articles) = &partial.articles
                && !articles.is_empty()
            {
                tracing::debug!(node = %nid, count = articles.len(), "node produced articles");
                articles_all.extend(articles.iter().cloned());
            }
            if let Some(facts) = &partial.facts
                && !facts.is_empty()
            {
                tracing::debug!(node = %nid, count = facts.len(), "node produced facts");
                facts_all.extend(facts.iter().cloned());
            }
            if let Some(decisions) = &partial.decisions
                && !decisions.is_empty()
            {
                decisions_all.extend(decisions.iter().cloned());
            }
            if let Some(extra) = &partial.extra
                && !extra.is_empty()
            {
                // Sort keys so the combined map is deterministic across runs.
                let mut sorted_pairs: Vec<_> = extra.iter().collect();
                sorted_pairs.sort_by(|(left, _), (right, _)| left.cmp(right));
                for (k, v) in sorted_pairs {
                    extra_all.insert(k.clone(), v.clone());
                }
            }
            if let Some(draft) = &partial.draft {
                draft_last = Some(draft.clone());
            }
            if let Some(control) = &partial.control {
                control_all.merge_from(control);
            }
            if let Some(errors) = &partial.errors
                && !errors.is_empty()
            {
                tracing::debug!(node = %nid, count = errors.len(), "node produced errors");
                errors_all.extend(errors.iter().cloned());
            }
        }

        fn scope_sort_key(scope: &ErrorScope) -> (u8, &str, u64) {
            match scope {
                ErrorScope::Node { node, step } => (0, node.as_str(), *step),
                ErrorScope::Stage { step } => (1, "", *step),
                ErrorScope::Runner { thread, step } => (2, thread.as_str(), *step),
                ErrorScope::Engine => (3, "", 0),
            }
        }

        // Stable order regardless of which node's task finished first.
        errors_all.sort_by(|a, b| {
            scope_sort_key(&a.scope)
                .cmp(&scope_sort_key(&b.scope))
                .then_with(|| a.when.cmp(&b.when))
                .then_with(|| a.error.message.cmp(&b.error.message))
        });

        let merged = NodePartial {
            articles: (!articles_all.is_empty()).then_some(articles_all),
            facts: (!facts_all.is_empty()).then_some(facts_all),
            decisions: (!decisions_all.is_empty()).then_some(decisions_all),
            extra: (!extra_all.is_empty()).then_some(extra_all),
            draft: draft_last,
            control: (!control_all.is_empty()).then_some(control_all),
            errors: (!errors_all.is_empty()).then_some(errors_all.clone()),
        };

        // Before-state for version bump decisions.
        let articles_before = state.articles.len();
        let articles_ver = state.articles.version();
        let facts_before = state.facts.len();
        let facts_ver = state.facts.version();
        let decisions_before = state.decisions.len();
        let decisions_ver = state.decisions.version();
        let extra_before = state.extra.snapshot();
        let extra_ver = state.extra.version();
        let draft_before = state.draft.snapshot();
        let draft_ver = state.draft.version();
        let control_before = state.control.snapshot();
        let control_ver = state.control.version();
        let errors_before = state.errors.len();
        let errors_ver = state.errors.version();

        // Reducers mutate contents; they never bump versions.
        self.reducers
            .apply_all(state, &merged)
            .map_err(EngineError::Barrier)?;

        let mut updated: Vec<&'static str> = Vec::new();
        if state.articles.len() != articles_before {
            state.articles.set_version(articles_ver.saturating_add(1));
            updated.push("articles");
        }
        if state.facts.len() != facts_before {
            state.facts.set_version(facts_ver.saturating_add(1));
            updated.push("facts");
        }
        if state.decisions.len() != decisions_before {
            state.decisions.set_version(decisions_ver.saturating_add(1));
            updated.push("decisions");
        }
        if state.extra.snapshot() != extra_before {
            state.extra.set_version(extra_ver.saturating_add(1));
            updated.push("extra");
        }
        if state.draft.snapshot() != draft_before {
            state.draft.set_version(draft_ver.saturating_add(1));
            updated.push("draft");
        }
        if state.control.snapshot() != control_before {
            state.control.set_version(control_ver.saturating_add(1));
            updated.push("control");
        }
        if state.errors.len() != errors_before {
            state.errors.set_version(errors_ver.saturating_add(1));
            updated.push("errors");
        }

        if !updated.is_empty() {
            tracing::info!(
                target: "greenroom::engine",
                channels = ?updated,
                "barrier updated channels"
            );
        }

        Ok(BarrierOutcome {
            updated_channels: updated,
            errors: errors_all,
        })
    }
}
