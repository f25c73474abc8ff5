//! Conditional routing declared at build time.
//!
//! A conditional edge pairs a routing function with a *closed* label→target
//! map. The router evaluates the function against the fully-merged state
//! after a stage barrier and translates the returned label through the map;
//! a label outside the map is a fatal configuration error, not a guess.

use rustc_hash::FxHashMap;
use std::sync::Arc;

use crate::state::StateSnapshot;
use crate::types::NodeId;

/// Label a routing function may return for the built-in "finish the run"
/// target.
pub const END_LABEL: &str = "end";

/// Routing function: merged state in, route label out.
pub type RoutePredicate = Arc<dyn Fn(&StateSnapshot) -> String + Send + Sync + 'static>;

/// Where a resolved route leads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RouteTarget {
    /// Continue with this node (and its dependents).
    Node(NodeId),
    /// Complete the run.
    End,
}

/// A conditional edge: after `from` completes (and its stage merges), the
/// predicate picks one of the declared targets.
#[derive(Clone)]
pub struct ConditionalEdge {
    from: NodeId,
    predicate: RoutePredicate,
    targets: FxHashMap<String, RouteTarget>,
}

impl std::fmt::Debug for ConditionalEdge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut labels: Vec<&String> = self.targets.keys().collect();
        labels.sort();
        f.debug_struct("ConditionalEdge")
            .field("from", &self.from)
            .field("labels", &labels)
            .finish()
    }
}

impl ConditionalEdge {
    pub fn new(from: impl Into<NodeId>, predicate: RoutePredicate) -> Self {
        Self {
            from: from.into(),
            predicate,
            targets: FxHashMap::default(),
        }
    }

    /// Declare that `label` routes to `target`.
    #[must_use]
    pub fn with_target(mut self, label: impl Into<String>, target: RouteTarget) -> Self {
        self.targets.insert(label.into(), target);
        self
    }

    /// Declare the conventional `"end"` label.
    #[must_use]
    pub fn with_end(self) -> Self {
        self.with_target(END_LABEL, RouteTarget::End)
    }

    pub fn from(&self) -> &NodeId {
        &self.from
    }

    pub fn targets(&self) -> &FxHashMap<String, RouteTarget> {
        &self.targets
    }

    /// Evaluate the predicate and resolve the label through the declared
    /// map. `None` means the label was undeclared - the caller must treat
    /// that as a fatal configuration error.
    pub fn evaluate(&self, snapshot: &StateSnapshot) -> (String, Option<RouteTarget>) {
        let label = (self.predicate)(snapshot);
        let target = self.targets.get(&label).cloned();
        (label, target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::WorkflowState;

    fn edge() -> ConditionalEdge {
        let predicate: RoutePredicate = Arc::new(|snapshot| {
            if snapshot.articles.is_empty() {
                "empty".to_string()
            } else {
                "proceed".to_string()
            }
        });
        ConditionalEdge::new(NodeId::named("categorize"), predicate)
            .with_target("proceed", RouteTarget::Node(NodeId::named("compile")))
            .with_end()
    }

    #[test]
    fn declared_label_resolves() {
        let state = WorkflowState::builder()
            .with_article(crate::content::Article::new("https://e.com/1", "W", "T"))
            .build();
        let (label, target) = edge().evaluate(&state.snapshot());
        assert_eq!(label, "proceed");
        assert_eq!(target, Some(RouteTarget::Node(NodeId::named("compile"))));
    }

    #[test]
    fn undeclared_label_is_none() {
        let state = WorkflowState::new();
        let (label, target) = edge().evaluate(&state.snapshot());
        assert_eq!(label, "empty");
        assert!(target.is_none());
    }
}
