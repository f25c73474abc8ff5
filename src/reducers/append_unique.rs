//! Append-unique reducers for keyed collections.
//!
//! Incoming elements whose key already exists on the left side are dropped,
//! which makes these merges idempotent and order-insensitive at the set
//! level - the property that lets concurrent stage branches merge in any
//! completion order.

use rustc_hash::FxHashSet;

use super::Reducer;
use crate::node::NodePartial;
use crate::state::WorkflowState;

fn append_unique_by<T, K, F>(existing: &mut Vec<T>, incoming: &[T], key_fn: F)
where
    T: Clone,
    K: std::hash::Hash + Eq,
    F: Fn(&T) -> K,
{
    let mut seen: FxHashSet<K> = existing.iter().map(&key_fn).collect();
    for item in incoming {
        if seen.insert(key_fn(item)) {
            existing.push(item.clone());
        }
    }
}

/// Articles merge keyed by `source_url`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AppendUniqueArticles;

impl Reducer for AppendUniqueArticles {
    fn apply(&self, state: &mut WorkflowState, update: &NodePartial) {
        if let Some(articles) = &update.articles
            && !articles.is_empty()
        {
            append_unique_by(state.articles.get_mut(), articles, |a| {
                a.source_url.clone()
            });
        }
    }
}

/// Facts merge keyed by record id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AppendUniqueFacts;

impl Reducer for AppendUniqueFacts {
    fn apply(&self, state: &mut WorkflowState, update: &NodePartial) {
        if let Some(facts) = &update.facts
            && !facts.is_empty()
        {
            append_unique_by(state.facts.get_mut(), facts, |f| f.id.clone());
        }
    }
}

/// Decision log merge keyed by record id. Records are append-only; replaying
/// the same decision patch twice adds it once.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AppendDecisions;

impl Reducer for AppendDecisions {
    fn apply(&self, state: &mut WorkflowState, update: &NodePartial) {
        if let Some(decisions) = &update.decisions
            && !decisions.is_empty()
        {
            append_unique_by(state.decisions.get_mut(), decisions, |d| d.id.clone());
        }
    }
}
