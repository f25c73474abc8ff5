//! Workflow state: one versioned record shared by a whole run.
//!
//! State is mutable only by replacement at stage barriers; nodes receive an
//! immutable [`StateSnapshot`] and return partial updates. Every field has a
//! declared merge policy (see [`crate::reducers`]):
//!
//! - `articles` - append-unique keyed by source URL
//! - `facts` - append-unique keyed by record id
//! - `decisions` - append-unique keyed by record id (append-only log)
//! - `extra` - dict-union, right-hand wins
//! - `draft` - overwrite
//! - `control` - overwrite per field
//! - `errors` - append
//!
//! ```rust
//! use greenroom::state::WorkflowState;
//! use greenroom::content::Article;
//! use serde_json::json;
//!
//! let state = WorkflowState::builder()
//!     .with_article(Article::new("https://example.com/a", "Wire", "Headline"))
//!     .with_extra("week", json!(32))
//!     .build();
//!
//! let snapshot = state.snapshot();
//! assert_eq!(snapshot.articles.len(), 1);
//! assert_eq!(snapshot.extra.get("week"), Some(&json!(32)));
//! ```

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::channels::errors::ErrorEvent;
use crate::channels::{
    ArticlesChannel, Channel, ControlChannel, DecisionsChannel, DraftChannel, ErrorsChannel,
    ExtrasChannel, FactsChannel, MapChannel, ScalarChannel, VecChannel,
};
use crate::content::{Article, DecisionRecord, Draft, Fact};
use crate::types::{NodeId, RunControl, RunStatus};

/// The shared state of one workflow thread, organized into versioned
/// channels.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct WorkflowState {
    pub articles: ArticlesChannel,
    pub facts: FactsChannel,
    pub decisions: DecisionsChannel,
    pub extra: ExtrasChannel,
    pub draft: DraftChannel,
    pub control: ControlChannel,
    pub errors: ErrorsChannel,
}

/// Immutable point-in-time view handed to node handlers and routers.
///
/// Snapshots clone channel contents along with their versions, so handlers
/// can read freely while the barrier mutates the underlying state.
#[derive(Clone, Debug)]
pub struct StateSnapshot {
    pub articles: Vec<Article>,
    pub articles_version: u32,
    pub facts: Vec<Fact>,
    pub facts_version: u32,
    pub decisions: Vec<DecisionRecord>,
    pub decisions_version: u32,
    pub extra: FxHashMap<String, Value>,
    pub extra_version: u32,
    pub draft: Option<Draft>,
    pub draft_version: u32,
    pub control: RunControl,
    pub control_version: u32,
    pub errors: Vec<ErrorEvent>,
    pub errors_version: u32,
}

impl StateSnapshot {
    /// The latest decision recorded for `gate`, if any.
    ///
    /// The decision log is append-only, so "latest" is the last matching
    /// record in log order.
    #[must_use]
    pub fn latest_decision_for(&self, gate: &NodeId) -> Option<&DecisionRecord> {
        self.decisions.iter().rev().find(|d| &d.gate == gate)
    }
}

impl WorkflowState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> WorkflowStateBuilder {
        WorkflowStateBuilder::default()
    }

    /// Add one article. Versions are not bumped here; that is the barrier's
    /// responsibility.
    #[must_use = "consider using the returned self for method chaining"]
    pub fn add_article(&mut self, article: Article) -> &mut Self {
        self.articles.get_mut().push(article);
        self
    }

    /// Insert one metadata entry.
    #[must_use = "consider using the returned self for method chaining"]
    pub fn add_extra(&mut self, key: impl Into<String>, value: Value) -> &mut Self {
        self.extra.get_mut().insert(key.into(), value);
        self
    }

    /// Current run status.
    #[must_use]
    pub fn status(&self) -> RunStatus {
        self.control.get().status
    }

    /// The full decision log in append order.
    #[must_use]
    pub fn decision_log(&self) -> Vec<DecisionRecord> {
        self.decisions.snapshot()
    }

    /// Clone out an immutable snapshot of all channels.
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            articles: self.articles.snapshot(),
            articles_version: self.articles.version(),
            facts: self.facts.snapshot(),
            facts_version: self.facts.version(),
            decisions: self.decisions.snapshot(),
            decisions_version: self.decisions.version(),
            extra: self.extra.snapshot(),
            extra_version: self.extra.version(),
            draft: self.draft.snapshot(),
            draft_version: self.draft.version(),
            control: self.control.snapshot(),
            control_version: self.control.version(),
            errors: self.errors.snapshot(),
            errors_version: self.errors.version(),
        }
    }
}

/// Fluent builder for initial states.
#[derive(Debug, Default)]
pub struct WorkflowStateBuilder {
    articles: Vec<Article>,
    facts: Vec<Fact>,
    extra: FxHashMap<String, Value>,
    draft: Option<Draft>,
    control: RunControl,
}

impl WorkflowStateBuilder {
    #[must_use]
    pub fn with_article(mut self, article: Article) -> Self {
        self.articles.push(article);
        self
    }

    #[must_use]
    pub fn with_fact(mut self, fact: Fact) -> Self {
        self.facts.push(fact);
        self
    }

    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn with_draft(mut self, draft: Draft) -> Self {
        self.draft = Some(draft);
        self
    }

    #[must_use]
    pub fn with_control(mut self, control: RunControl) -> Self {
        self.control = control;
        self
    }

    pub fn build(self) -> WorkflowState {
        WorkflowState {
            articles: VecChannel::new(self.articles, 1),
            facts: VecChannel::new(self.facts, 1),
            decisions: VecChannel::default(),
            extra: MapChannel::new(self.extra, 1),
            draft: ScalarChannel::new(self.draft, 1),
            control: ScalarChannel::new(self.control, 1),
            errors: VecChannel::default(),
        }
    }
}
