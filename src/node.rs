//! Node execution contract.
//!
//! A node is one named, configurable processing step: an async handler that
//! receives an immutable [`StateSnapshot`] plus its resolved [`NodeConfig`]
//! and returns a [`NodePartial`] - the subset of state fields it wants to
//! update. The engine merges partials at stage barriers; handlers never
//! mutate state directly.
//!
//! Recoverable failures (an upstream API hiccup, a timeout) should be
//! reported through the `errors` field of the partial, not by returning
//! `Err`. A returned [`NodeError`] is still *captured* by the registry rather
//! than propagated, so one failing node cannot take down its stage siblings,
//! but it marks the execution as failed in the observability stream.

use async_trait::async_trait;
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde_json::Value;
use thiserror::Error;

use crate::channels::errors::ErrorEvent;
use crate::config::NodeConfig;
use crate::content::{Article, DecisionRecord, Draft, Fact};
use crate::event_bus::Event;
use crate::state::StateSnapshot;
use crate::types::{NodeId, RunStatus};

/// Core trait for executable workflow nodes.
///
/// Handlers should be stateless; anything run-specific belongs in state or
/// config. Arbitrary I/O (LLM calls, HTTP) is fine - it is opaque to the
/// engine and bounded by the per-node timeout.
#[async_trait]
pub trait NodeHandler: Send + Sync {
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: NodeContext,
    ) -> Result<NodePartial, NodeError>;
}

/// Execution context passed to a node handler.
#[derive(Clone, Debug)]
pub struct NodeContext {
    /// The node's registry id.
    pub node_id: String,
    /// Stage counter of the surrounding run.
    pub step: u64,
    /// Effective configuration (base config plus request overrides).
    pub config: NodeConfig,
    /// Channel into the workflow's event bus.
    pub event_sender: flume::Sender<Event>,
}

impl NodeContext {
    /// Emit a node-scoped event enriched with this context's metadata.
    ///
    /// Emission is non-blocking; a full or disconnected bus surfaces as an
    /// error the handler may ignore.
    pub fn emit(
        &self,
        scope: impl Into<String>,
        message: impl Into<String>,
    ) -> Result<(), NodeContextError> {
        self.event_sender
            .send(Event::node_message(
                self.node_id.clone(),
                self.step,
                scope,
                message,
            ))
            .map_err(|_| NodeContextError::EventBusUnavailable)
    }
}

/// Overwrite-per-field update for the control channel.
///
/// `None` leaves a field untouched; `Some` replaces it. The doubled options
/// on `pending_gate`/`last_error` distinguish "leave alone" from "clear".
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ControlUpdate {
    pub status: Option<RunStatus>,
    pub pending_gate: Option<Option<NodeId>>,
    pub revision_count: Option<u32>,
    pub last_error: Option<Option<String>>,
}

impl ControlUpdate {
    pub fn status(status: RunStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_pending_gate(mut self, gate: Option<NodeId>) -> Self {
        self.pending_gate = Some(gate);
        self
    }

    #[must_use]
    pub fn with_revision_count(mut self, count: u32) -> Self {
        self.revision_count = Some(count);
        self
    }

    #[must_use]
    pub fn with_last_error(mut self, message: Option<String>) -> Self {
        self.last_error = Some(message);
        self
    }

    /// Fold another update on top of this one (later fields win).
    pub fn merge_from(&mut self, other: &ControlUpdate) {
        if other.status.is_some() {
            self.status = other.status;
        }
        if let Some(gate) = &other.pending_gate {
            self.pending_gate = Some(gate.clone());
        }
        if other.revision_count.is_some() {
            self.revision_count = other.revision_count;
        }
        if let Some(err) = &other.last_error {
            self.last_error = Some(err.clone());
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Partial state update returned by a node (and also the patch shape
/// accepted by `resume`). Every field is optional; the barrier merges each
/// present field under its channel's declared policy.
#[derive(Clone, Debug, Default)]
pub struct NodePartial {
    pub articles: Option<Vec<Article>>,
    pub facts: Option<Vec<Fact>>,
    pub decisions: Option<Vec<DecisionRecord>>,
    pub extra: Option<FxHashMap<String, Value>>,
    pub draft: Option<Draft>,
    pub control: Option<ControlUpdate>,
    pub errors: Option<Vec<ErrorEvent>>,
}

impl NodePartial {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_articles(mut self, articles: Vec<Article>) -> Self {
        self.articles = Some(articles);
        self
    }

    #[must_use]
    pub fn with_facts(mut self, facts: Vec<Fact>) -> Self {
        self.facts = Some(facts);
        self
    }

    #[must_use]
    pub fn with_decisions(mut self, decisions: Vec<DecisionRecord>) -> Self {
        self.decisions = Some(decisions);
        self
    }

    #[must_use]
    pub fn with_extra(mut self, extra: FxHashMap<String, Value>) -> Self {
        self.extra = Some(extra);
        self
    }

    #[must_use]
    pub fn with_draft(mut self, draft: Draft) -> Self {
        self.draft = Some(draft);
        self
    }

    #[must_use]
    pub fn with_control(mut self, control: ControlUpdate) -> Self {
        self.control = Some(control);
        self
    }

    #[must_use]
    pub fn with_errors(mut self, errors: Vec<ErrorEvent>) -> Self {
        self.errors = Some(errors);
        self
    }

    /// True when no field carries data worth merging.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.articles.as_ref().is_none_or(|v| v.is_empty())
            && self.facts.as_ref().is_none_or(|v| v.is_empty())
            && self.decisions.as_ref().is_none_or(|v| v.is_empty())
            && self.extra.as_ref().is_none_or(|m| m.is_empty())
            && self.draft.is_none()
            && self.control.as_ref().is_none_or(|c| c.is_empty())
            && self.errors.as_ref().is_none_or(|v| v.is_empty())
    }
}

/// Errors raised by [`NodeContext`] methods.
#[derive(Debug, Error, Diagnostic)]
pub enum NodeContextError {
    #[error("failed to emit event: event bus unavailable")]
    #[diagnostic(
        code(greenroom::node::event_bus_unavailable),
        help("The event bus may be stopped; check the runner's lifecycle.")
    )]
    EventBusUnavailable,
}

/// Errors a node handler may return.
///
/// All variants are captured into the errors channel by the registry rather
/// than aborting the stage; use `NodePartial::errors` directly for failures
/// that are expected in normal operation.
#[derive(Debug, Error, Diagnostic)]
pub enum NodeError {
    /// Expected input data is missing from the snapshot.
    #[error("missing expected input: {what}")]
    #[diagnostic(
        code(greenroom::node::missing_input),
        help("Check that the upstream node produced the required data.")
    )]
    MissingInput { what: &'static str },

    /// An external provider or service failed.
    #[error("provider error ({provider}): {message}")]
    #[diagnostic(code(greenroom::node::provider))]
    Provider {
        provider: &'static str,
        message: String,
    },

    /// JSON (de)serialization failed inside the handler.
    #[error(transparent)]
    #[diagnostic(code(greenroom::node::serde_json))]
    Serde(#[from] serde_json::Error),

    /// Input validation failed.
    #[error("validation failed: {0}")]
    #[diagnostic(code(greenroom::node::validation))]
    ValidationFailed(String),

    /// Event bus communication failed.
    #[error("event bus error: {0}")]
    #[diagnostic(code(greenroom::node::event_bus))]
    EventBus(#[from] NodeContextError),
}
