//! Approval gates and the revision controller.
//!
//! A gate is a node that always pauses the run pending an external decision.
//! Reaching one triggers the gate's notifier (fire-and-forget), persists a
//! paused checkpoint, and returns control to the caller. The route taken on
//! `resume` is a closed set of variants - there is no string-typed routing
//! to get wrong at runtime.

use std::sync::Arc;

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use serde_json::Value;
use thiserror::Error;

use crate::content::{DecisionRecord, Draft};
use crate::types::NodeId;

/// Default revision ceiling when a gate does not set one.
pub const DEFAULT_MAX_REVISIONS: u32 = 3;

/// Payload handed to an approval notifier when a gate is reached: enough
/// state for an external reviewer to act on.
#[derive(Clone, Debug)]
pub struct ApprovalRequest {
    pub thread_id: String,
    pub gate: NodeId,
    pub step: u64,
    pub draft: Option<Draft>,
    pub revision_count: u32,
    pub extra: FxHashMap<String, Value>,
}

#[derive(Debug, Error)]
#[error("approval notification failed: {0}")]
pub struct NotifyError(pub String);

/// External collaborator that relays an approval request to reviewers
/// (chat message, ticket, webhook - opaque to the engine).
///
/// Invoked fire-and-forget: the engine never retries and a failure is
/// logged, not fatal to the pause.
#[async_trait]
pub trait ApprovalNotifier: Send + Sync {
    async fn notify(&self, request: ApprovalRequest) -> Result<(), NotifyError>;
}

/// Notifier that does nothing; useful in tests and headless runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

#[async_trait]
impl ApprovalNotifier for NoopNotifier {
    async fn notify(&self, _request: ApprovalRequest) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// The closed set of routes out of a gate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GateRoute {
    /// Continue forward past the gate.
    Approved,
    /// Re-enter the graph at the designated revision node.
    RevisionNeeded(NodeId),
    /// Revision ceiling reached: close the thread fail-safe.
    Terminated,
}

/// Declaration of one approval gate.
#[derive(Clone)]
pub struct GateSpec {
    /// The gate's node id.
    pub id: NodeId,
    /// Nodes that must complete before the gate is reached.
    pub depends_on: Vec<String>,
    /// Where a rejection re-enters the graph. Always a specific earlier
    /// node, never the start of the run.
    pub on_reject: NodeId,
    /// Rejections allowed before the thread terminates.
    pub max_revisions: u32,
    /// External notifier invoked when the gate is reached.
    pub notifier: Arc<dyn ApprovalNotifier>,
}

impl std::fmt::Debug for GateSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GateSpec")
            .field("id", &self.id)
            .field("depends_on", &self.depends_on)
            .field("on_reject", &self.on_reject)
            .field("max_revisions", &self.max_revisions)
            .finish()
    }
}

impl GateSpec {
    pub fn new(id: impl Into<NodeId>, on_reject: impl Into<NodeId>) -> Self {
        Self {
            id: id.into(),
            depends_on: Vec::new(),
            on_reject: on_reject.into(),
            max_revisions: DEFAULT_MAX_REVISIONS,
            notifier: Arc::new(NoopNotifier),
        }
    }

    #[must_use]
    pub fn with_depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = deps.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_max_revisions(mut self, max_revisions: u32) -> Self {
        self.max_revisions = max_revisions;
        self
    }

    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn ApprovalNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Route a decision, enforcing the revision ceiling.
    ///
    /// `revision_count` is the count *before* this decision; the caller
    /// increments it when the route is [`GateRoute::RevisionNeeded`].
    #[must_use]
    pub fn route(&self, decision: &DecisionRecord, revision_count: u32) -> GateRoute {
        if decision.approved {
            GateRoute::Approved
        } else if revision_count >= self.max_revisions {
            GateRoute::Terminated
        } else {
            GateRoute::RevisionNeeded(self.on_reject.clone())
        }
    }

    /// Dispatch the notifier on a detached task. Failures are logged; the
    /// pause itself never depends on delivery.
    pub fn notify_detached(&self, request: ApprovalRequest) {
        let notifier = self.notifier.clone();
        let gate = self.id.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier.notify(request).await {
                tracing::warn!(gate = %gate, error = %e, "approval notification failed");
            }
        });
    }
}
