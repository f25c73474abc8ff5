//! Core identifier and status types for the greenroom workflow engine.
//!
//! This module defines the fundamental vocabulary shared by every other
//! module: node identifiers, state channel identifiers, and the run status
//! machine. Runtime infrastructure types (checkpoints, thread ids) live in
//! [`crate::runtimes`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies a node within a workflow graph.
///
/// `Start` and `End` are virtual endpoints: they are never registered with a
/// handler and never executed. Every real processing step is a `Named` node
/// whose string id must be unique within the workflow (and must not be the
/// literal `"Start"` or `"End"`).
///
/// # Persistence
///
/// `NodeId` round-trips through [`encode`](Self::encode) /
/// [`decode`](Self::decode) for checkpoint storage.
///
/// ```rust
/// use greenroom::types::NodeId;
///
/// let node = NodeId::named("compile_script");
/// assert_eq!(node.encode(), "compile_script");
/// assert_eq!(NodeId::decode("compile_script"), node);
/// assert_eq!(NodeId::decode("End"), NodeId::End);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeId {
    /// Virtual entry point; the initial frontier hangs off it.
    Start,
    /// Virtual terminal; routing here completes the run.
    End,
    /// A real, registered processing step.
    Named(String),
}

impl NodeId {
    pub fn named(name: impl Into<String>) -> Self {
        NodeId::Named(name.into())
    }

    /// The node's registry/config key, if it is a real node.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match self {
            NodeId::Named(name) => Some(name),
            _ => None,
        }
    }

    /// Encode into the persisted string form.
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            NodeId::Start => "Start".to_string(),
            NodeId::End => "End".to_string(),
            NodeId::Named(name) => name.clone(),
        }
    }

    /// Decode a persisted string form. `"Start"`/`"End"` map to the virtual
    /// endpoints; everything else is a named node.
    pub fn decode(s: &str) -> Self {
        match s {
            "Start" => NodeId::Start,
            "End" => NodeId::End,
            other => NodeId::Named(other.to_string()),
        }
    }

    #[must_use]
    pub fn is_start(&self) -> bool {
        matches!(self, Self::Start)
    }

    #[must_use]
    pub fn is_end(&self) -> bool {
        matches!(self, Self::End)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => write!(f, "Start"),
            Self::End => write!(f, "End"),
            Self::Named(name) => write!(f, "{name}"),
        }
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        NodeId::decode(s)
    }
}

/// Identifies one state channel and therefore one merge policy.
///
/// Every field of [`crate::state::WorkflowState`] is a channel with a fixed
/// merge policy; reducers are registered per channel.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelId {
    /// Collected source articles, append-unique keyed by source URL.
    Articles,
    /// Extracted facts, append-unique keyed by record id.
    Facts,
    /// Approval decision log, append-unique keyed by record id.
    Decisions,
    /// Free-form metadata map, dict-union (right-hand wins).
    Extra,
    /// The current script draft, overwrite.
    Draft,
    /// Run control fields, overwrite per field.
    Control,
    /// Error events, append.
    Errors,
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Articles => "articles",
            Self::Facts => "facts",
            Self::Decisions => "decisions",
            Self::Extra => "extra",
            Self::Draft => "draft",
            Self::Control => "control",
            Self::Errors => "errors",
        };
        write!(f, "{label}")
    }
}

/// Lifecycle status of one workflow thread.
///
/// Transitions: `Running → AwaitingApproval → (Running | Revising |
/// Terminated)`; `Revising` re-enters `Running` semantics and eventually
/// reaches `AwaitingApproval` again; `Completed` and `Terminated` are final.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Stages are executing (or the thread is between stages).
    #[default]
    Running,
    /// Paused at a gate, waiting for an external decision.
    AwaitingApproval,
    /// A rejection routed the thread back to its revision entry node.
    Revising,
    /// All stages finished (or a route reached `End`).
    Completed,
    /// The revision ceiling was hit; the thread is closed fail-safe.
    Terminated,
}

impl RunStatus {
    /// Final states accept no further `resume` calls.
    #[must_use]
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Completed | Self::Terminated)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Running => "running",
            Self::AwaitingApproval => "awaiting_approval",
            Self::Revising => "revising",
            Self::Completed => "completed",
            Self::Terminated => "terminated",
        };
        write!(f, "{label}")
    }
}

/// Control fields of a running thread, stored in the `control` channel with
/// overwrite-per-field semantics.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunControl {
    /// Current lifecycle status.
    pub status: RunStatus,
    /// The gate this thread is paused at, if any.
    pub pending_gate: Option<NodeId>,
    /// Number of rejection-driven revision loops taken so far.
    pub revision_count: u32,
    /// Message of the most recent captured node failure, in stable node-id
    /// order when several nodes of one stage fail.
    pub last_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_encode_decode_roundtrip() {
        for id in [
            NodeId::Start,
            NodeId::End,
            NodeId::named("aggregate"),
            NodeId::named("compile_script"),
        ] {
            assert_eq!(NodeId::decode(&id.encode()), id);
        }
    }

    #[test]
    fn node_id_from_str_maps_endpoints() {
        assert_eq!(NodeId::from("Start"), NodeId::Start);
        assert_eq!(NodeId::from("End"), NodeId::End);
        assert_eq!(NodeId::from("publish"), NodeId::named("publish"));
    }

    #[test]
    fn final_statuses() {
        assert!(RunStatus::Completed.is_final());
        assert!(RunStatus::Terminated.is_final());
        assert!(!RunStatus::AwaitingApproval.is_final());
        assert!(!RunStatus::Revising.is_final());
    }
}
