use std::fmt;

use serde::{Deserialize, Serialize};

/// Diagnostic scope emitted when a runner finishes or abandons a thread.
pub const STREAM_END_SCOPE: &str = "__greenroom_stream_end__";

/// Structured events emitted during workflow execution.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Event {
    /// Free-form message from inside a node handler.
    Node(NodeEvent),
    /// One completed node execution, success or not.
    Execution(ExecutionEvent),
    /// Engine/runner diagnostics.
    Diagnostic(DiagnosticEvent),
}

impl Event {
    pub fn node_message(
        node_id: impl Into<String>,
        step: u64,
        scope: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Event::Node(NodeEvent {
            node_id: node_id.into(),
            step,
            scope: scope.into(),
            message: message.into(),
        })
    }

    pub fn execution(
        node_id: impl Into<String>,
        step: u64,
        duration_ms: u64,
        success: bool,
    ) -> Self {
        Event::Execution(ExecutionEvent {
            node_id: node_id.into(),
            step,
            duration_ms,
            success,
        })
    }

    pub fn diagnostic(scope: impl Into<String>, message: impl Into<String>) -> Self {
        Event::Diagnostic(DiagnosticEvent {
            scope: scope.into(),
            message: message.into(),
        })
    }

    pub fn scope_label(&self) -> Option<&str> {
        match self {
            Event::Node(node) => Some(&node.scope),
            Event::Execution(_) => Some("execution"),
            Event::Diagnostic(diag) => Some(&diag.scope),
        }
    }

    pub fn message(&self) -> String {
        match self {
            Event::Node(node) => node.message.clone(),
            Event::Execution(exec) => format!(
                "node={} duration_ms={} success={}",
                exec.node_id, exec.duration_ms, exec.success
            ),
            Event::Diagnostic(diag) => diag.message.clone(),
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Node(node) => {
                write!(f, "[{}@{}] {}", node.node_id, node.step, node.message)
            }
            Event::Execution(exec) => write!(
                f,
                "[{}@{}] ran in {}ms ({})",
                exec.node_id,
                exec.step,
                exec.duration_ms,
                if exec.success { "ok" } else { "failed" }
            ),
            Event::Diagnostic(diag) => write!(f, "{}", diag.message),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeEvent {
    pub node_id: String,
    pub step: u64,
    pub scope: String,
    pub message: String,
}

/// Observability record for one node execution: `{node_id, duration_ms,
/// success}` plus the stage counter.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutionEvent {
    pub node_id: String,
    pub step: u64,
    pub duration_ms: u64,
    pub success: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiagnosticEvent {
    pub scope: String,
    pub message: String,
}
