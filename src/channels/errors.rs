//! Error events recorded in the `errors` state channel.
//!
//! Node timeouts and handler failures are *recoverable*: they are captured
//! into these events and merged like any other state, never raised across a
//! stage. Scope identifies where in the engine the fault surfaced.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where an error event originated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum ErrorScope {
    /// Inside a node handler (or its timeout wrapper).
    Node { node: String, step: u64 },
    /// In stage scheduling/fan-out.
    Stage { step: u64 },
    /// In the thread runner.
    Runner { thread: String, step: u64 },
    /// Anywhere else in the engine.
    #[default]
    Engine,
}

/// The fault itself, with an optional cause chain and free-form details.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FaultDetail {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<FaultDetail>>,
    #[serde(default)]
    pub details: serde_json::Value,
}

impl Default for FaultDetail {
    fn default() -> Self {
        FaultDetail {
            message: String::new(),
            cause: None,
            details: serde_json::Value::Null,
        }
    }
}

impl FaultDetail {
    pub fn msg(message: impl Into<String>) -> Self {
        FaultDetail {
            message: message.into(),
            cause: None,
            details: serde_json::Value::Null,
        }
    }

    #[must_use]
    pub fn with_cause(mut self, cause: FaultDetail) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

impl std::fmt::Display for FaultDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for FaultDetail {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause.as_ref().map(|c| c as &dyn std::error::Error)
    }
}

/// A recorded error event: when, where, what, plus tags and context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ErrorEvent {
    #[serde(default = "chrono::Utc::now")]
    pub when: DateTime<Utc>,
    #[serde(default)]
    pub scope: ErrorScope,
    #[serde(default)]
    pub error: FaultDetail,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub context: serde_json::Value,
}

impl ErrorEvent {
    /// Node-scoped event.
    pub fn node(node: impl Into<String>, step: u64, error: FaultDetail) -> Self {
        Self {
            when: Utc::now(),
            scope: ErrorScope::Node {
                node: node.into(),
                step,
            },
            error,
            tags: Vec::new(),
            context: serde_json::Value::Null,
        }
    }

    /// Stage-scoped event.
    pub fn stage(step: u64, error: FaultDetail) -> Self {
        Self {
            when: Utc::now(),
            scope: ErrorScope::Stage { step },
            error,
            tags: Vec::new(),
            context: serde_json::Value::Null,
        }
    }

    /// Runner-scoped event.
    pub fn runner(thread: impl Into<String>, step: u64, error: FaultDetail) -> Self {
        Self {
            when: Utc::now(),
            scope: ErrorScope::Runner {
                thread: thread.into(),
                step,
            },
            error,
            tags: Vec::new(),
            context: serde_json::Value::Null,
        }
    }

    /// Engine-scoped event.
    pub fn engine(error: FaultDetail) -> Self {
        Self {
            when: Utc::now(),
            scope: ErrorScope::Engine,
            error,
            tags: Vec::new(),
            context: serde_json::Value::Null,
        }
    }

    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    #[must_use]
    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = context;
        self
    }

    /// True if this event was produced by the per-node timeout wrapper.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        self.tags.iter().any(|t| t == "timeout")
    }
}
