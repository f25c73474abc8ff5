//! Checkpoint store: thread-scoped state persistence.
//!
//! A checkpoint is the full workflow state of one thread plus its
//! next-to-run nodes, overwritten after every stage. The engine only
//! requires per-key atomicity from a backend: a save replaces the whole
//! record or does nothing. Checkpoints are never deleted by the engine;
//! retention is an external policy.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::state::WorkflowState;
use crate::types::NodeId;

/// Persisted snapshot of one thread.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    pub thread_id: String,
    /// Stage counter at save time.
    pub step: u64,
    pub state: WorkflowState,
    /// Nodes the run will execute next; empty means paused-at-gate or done.
    pub next_nodes: Vec<NodeId>,
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(
        thread_id: impl Into<String>,
        step: u64,
        state: &WorkflowState,
        next_nodes: Vec<NodeId>,
    ) -> Self {
        Self {
            thread_id: thread_id.into(),
            step,
            state: state.clone(),
            next_nodes,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum CheckpointerError {
    #[error("checkpoint backend error: {message}")]
    #[diagnostic(code(greenroom::checkpointer::backend))]
    Backend { message: String },

    #[error("checkpoint serialization error: {message}")]
    #[diagnostic(code(greenroom::checkpointer::serde))]
    Serde { message: String },

    #[error("checkpointer error: {message}")]
    #[diagnostic(code(greenroom::checkpointer::other))]
    Other { message: String },
}

pub type Result<T> = std::result::Result<T, CheckpointerError>;

/// Key-value persistence interface keyed by thread id.
///
/// `save` must be atomic per key (replace-of-record, never partial-field
/// updates). Concurrency across *different* threads needs no coordination.
#[async_trait]
pub trait Checkpointer: Send + Sync {
    async fn save(&self, checkpoint: Checkpoint) -> Result<()>;
    async fn load_latest(&self, thread_id: &str) -> Result<Option<Checkpoint>>;
    async fn list_threads(&self) -> Result<Vec<String>>;
}

/// Which checkpoint backend a runner should construct.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CheckpointerType {
    /// Volatile storage for tests and development.
    InMemory,
    /// Durable SQLite-backed persistence.
    #[cfg(feature = "sqlite")]
    Sqlite,
}

/// Volatile checkpoint store. Saves replace the whole record under a lock,
/// which gives the required per-key atomicity.
#[derive(Clone, Default)]
pub struct InMemoryCheckpointer {
    inner: Arc<Mutex<FxHashMap<String, Checkpoint>>>,
}

impl InMemoryCheckpointer {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Checkpointer for InMemoryCheckpointer {
    async fn save(&self, checkpoint: Checkpoint) -> Result<()> {
        self.inner
            .lock()
            .expect("checkpoint map poisoned")
            .insert(checkpoint.thread_id.clone(), checkpoint);
        Ok(())
    }

    async fn load_latest(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
        Ok(self
            .inner
            .lock()
            .expect("checkpoint map poisoned")
            .get(thread_id)
            .cloned())
    }

    async fn list_threads(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self
            .inner
            .lock()
            .expect("checkpoint map poisoned")
            .keys()
            .cloned()
            .collect();
        ids.sort();
        Ok(ids)
    }
}
