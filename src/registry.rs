//! Node registry: dynamic dispatch and bounded execution.
//!
//! The registry maps node ids to handler trait objects. Registration is
//! idempotent - re-registering an id replaces the handler, which supports
//! hot-reload - and an unregistered id only fails at execution-time lookup.
//!
//! Execution is where the engine's failure isolation lives: every handler
//! runs under its configured timeout, and both timeouts and handler errors
//! are *captured* into an error-channel partial instead of propagating, so a
//! single failing node can never crash a concurrent batch. Only structural
//! problems (no handler, no config) abort the call.

use std::time::Instant;

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::instrument;

use crate::channels::errors::{ErrorEvent, FaultDetail};
use crate::config::{ConfigManager, DEFAULT_NODE_TIMEOUT_SECS, NodeConfig};
use crate::event_bus::Event;
use crate::node::{ControlUpdate, NodeContext, NodeHandler, NodePartial};
use crate::state::StateSnapshot;
use crate::types::NodeId;

/// Structural registry failures. Recoverable node faults never surface here.
#[derive(Debug, Error, Diagnostic)]
pub enum RegistryError {
    #[error("no handler registered for node: {id}")]
    #[diagnostic(
        code(greenroom::registry::unknown_node),
        help("Call NodeRegistry::register before executing, or disable the node.")
    )]
    UnknownNode { id: String },

    #[error("no configuration for node: {id}")]
    #[diagnostic(
        code(greenroom::registry::missing_config),
        help("Every executable node needs a NodeConfig in the ConfigManager.")
    )]
    MissingConfig { id: String },

    #[error("config resolution failed for node {id}: {message}")]
    #[diagnostic(code(greenroom::registry::config))]
    Config { id: String, message: String },
}

/// Result of executing a set of node ids concurrently.
///
/// `outputs` is aligned with `ran` in the order the ids were requested -
/// a stable order the barrier relies on for deterministic merges - even
/// though task completion order is arbitrary.
#[derive(Debug, Default)]
pub struct StageRunResult {
    pub ran: Vec<NodeId>,
    pub skipped: Vec<NodeId>,
    pub outputs: Vec<(NodeId, NodePartial)>,
}

/// Maps node ids to handlers and executes them under the engine's contract.
#[derive(Clone, Default)]
pub struct NodeRegistry {
    handlers: FxHashMap<String, Arc<dyn NodeHandler>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the handler for `id`.
    pub fn register(&mut self, id: impl Into<String>, handler: impl NodeHandler + 'static) -> &mut Self {
        self.register_arc(id, Arc::new(handler))
    }

    pub fn register_arc(&mut self, id: impl Into<String>, handler: Arc<dyn NodeHandler>) -> &mut Self {
        let id = id.into();
        if self.handlers.insert(id.clone(), handler).is_some() {
            tracing::info!(node = %id, "replaced node handler");
        } else {
            tracing::debug!(node = %id, "registered node handler");
        }
        self
    }

    /// Builder-style [`register`](Self::register).
    #[must_use]
    pub fn with_handler(mut self, id: impl Into<String>, handler: impl NodeHandler + 'static) -> Self {
        self.register(id, handler);
        self
    }

    pub fn unregister(&mut self, id: &str) -> bool {
        self.handlers.remove(id).is_some()
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.handlers.contains_key(id)
    }

    /// Registered ids, sorted.
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.handlers.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Execute one node with resolved config and request-scoped overrides.
    ///
    /// A disabled node yields an empty partial. Timeouts and handler errors
    /// come back captured in the partial's error field.
    #[instrument(skip(self, snapshot, config, overrides, events), err)]
    pub async fn execute(
        &self,
        id: &str,
        snapshot: StateSnapshot,
        config: &ConfigManager,
        overrides: Option<&Map<String, Value>>,
        step: u64,
        events: flume::Sender<Event>,
    ) -> Result<NodePartial, RegistryError> {
        let effective = self.resolve_config(id, config, overrides)?;
        if !effective.enabled {
            tracing::info!(node = %id, "node disabled; skipping execution");
            return Ok(NodePartial::default());
        }
        let handler = self
            .handlers
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownNode { id: id.to_string() })?;
        Ok(run_guarded(handler, id.to_string(), effective, snapshot, step, events).await)
    }

    /// Execute all `ids` concurrently and collect their partials.
    ///
    /// Handlers are validated up front (structural errors abort before any
    /// task is spawned); after that, each node runs isolated - one timing
    /// out or failing never cancels its siblings. Virtual `Start`/`End` ids
    /// and disabled nodes are reported in `skipped`.
    #[instrument(skip(self, snapshot, config, events), err)]
    pub async fn execute_many(
        &self,
        ids: &[NodeId],
        snapshot: StateSnapshot,
        config: &ConfigManager,
        step: u64,
        events: flume::Sender<Event>,
    ) -> Result<StageRunResult, RegistryError> {
        let mut runnable: Vec<(usize, String, Arc<dyn NodeHandler>, NodeConfig)> = Vec::new();
        let mut result = StageRunResult::default();

        for (index, id) in ids.iter().enumerate() {
            let Some(name) = id.name() else {
                result.skipped.push(id.clone());
                continue;
            };
            let effective = self.resolve_config(name, config, None)?;
            if !effective.enabled {
                tracing::info!(node = %name, "node disabled; skipping");
                result.skipped.push(id.clone());
                continue;
            }
            let handler = self
                .handlers
                .get(name)
                .cloned()
                .ok_or_else(|| RegistryError::UnknownNode {
                    id: name.to_string(),
                })?;
            runnable.push((index, name.to_string(), handler, effective));
        }

        let mut tasks: JoinSet<(usize, NodePartial)> = JoinSet::new();
        for (index, name, handler, effective) in &runnable {
            let index = *index;
            let name = name.clone();
            let handler = handler.clone();
            let effective = effective.clone();
            let snapshot = snapshot.clone();
            let events = events.clone();
            tasks.spawn(async move {
                let partial =
                    run_guarded(handler, name, effective, snapshot, step, events).await;
                (index, partial)
            });
        }

        let mut outputs_by_index: FxHashMap<usize, NodePartial> = FxHashMap::default();
        let mut panic_seq = 0usize;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, partial)) => {
                    outputs_by_index.insert(index, partial);
                }
                Err(join_error) => {
                    // A panicking handler is treated like a handler failure:
                    // captured, not propagated. The JoinSet cannot say which
                    // task died, so the event is stage-scoped.
                    let message = format!("node task failed: {join_error}");
                    tracing::error!(step, %message, "node task join error");
                    let captured = NodePartial::new()
                        .with_errors(vec![
                            ErrorEvent::stage(step, FaultDetail::msg(message.clone()))
                                .with_tag("panic"),
                        ])
                        .with_control(
                            ControlUpdate::default().with_last_error(Some(message)),
                        );
                    outputs_by_index.insert(ids.len() + panic_seq, captured);
                    panic_seq += 1;
                }
            }
        }

        // Reassemble in requested order so the barrier merge is stable.
        let mut indexed: Vec<(usize, NodePartial)> = outputs_by_index.into_iter().collect();
        indexed.sort_by_key(|(index, _)| *index);
        for (index, partial) in indexed {
            let id = if index < ids.len() {
                ids[index].clone()
            } else {
                NodeId::named("?")
            };
            result.ran.push(id.clone());
            result.outputs.push((id, partial));
        }

        Ok(result)
    }

    fn resolve_config(
        &self,
        id: &str,
        config: &ConfigManager,
        overrides: Option<&Map<String, Value>>,
    ) -> Result<NodeConfig, RegistryError> {
        config.resolve(id, overrides).map_err(|e| match e {
            crate::config::ConfigError::UnknownNode { id } => RegistryError::MissingConfig { id },
            other => RegistryError::Config {
                id: id.to_string(),
                message: other.to_string(),
            },
        })
    }
}

/// Run one handler under its timeout, capturing every failure mode into the
/// returned partial and emitting the execution record.
async fn run_guarded(
    handler: Arc<dyn NodeHandler>,
    node_id: String,
    config: NodeConfig,
    snapshot: StateSnapshot,
    step: u64,
    events: flume::Sender<Event>,
) -> NodePartial {
    let timeout_seconds = if config.timeout_seconds == 0 {
        DEFAULT_NODE_TIMEOUT_SECS
    } else {
        config.timeout_seconds
    };
    let timeout = std::time::Duration::from_secs(timeout_seconds);

    let ctx = NodeContext {
        node_id: node_id.clone(),
        step,
        config,
        event_sender: events.clone(),
    };

    let started = Instant::now();
    let outcome = tokio::time::timeout(timeout, handler.run(snapshot, ctx)).await;
    let duration_ms = started.elapsed().as_millis() as u64;

    let (partial, success) = match outcome {
        Ok(Ok(partial)) => (partial, true),
        Ok(Err(node_error)) => {
            let message = format!("node '{node_id}' failed: {node_error}");
            tracing::warn!(node = %node_id, step, error = %node_error, "node handler failed");
            let captured = NodePartial::new()
                .with_errors(vec![
                    ErrorEvent::node(node_id.clone(), step, FaultDetail::msg(message.clone()))
                        .with_tag("handler"),
                ])
                .with_control(ControlUpdate::default().with_last_error(Some(message)));
            (captured, false)
        }
        Err(_elapsed) => {
            let message = format!("node '{node_id}' timed out after {timeout_seconds}s");
            tracing::warn!(node = %node_id, step, timeout_seconds, "node timed out");
            let captured = NodePartial::new()
                .with_errors(vec![
                    ErrorEvent::node(node_id.clone(), step, FaultDetail::msg(message.clone()))
                        .with_tag("timeout"),
                ])
                .with_control(ControlUpdate::default().with_last_error(Some(message)));
            (captured, false)
        }
    };

    tracing::info!(node = %node_id, step, duration_ms, success, "node execution finished");
    // Observability only; a full or closed bus must not affect the run.
    let _ = events.send(Event::execution(node_id, step, duration_ms, success));

    partial
}
