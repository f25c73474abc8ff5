//! Thread lifecycle: the public Run API.
//!
//! `WorkflowRunner` drives a compiled [`Engine`] stage by stage, persisting
//! a checkpoint after every barrier, pausing at approval gates, and resuming
//! threads from their last checkpoint - across process restarts, since the
//! checkpoint store is the source of truth.
//!
//! Concurrency contract: each thread's checkpoint is only ever written by
//! the single in-flight `start`/`resume` call for that thread (a per-thread
//! async lock serializes them); different threads are fully independent and
//! run concurrently without coordination.

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde_json::json;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::instrument;

use crate::channels::Channel;
use crate::content::{DecisionRecord, DraftStatus};
use crate::engine::{Engine, EngineError};
use crate::event_bus::{Event, EventBus, STREAM_END_SCOPE};
use crate::gates::{ApprovalRequest, GateRoute, GateSpec};
use crate::node::{ControlUpdate, NodePartial};
use crate::planner::PlanError;
use crate::registry::RegistryError;
use crate::runtimes::checkpointer::{
    Checkpoint, Checkpointer, CheckpointerError, CheckpointerType, InMemoryCheckpointer,
};
use crate::state::WorkflowState;
use crate::types::{NodeId, RunStatus};
use crate::utils::ids;

/// Outcome of one `start` or `resume` call.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub thread_id: String,
    pub status: RunStatus,
    /// Frontier the thread will execute next; empty when paused or final.
    pub next_nodes: Vec<NodeId>,
    /// Stage counter after this call.
    pub step: u64,
    /// The thread's state after this call (also persisted).
    pub state: WorkflowState,
}

#[derive(Debug, Error, Diagnostic)]
pub enum RunnerError {
    #[error("thread already exists: {thread_id}")]
    #[diagnostic(
        code(greenroom::runner::thread_exists),
        help("Use resume() to continue an existing thread.")
    )]
    ThreadExists { thread_id: String },

    #[error("no nodes to run: the compiled plan is empty")]
    #[diagnostic(
        code(greenroom::runner::no_start_nodes),
        help("Add at least one enabled node to the graph.")
    )]
    NoStartNodes,

    #[error("cannot resume thread {thread_id}: {reason}")]
    #[diagnostic(
        code(greenroom::runner::invalid_resume_state),
        help("resume() requires an existing thread paused at a gate and a decision patch for that gate.")
    )]
    InvalidResumeState { thread_id: String, reason: String },

    #[error(transparent)]
    #[diagnostic(code(greenroom::runner::checkpointer))]
    Checkpointer(#[from] CheckpointerError),

    #[error(transparent)]
    #[diagnostic(code(greenroom::runner::engine))]
    Engine(#[from] EngineError),

    #[error(transparent)]
    #[diagnostic(code(greenroom::runner::plan))]
    Plan(#[from] PlanError),

    #[error(transparent)]
    #[diagnostic(code(greenroom::runner::registry))]
    Registry(#[from] RegistryError),
}

/// Drives workflow threads against a shared engine.
pub struct WorkflowRunner {
    engine: Arc<Engine>,
    checkpointer: Arc<dyn Checkpointer>,
    event_bus: EventBus,
    locks: Mutex<FxHashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl WorkflowRunner {
    /// Construct a runner using the engine's runtime configuration for the
    /// checkpoint backend and event bus.
    pub async fn new(engine: Engine) -> Result<Self, RunnerError> {
        let checkpointer_type = engine
            .runtime_config()
            .checkpointer
            .clone()
            .unwrap_or(CheckpointerType::InMemory);
        Self::with_checkpointer_type(engine, checkpointer_type).await
    }

    pub async fn with_checkpointer_type(
        engine: Engine,
        checkpointer_type: CheckpointerType,
    ) -> Result<Self, RunnerError> {
        let checkpointer = Self::create_checkpointer(&engine, checkpointer_type).await?;
        Ok(Self::with_checkpointer(engine, checkpointer))
    }

    /// Construct with an explicit checkpoint store (e.g. a custom backend).
    pub fn with_checkpointer(engine: Engine, checkpointer: Arc<dyn Checkpointer>) -> Self {
        let event_bus = engine.runtime_config().event_bus.build_event_bus();
        event_bus.listen_for_events();
        Self {
            engine: Arc::new(engine),
            checkpointer,
            event_bus,
            locks: Mutex::new(FxHashMap::default()),
        }
    }

    async fn create_checkpointer(
        engine: &Engine,
        checkpointer_type: CheckpointerType,
    ) -> Result<Arc<dyn Checkpointer>, RunnerError> {
        match checkpointer_type {
            CheckpointerType::InMemory => Ok(Arc::new(InMemoryCheckpointer::new())),
            #[cfg(feature = "sqlite")]
            CheckpointerType::Sqlite => {
                let db_url = std::env::var("GREENROOM_SQLITE_URL")
                    .ok()
                    .or_else(|| {
                        engine
                            .runtime_config()
                            .sqlite_db_name
                            .as_ref()
                            .map(|name| format!("sqlite://{name}"))
                    })
                    .unwrap_or_else(|| "sqlite://greenroom.db".to_string());
                let cp = crate::runtimes::SqliteCheckpointer::connect(&db_url).await?;
                Ok(Arc::new(cp))
            }
        }
    }

    #[must_use]
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    #[must_use]
    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Start a new thread. Fails with [`RunnerError::ThreadExists`] if the
    /// id already has a checkpoint; use [`resume`](Self::resume) for those.
    ///
    /// Runs until the first gate, a terminal route, or plan exhaustion, and
    /// returns the (possibly paused) result. The generated thread id is in
    /// the result when none was supplied.
    #[instrument(skip(self, initial_state), err)]
    pub async fn start(
        &self,
        thread_id: Option<String>,
        initial_state: WorkflowState,
    ) -> Result<RunResult, RunnerError> {
        let thread_id = thread_id.unwrap_or_else(ids::random_thread_id);
        let lock = self.thread_lock(&thread_id);
        let _guard = lock.lock().await;

        if self.checkpointer.load_latest(&thread_id).await?.is_some() {
            return Err(RunnerError::ThreadExists { thread_id });
        }

        let frontier = self.engine.initial_frontier();
        if frontier.is_empty() {
            return Err(RunnerError::NoStartNodes);
        }

        let mut state = initial_state;
        state
            .extra
            .get_mut()
            .entry("thread_id".to_string())
            .or_insert_with(|| json!(thread_id.clone()));

        // First checkpoint before any stage runs, so the thread is visible
        // and resumable from step zero.
        self.save_checkpoint(&thread_id, 0, &state, frontier.clone())
            .await?;

        tracing::info!(thread = %thread_id, "workflow thread started");
        self.drive(&thread_id, state, frontier, 0).await
    }

    /// Resume a thread paused at a gate with a decision patch.
    ///
    /// The patch is merged into state through the normal merge algebra and
    /// must contain a [`DecisionRecord`] for the pending gate. Routing reads
    /// only the latest record for that gate.
    #[instrument(skip(self, patch), err)]
    pub async fn resume(
        &self,
        thread_id: &str,
        patch: NodePartial,
    ) -> Result<RunResult, RunnerError> {
        let lock = self.thread_lock(thread_id);
        let _guard = lock.lock().await;

        let Some(checkpoint) = self.checkpointer.load_latest(thread_id).await? else {
            return Err(self.invalid_resume(thread_id, "no checkpoint for thread"));
        };

        let mut state = checkpoint.state;
        let control = state.control.snapshot();
        let Some(gate_id) = control.pending_gate.clone() else {
            return Err(self.invalid_resume(thread_id, "thread is not paused at a gate"));
        };
        if control.status != RunStatus::AwaitingApproval {
            return Err(self.invalid_resume(
                thread_id,
                &format!("thread status is {}, expected awaiting_approval", control.status),
            ));
        }
        let Some(gate) = self.engine.gate(&gate_id).cloned() else {
            return Err(self.invalid_resume(
                thread_id,
                &format!("paused at unknown gate {gate_id}"),
            ));
        };
        let patch_has_decision = patch
            .decisions
            .as_ref()
            .is_some_and(|ds| ds.iter().any(|d| d.gate == gate_id));
        if !patch_has_decision {
            return Err(self.invalid_resume(
                thread_id,
                "decision patch must include a DecisionRecord for the pending gate",
            ));
        }

        let step = checkpoint.step;
        self.engine.apply_barrier(&mut state, &[], vec![patch])?;

        let snapshot = state.snapshot();
        let decision = snapshot
            .latest_decision_for(&gate_id)
            .cloned()
            .expect("decision present after merge");
        let revision_count = snapshot.control.revision_count;

        match gate.route(&decision, revision_count) {
            GateRoute::Approved => {
                tracing::info!(thread = %thread_id, gate = %gate_id, "gate approved");
                let mut partial = NodePartial::new().with_control(
                    ControlUpdate::status(RunStatus::Running).with_pending_gate(None),
                );
                if let Some(draft) = snapshot.draft.clone() {
                    partial.draft = Some(draft.with_status(DraftStatus::Approved));
                }
                self.engine.apply_barrier(&mut state, &[], vec![partial])?;
                let frontier = self.engine.frontier_after(&gate_id)?;
                self.drive(thread_id, state, frontier, step).await
            }
            GateRoute::RevisionNeeded(entry) => {
                tracing::info!(
                    thread = %thread_id,
                    gate = %gate_id,
                    entry = %entry,
                    revision = revision_count + 1,
                    "gate rejected; entering revision loop"
                );
                let mut partial = NodePartial::new().with_control(
                    ControlUpdate::status(RunStatus::Revising)
                        .with_pending_gate(None)
                        .with_revision_count(revision_count + 1),
                );
                if let Some(draft) = snapshot.draft.clone() {
                    partial.draft = Some(draft.with_status(DraftStatus::Rejected));
                }
                self.engine.apply_barrier(&mut state, &[], vec![partial])?;
                self.drive(thread_id, state, vec![entry], step).await
            }
            GateRoute::Terminated => {
                tracing::warn!(
                    thread = %thread_id,
                    gate = %gate_id,
                    revision_count,
                    max_revisions = gate.max_revisions,
                    "revision ceiling reached; terminating thread"
                );
                let partial = NodePartial::new().with_control(
                    ControlUpdate::status(RunStatus::Terminated).with_pending_gate(None),
                );
                self.engine.apply_barrier(&mut state, &[], vec![partial])?;
                self.save_checkpoint(thread_id, step, &state, vec![]).await?;
                self.emit_stream_end(thread_id, RunStatus::Terminated, step);
                Ok(RunResult {
                    thread_id: thread_id.to_string(),
                    status: RunStatus::Terminated,
                    next_nodes: vec![],
                    step,
                    state,
                })
            }
        }
    }

    /// The persisted state of a thread, if it exists.
    pub async fn get_state(&self, thread_id: &str) -> Result<Option<WorkflowState>, RunnerError> {
        Ok(self
            .checkpointer
            .load_latest(thread_id)
            .await?
            .map(|cp| cp.state))
    }

    /// The thread's full decision log in append order (empty for unknown
    /// threads).
    pub async fn get_decision_log(
        &self,
        thread_id: &str,
    ) -> Result<Vec<DecisionRecord>, RunnerError> {
        Ok(self
            .get_state(thread_id)
            .await?
            .map(|state| state.decision_log())
            .unwrap_or_default())
    }

    pub async fn list_threads(&self) -> Result<Vec<String>, RunnerError> {
        Ok(self.checkpointer.list_threads().await?)
    }

    /// Execute stages from `frontier` until a gate, a terminal route, or
    /// plan exhaustion. Stage *k+1* never starts before stage *k* has fully
    /// merged and checkpointed.
    async fn drive(
        &self,
        thread_id: &str,
        mut state: WorkflowState,
        mut frontier: Vec<NodeId>,
        mut step: u64,
    ) -> Result<RunResult, RunnerError> {
        'replan: loop {
            frontier.retain(|id| !id.is_end());
            if frontier.is_empty() {
                return self.complete(thread_id, state, step).await;
            }

            let plan = self.engine.plan_from(&frontier)?;
            let stages: Vec<Vec<NodeId>> = plan.stages().to_vec();
            if stages.is_empty() {
                return self.complete(thread_id, state, step).await;
            }

            for (index, stage) in stages.iter().enumerate() {
                // Gates occupy singleton stages; reaching one pauses the run
                // before any execution.
                if let Some(gate) = stage.iter().find_map(|id| self.engine.gate(id)) {
                    let gate = gate.clone();
                    return self.pause_at_gate(thread_id, state, gate, step).await;
                }

                step += 1;
                tracing::debug!(thread = %thread_id, step, nodes = stage.len(), "starting stage");

                let snapshot = state.snapshot();
                let run = self
                    .engine
                    .execute_stage(snapshot, stage, step, self.event_bus.get_sender())
                    .await?;

                let partials: Vec<NodePartial> =
                    run.outputs.into_iter().map(|(_, partial)| partial).collect();
                let outcome = self.engine.apply_barrier(&mut state, &run.ran, partials)?;
                tracing::debug!(
                    step,
                    updated = ?outcome.updated_channels,
                    errors = outcome.errors.len(),
                    "barrier applied"
                );

                // Conditional edges see only fully-merged state.
                let merged_snapshot = state.snapshot();
                if let Some(targets) = self.engine.route_after(&run.ran, &merged_snapshot)? {
                    let next: Vec<NodeId> = targets
                        .into_iter()
                        .filter_map(|target| match target {
                            crate::graphs::RouteTarget::Node(node) => Some(node),
                            crate::graphs::RouteTarget::End => None,
                        })
                        .collect();
                    self.save_checkpoint(thread_id, step, &state, next.clone())
                        .await?;
                    frontier = next;
                    continue 'replan;
                }

                let next = stages.get(index + 1).cloned().unwrap_or_default();
                self.save_checkpoint(thread_id, step, &state, next).await?;
            }

            return self.complete(thread_id, state, step).await;
        }
    }

    /// Pause the thread at `gate`: fire the notifier, persist the paused
    /// checkpoint (`next_nodes = []`), and hand control back to the caller.
    async fn pause_at_gate(
        &self,
        thread_id: &str,
        mut state: WorkflowState,
        gate: GateSpec,
        step: u64,
    ) -> Result<RunResult, RunnerError> {
        let snapshot = state.snapshot();
        gate.notify_detached(ApprovalRequest {
            thread_id: thread_id.to_string(),
            gate: gate.id.clone(),
            step,
            draft: snapshot.draft.clone(),
            revision_count: snapshot.control.revision_count,
            extra: snapshot.extra.clone(),
        });

        let mut partial = NodePartial::new().with_control(
            ControlUpdate::status(RunStatus::AwaitingApproval)
                .with_pending_gate(Some(gate.id.clone())),
        );
        if let Some(draft) = snapshot.draft
            && matches!(draft.status, DraftStatus::Draft | DraftStatus::Revised)
        {
            partial.draft = Some(draft.with_status(DraftStatus::PendingReview));
        }
        self.engine.apply_barrier(&mut state, &[], vec![partial])?;

        self.save_checkpoint(thread_id, step, &state, vec![]).await?;
        tracing::info!(thread = %thread_id, gate = %gate.id, step, "paused at gate");
        let _ = self.event_bus.get_sender().send(Event::diagnostic(
            "gate",
            format!("thread={thread_id} paused gate={} step={step}", gate.id),
        ));

        Ok(RunResult {
            thread_id: thread_id.to_string(),
            status: RunStatus::AwaitingApproval,
            next_nodes: vec![],
            step,
            state,
        })
    }

    async fn complete(
        &self,
        thread_id: &str,
        mut state: WorkflowState,
        step: u64,
    ) -> Result<RunResult, RunnerError> {
        if !state.control.get().status.is_final() {
            let partial = NodePartial::new()
                .with_control(ControlUpdate::status(RunStatus::Completed).with_pending_gate(None));
            self.engine.apply_barrier(&mut state, &[], vec![partial])?;
        }
        self.save_checkpoint(thread_id, step, &state, vec![]).await?;

        let status = state.control.get().status;
        tracing::info!(thread = %thread_id, step, %status, "workflow thread finished");
        self.emit_stream_end(thread_id, status, step);

        Ok(RunResult {
            thread_id: thread_id.to_string(),
            status,
            next_nodes: vec![],
            step,
            state,
        })
    }

    async fn save_checkpoint(
        &self,
        thread_id: &str,
        step: u64,
        state: &WorkflowState,
        next_nodes: Vec<NodeId>,
    ) -> Result<(), RunnerError> {
        self.checkpointer
            .save(Checkpoint::new(thread_id, step, state, next_nodes))
            .await?;
        Ok(())
    }

    fn emit_stream_end(&self, thread_id: &str, status: RunStatus, step: u64) {
        let _ = self.event_bus.get_sender().send(Event::diagnostic(
            STREAM_END_SCOPE,
            format!("thread={thread_id} status={status} step={step}"),
        ));
    }

    fn invalid_resume(&self, thread_id: &str, reason: &str) -> RunnerError {
        RunnerError::InvalidResumeState {
            thread_id: thread_id.to_string(),
            reason: reason.to_string(),
        }
    }

    fn thread_lock(&self, thread_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .lock()
            .expect("thread lock map poisoned")
            .entry(thread_id.to_string())
            .or_default()
            .clone()
    }
}
