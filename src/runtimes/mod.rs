//! Workflow runtime: thread management and state persistence.
//!
//! The runtime layer wraps a compiled [`Engine`](crate::engine::Engine) with
//! everything a long-lived process needs: the [`WorkflowRunner`] Run API
//! (`start` / `resume` / `get_state` / `get_decision_log`), pluggable
//! [`Checkpointer`] backends, and serde persistence models decoupled from
//! the in-memory state.
//!
//! # Persistence backends
//!
//! - [`InMemoryCheckpointer`] - volatile, for tests and development
//! - [`SqliteCheckpointer`] - durable single-file persistence (default
//!   `sqlite` feature)
//!
//! ```rust,no_run
//! use greenroom::runtimes::WorkflowRunner;
//! use greenroom::state::WorkflowState;
//! # use greenroom::engine::Engine;
//! # async fn example(engine: Engine) -> Result<(), Box<dyn std::error::Error>> {
//! let runner = WorkflowRunner::new(engine).await?;
//! let result = runner
//!     .start(Some("2026-W32".into()), WorkflowState::new())
//!     .await?;
//! println!("thread {} is {}", result.thread_id, result.status);
//! # Ok(())
//! # }
//! ```

pub mod checkpointer;
#[cfg(feature = "sqlite")]
pub mod checkpointer_sqlite;
pub mod persistence;
pub mod runner;
pub mod runtime_config;

pub use checkpointer::{
    Checkpoint, Checkpointer, CheckpointerError, CheckpointerType, InMemoryCheckpointer,
};
#[cfg(feature = "sqlite")]
pub use checkpointer_sqlite::SqliteCheckpointer;
pub use persistence::{PersistedCheckpoint, PersistedState};
pub use runner::{RunResult, RunnerError, WorkflowRunner};
pub use runtime_config::{EventBusConfig, RuntimeConfig, SinkConfig};
