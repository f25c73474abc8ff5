//! # Greenroom: a staged content-production workflow engine
//!
//! Greenroom orchestrates multi-stage content pipelines: it executes
//! registered async nodes in dependency order, runs independent nodes
//! concurrently, pauses at designated approval gates for asynchronous human
//! decisions, resumes exactly where it paused (including after a process
//! restart), bounds revision loops, and merges partial results from
//! concurrent branches deterministically.
//!
//! ## Core concepts
//!
//! - **Nodes**: opaque async units of work (`StateSnapshot` in,
//!   `NodePartial` out) registered under string ids
//! - **State**: one versioned record per thread; every field has a declared
//!   merge policy (append-unique, dict-union, or overwrite)
//! - **Planner**: layered topological sort over `depends_on` declarations
//! - **Gates**: nodes that always pause pending an external
//!   [`DecisionRecord`](content::DecisionRecord)
//! - **Checkpoints**: thread-scoped state persistence after every stage
//!
//! ## Quick start
//!
//! ```rust
//! use greenroom::config::NodeConfig;
//! use greenroom::content::Article;
//! use greenroom::graphs::GraphBuilder;
//! use greenroom::node::{NodeContext, NodeError, NodeHandler, NodePartial};
//! use greenroom::runtimes::WorkflowRunner;
//! use greenroom::state::{StateSnapshot, WorkflowState};
//! use async_trait::async_trait;
//!
//! struct CollectNode;
//!
//! #[async_trait]
//! impl NodeHandler for CollectNode {
//!     async fn run(
//!         &self,
//!         _snapshot: StateSnapshot,
//!         _ctx: NodeContext,
//!     ) -> Result<NodePartial, NodeError> {
//!         Ok(NodePartial::new().with_articles(vec![Article::new(
//!             "https://example.com/story",
//!             "Example Wire",
//!             "A headline",
//!         )]))
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = GraphBuilder::new()
//!     .add_node(NodeConfig::new("collect"), CollectNode)
//!     .compile()?;
//!
//! let runner = WorkflowRunner::with_checkpointer(
//!     engine,
//!     std::sync::Arc::new(greenroom::runtimes::InMemoryCheckpointer::new()),
//! );
//! let result = runner.start(None, WorkflowState::new()).await?;
//! assert_eq!(result.state.articles.len(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Module guide
//!
//! - [`types`] - node ids, channel ids, run status
//! - [`content`] - articles, facts, drafts, decision records
//! - [`state`] / [`channels`] - versioned state and snapshots
//! - [`node`] - the handler contract and partial updates
//! - [`config`] - per-node configuration and the config manager
//! - [`reducers`] - the state merge algebra
//! - [`planner`] - dependency-based stage planning
//! - [`graphs`] - graph building and compilation
//! - [`gates`] - approval gates and the revision controller
//! - [`engine`] - the compiled engine and barrier merges
//! - [`runtimes`] - the Run API, checkpoint stores, persistence models
//! - [`event_bus`] - structured execution events and sinks

pub mod channels;
pub mod config;
pub mod content;
pub mod engine;
pub mod event_bus;
pub mod gates;
pub mod graphs;
pub mod node;
pub mod planner;
pub mod reducers;
pub mod registry;
pub mod runtimes;
pub mod state;
pub mod types;
pub mod utils;
