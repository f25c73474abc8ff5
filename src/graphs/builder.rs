//! Fluent construction of workflow graphs.
//!
//! A graph is assembled from node configs + handlers, gate specs, and
//! conditional edges, then compiled into an [`Engine`](crate::engine::Engine).
//! Topology comes from the `depends_on` declarations on each config; the
//! planner turns those into stages at compile time.
//!
//! ```rust
//! use greenroom::graphs::GraphBuilder;
//! use greenroom::config::NodeConfig;
//! use greenroom::gates::GateSpec;
//! use greenroom::node::{NodeHandler, NodeContext, NodePartial, NodeError};
//! use greenroom::state::StateSnapshot;
//! use async_trait::async_trait;
//!
//! struct Compile;
//!
//! #[async_trait]
//! impl NodeHandler for Compile {
//!     async fn run(&self, _: StateSnapshot, _: NodeContext) -> Result<NodePartial, NodeError> {
//!         Ok(NodePartial::default())
//!     }
//! }
//!
//! // Rejections re-enter compile_script, which regenerates the draft.
//! let engine = GraphBuilder::new()
//!     .add_node(NodeConfig::new("compile_script"), Compile)
//!     .add_gate(
//!         GateSpec::new("script_review", "compile_script")
//!             .with_depends_on(["compile_script"]),
//!     )
//!     .compile()
//!     .unwrap();
//! assert_eq!(engine.plan().stages().len(), 2);
//! ```

use crate::config::{ConfigManager, NodeConfig};
use crate::gates::GateSpec;
use crate::graphs::edges::ConditionalEdge;
use crate::node::NodeHandler;
use crate::registry::NodeRegistry;
use crate::runtimes::RuntimeConfig;

/// Builder for compiled workflow engines.
pub struct GraphBuilder {
    /// Handler registry under construction.
    pub registry: NodeRegistry,
    /// Node configurations (topology lives in their `depends_on`).
    pub config: ConfigManager,
    /// Conditional edges with closed target maps.
    pub conditional_edges: Vec<ConditionalEdge>,
    /// Approval gates.
    pub gates: Vec<GateSpec>,
    /// Runtime configuration for the compiled engine.
    pub runtime_config: RuntimeConfig,
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: NodeRegistry::new(),
            config: ConfigManager::new(),
            conditional_edges: Vec::new(),
            gates: Vec::new(),
            runtime_config: RuntimeConfig::default(),
        }
    }

    /// Add a node: its configuration (including `depends_on`) and handler.
    #[must_use]
    pub fn add_node(mut self, config: NodeConfig, handler: impl NodeHandler + 'static) -> Self {
        self.registry.register(config.id.clone(), handler);
        self.config.upsert(config);
        self
    }

    /// Add a configuration without a handler. Execution of the node will
    /// fail at lookup time unless a handler is registered before then; this
    /// is intended for predeclared or externally-registered nodes.
    #[must_use]
    pub fn add_config(mut self, config: NodeConfig) -> Self {
        self.config.upsert(config);
        self
    }

    /// Add an approval gate. The gate participates in planning like a node
    /// (its `depends_on` comes from the spec) but is never executed: reaching
    /// it pauses the run.
    #[must_use]
    pub fn add_gate(mut self, spec: GateSpec) -> Self {
        if let Some(name) = spec.id.name() {
            let config = NodeConfig::new(name).with_depends_on(spec.depends_on.clone());
            self.config.upsert(config);
        }
        self.gates.push(spec);
        self
    }

    /// Add a conditional edge evaluated after the stage containing its
    /// source node has merged.
    #[must_use]
    pub fn add_conditional_edge(mut self, edge: ConditionalEdge) -> Self {
        self.conditional_edges.push(edge);
        self
    }

    #[must_use]
    pub fn with_runtime_config(mut self, runtime_config: RuntimeConfig) -> Self {
        self.runtime_config = runtime_config;
        self
    }
}
