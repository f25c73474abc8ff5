//! Workflow graph definition and compilation.
//!
//! [`GraphBuilder`] assembles nodes (config + handler), approval gates, and
//! conditional edges, then [`compile`](GraphBuilder::compile)s them into an
//! executable [`Engine`](crate::engine::Engine). Structural problems -
//! cycles, unknown dependencies, undeclared route targets - fail compilation
//! rather than surfacing mid-run.

mod builder;
mod compilation;
mod edges;

pub use builder::GraphBuilder;
pub use compilation::GraphCompileError;
pub use edges::{ConditionalEdge, END_LABEL, RoutePredicate, RouteTarget};
