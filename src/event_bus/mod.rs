//! In-process event bus for workflow observability.
//!
//! Node executions, handler messages, and runner diagnostics flow through a
//! non-blocking channel into pluggable sinks. Emission never blocks or fails
//! a run; a dead bus degrades to dropped events.

mod bus;
mod event;
mod sink;

pub use bus::EventBus;
pub use event::{DiagnosticEvent, Event, ExecutionEvent, NodeEvent, STREAM_END_SCOPE};
pub use sink::{ChannelSink, EventSink, MemorySink, StdOutSink};
