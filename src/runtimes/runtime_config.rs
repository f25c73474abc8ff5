use crate::event_bus::{EventBus, MemorySink, StdOutSink};
use crate::runtimes::CheckpointerType;

/// Runtime settings for a [`WorkflowRunner`](crate::runtimes::WorkflowRunner):
/// which checkpoint backend to construct, where the SQLite file lives, and
/// how the event bus is wired.
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    pub checkpointer: Option<CheckpointerType>,
    pub sqlite_db_name: Option<String>,
    pub event_bus: EventBusConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            checkpointer: Some(CheckpointerType::InMemory),
            sqlite_db_name: Self::resolve_sqlite_db_name(None),
            event_bus: EventBusConfig::default(),
        }
    }
}

impl RuntimeConfig {
    fn resolve_sqlite_db_name(provided: Option<String>) -> Option<String> {
        if let Some(name) = provided {
            return Some(name);
        }
        dotenvy::dotenv().ok();
        Some(std::env::var("GREENROOM_SQLITE_DB").unwrap_or_else(|_| "greenroom.db".to_string()))
    }

    pub fn new(checkpointer: Option<CheckpointerType>, sqlite_db_name: Option<String>) -> Self {
        Self {
            checkpointer,
            sqlite_db_name: Self::resolve_sqlite_db_name(sqlite_db_name),
            event_bus: EventBusConfig::default(),
        }
    }

    #[must_use]
    pub fn with_event_bus(mut self, event_bus: EventBusConfig) -> Self {
        self.event_bus = event_bus;
        self
    }

    #[must_use]
    pub fn with_memory_event_bus(self) -> Self {
        self.with_event_bus(EventBusConfig::with_memory_sink())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SinkConfig {
    StdOut,
    Memory,
}

#[derive(Clone, Debug)]
pub struct EventBusConfig {
    pub sinks: Vec<SinkConfig>,
}

impl EventBusConfig {
    #[must_use]
    pub fn new(sinks: Vec<SinkConfig>) -> Self {
        Self { sinks }
    }

    #[must_use]
    pub fn with_stdout_only() -> Self {
        Self::new(vec![SinkConfig::StdOut])
    }

    #[must_use]
    pub fn with_memory_sink() -> Self {
        Self::new(vec![SinkConfig::StdOut, SinkConfig::Memory])
    }

    #[must_use]
    pub fn add_sink(mut self, sink: SinkConfig) -> Self {
        if !self.sinks.contains(&sink) {
            self.sinks.push(sink);
        }
        self
    }

    /// Build the configured bus (listener not yet started).
    pub fn build_event_bus(&self) -> EventBus {
        let mut sinks: Vec<Box<dyn crate::event_bus::EventSink>> = Vec::new();
        for sink in &self.sinks {
            match sink {
                SinkConfig::StdOut => sinks.push(Box::new(StdOutSink::default())),
                SinkConfig::Memory => sinks.push(Box::new(MemorySink::new())),
            }
        }
        if sinks.is_empty() {
            EventBus::default()
        } else {
            EventBus::with_sinks(sinks)
        }
    }
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self::with_stdout_only()
    }
}
