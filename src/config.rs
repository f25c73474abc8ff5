//! Per-node configuration and the config manager.
//!
//! Every node carries a [`NodeConfig`]: enablement, timeout, dependency
//! declaration, optional model parameters, optional external-tool access, and
//! arbitrary key/value params. Configs are owned by a [`ConfigManager`]
//! constructed by the caller and injected into the engine; there is no global
//! registry. A node's *effective* config is its stored config with
//! request-scoped overrides merged shallowly on top.

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::planner::{PlanError, Planner};

/// Process-wide fallback when a node config does not set a timeout.
pub const DEFAULT_NODE_TIMEOUT_SECS: u64 = 300;

/// Model parameters for LLM-backed nodes. Opaque to the engine; resolved and
/// handed to the node handler via its context.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelParams {
    pub model: String,
    pub temperature: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_model: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_max_retries() -> u32 {
    3
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            model: "default".to_string(),
            temperature: 0.7,
            max_tokens: None,
            fallback_model: None,
            max_retries: default_max_retries(),
        }
    }
}

/// External-tool capability set for nodes that call out through a tool
/// broker. The engine only transports this block; handlers interpret it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolAccess {
    pub enabled: bool,
    #[serde(default)]
    pub servers: Vec<String>,
    #[serde(default)]
    pub prefer_tools: bool,
    #[serde(default = "default_true")]
    pub fallback_to_builtin: bool,
}

fn default_true() -> bool {
    true
}

/// Configuration for a single node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_items: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_items: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelParams>,
    #[serde(default)]
    pub params: FxHashMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolAccess>,
}

fn default_timeout() -> u64 {
    DEFAULT_NODE_TIMEOUT_SECS
}

impl NodeConfig {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            enabled: true,
            timeout_seconds: DEFAULT_NODE_TIMEOUT_SECS,
            depends_on: Vec::new(),
            max_items: None,
            min_items: None,
            model: None,
            params: FxHashMap::default(),
            tools: None,
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn with_depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = deps.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_timeout_seconds(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    #[must_use]
    pub fn with_model(mut self, model: ModelParams) -> Self {
        self.model = Some(model);
        self
    }

    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn with_tools(mut self, tools: ToolAccess) -> Self {
        self.tools = Some(tools);
        self
    }

    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Whether this node is configured to use external tools.
    #[must_use]
    pub fn uses_tools(&self) -> bool {
        self.tools.as_ref().is_some_and(|t| t.enabled)
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("no configuration for node: {id}")]
    #[diagnostic(
        code(greenroom::config::unknown_node),
        help("Register the node's NodeConfig with the ConfigManager before running.")
    )]
    UnknownNode { id: String },

    #[error("config merge failed for node {id}: {source}")]
    #[diagnostic(code(greenroom::config::merge))]
    Merge {
        id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    #[diagnostic(code(greenroom::config::serde))]
    Serde(#[from] serde_json::Error),
}

/// Owns node configurations and resolves effective configs.
///
/// Constructed once and injected; supports hot updates (enable/disable,
/// shallow patch) while node handlers themselves stay immutable in the
/// registry.
#[derive(Clone, Debug, Default)]
pub struct ConfigManager {
    nodes: FxHashMap<String, NodeConfig>,
}

impl ConfigManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a node's configuration.
    pub fn upsert(&mut self, config: NodeConfig) -> &mut Self {
        self.nodes.insert(config.id.clone(), config);
        self
    }

    /// Builder-style [`upsert`](Self::upsert).
    #[must_use]
    pub fn with_node(mut self, config: NodeConfig) -> Self {
        self.upsert(config);
        self
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&NodeConfig> {
        self.nodes.get(id)
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// All configured nodes, sorted by id for stable iteration.
    #[must_use]
    pub fn list(&self) -> Vec<&NodeConfig> {
        let mut all: Vec<_> = self.nodes.values().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// Enabled nodes only, sorted by id.
    #[must_use]
    pub fn list_enabled(&self) -> Vec<&NodeConfig> {
        self.list().into_iter().filter(|c| c.enabled).collect()
    }

    pub fn enable(&mut self, id: &str) -> Result<(), ConfigError> {
        self.set_enabled(id, true)
    }

    pub fn disable(&mut self, id: &str) -> Result<(), ConfigError> {
        self.set_enabled(id, false)
    }

    fn set_enabled(&mut self, id: &str, enabled: bool) -> Result<(), ConfigError> {
        let config = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| ConfigError::UnknownNode { id: id.to_string() })?;
        config.enabled = enabled;
        Ok(())
    }

    /// Shallow-patch a stored config: top-level keys in `patch` replace the
    /// corresponding fields, everything else is untouched.
    pub fn update(&mut self, id: &str, patch: &Map<String, Value>) -> Result<NodeConfig, ConfigError> {
        let current = self
            .nodes
            .get(id)
            .ok_or_else(|| ConfigError::UnknownNode { id: id.to_string() })?;
        let merged = shallow_merge(current, patch).map_err(|source| ConfigError::Merge {
            id: id.to_string(),
            source,
        })?;
        self.nodes.insert(id.to_string(), merged.clone());
        Ok(merged)
    }

    /// Effective config for one execution: stored config plus request-scoped
    /// overrides merged shallowly. The stored config is not modified.
    pub fn resolve(
        &self,
        id: &str,
        overrides: Option<&Map<String, Value>>,
    ) -> Result<NodeConfig, ConfigError> {
        let base = self
            .nodes
            .get(id)
            .ok_or_else(|| ConfigError::UnknownNode { id: id.to_string() })?;
        match overrides {
            None => Ok(base.clone()),
            Some(patch) if patch.is_empty() => Ok(base.clone()),
            Some(patch) => shallow_merge(base, patch).map_err(|source| ConfigError::Merge {
                id: id.to_string(),
                source,
            }),
        }
    }

    /// The `depends_on` declarations of all nodes (enabled and disabled);
    /// the planner applies enablement itself.
    #[must_use]
    pub fn dependency_map(&self) -> FxHashMap<String, Vec<String>> {
        self.nodes
            .iter()
            .map(|(id, c)| (id.clone(), c.depends_on.clone()))
            .collect()
    }

    /// Read-only flattened execution order derived from the dependency
    /// declarations, for operators and admin surfaces.
    pub fn execution_order(&self) -> Result<Vec<Vec<String>>, PlanError> {
        let plan = Planner::plan(self, &[])?;
        Ok(plan.stage_names())
    }

    /// Export the full configuration as JSON.
    pub fn export(&self) -> Result<Value, ConfigError> {
        let ordered: std::collections::BTreeMap<&String, &NodeConfig> = self.nodes.iter().collect();
        Ok(serde_json::to_value(ordered)?)
    }

    /// Import configurations from a previously exported JSON object,
    /// replacing entries with matching ids.
    pub fn import(&mut self, value: Value) -> Result<(), ConfigError> {
        let imported: FxHashMap<String, NodeConfig> = serde_json::from_value(value)?;
        for (id, config) in imported {
            self.nodes.insert(id, config);
        }
        Ok(())
    }
}

fn shallow_merge(base: &NodeConfig, patch: &Map<String, Value>) -> Result<NodeConfig, serde_json::Error> {
    let mut value = serde_json::to_value(base)?;
    if let Value::Object(object) = &mut value {
        for (key, entry) in patch {
            object.insert(key.clone(), entry.clone());
        }
    }
    serde_json::from_value(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manager() -> ConfigManager {
        ConfigManager::new()
            .with_node(NodeConfig::new("aggregate").with_timeout_seconds(120))
            .with_node(NodeConfig::new("categorize").with_depends_on(["aggregate"]))
    }

    #[test]
    fn resolve_without_overrides_clones_base() {
        let m = manager();
        let config = m.resolve("aggregate", None).unwrap();
        assert_eq!(config.timeout_seconds, 120);
        assert!(config.enabled);
    }

    #[test]
    fn resolve_applies_shallow_overrides() {
        let m = manager();
        let mut patch = Map::new();
        patch.insert("timeout_seconds".into(), json!(15));
        patch.insert("max_items".into(), json!(5));
        let config = m.resolve("aggregate", Some(&patch)).unwrap();
        assert_eq!(config.timeout_seconds, 15);
        assert_eq!(config.max_items, Some(5));
        // Stored config untouched.
        assert_eq!(m.get("aggregate").unwrap().timeout_seconds, 120);
    }

    #[test]
    fn update_patches_stored_config() {
        let mut m = manager();
        let mut patch = Map::new();
        patch.insert("enabled".into(), json!(false));
        let updated = m.update("categorize", &patch).unwrap();
        assert!(!updated.enabled);
        assert!(!m.get("categorize").unwrap().enabled);
    }

    #[test]
    fn resolve_unknown_node_errors() {
        let m = manager();
        assert!(matches!(
            m.resolve("missing", None),
            Err(ConfigError::UnknownNode { .. })
        ));
    }

    #[test]
    fn export_import_roundtrip() {
        let m = manager();
        let exported = m.export().unwrap();
        let mut fresh = ConfigManager::new();
        fresh.import(exported).unwrap();
        assert!(fresh.contains("aggregate"));
        assert_eq!(
            fresh.get("categorize").unwrap().depends_on,
            vec!["aggregate".to_string()]
        );
    }
}
