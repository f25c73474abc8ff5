/*!
Persistence primitives for serializing workflow state and checkpoints,
shared by the SQLite checkpointer and any future durable backend.

Design goals:
- Explicit serde-friendly structs decoupled from the in-memory
  representations, so internal refactors don't silently change the wire
  shape.
- Conversion logic localized in `From`/`TryFrom` impls so checkpointer code
  stays lean.
- Forward compatibility: node ids round-trip through their encoded string
  form.

This module performs no I/O.
*/

use chrono::Utc;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::channels::errors::ErrorEvent;
use crate::channels::{Channel, MapChannel, ScalarChannel, VecChannel};
use crate::content::{Article, DecisionRecord, Draft, Fact};
use crate::runtimes::checkpointer::{Checkpoint, CheckpointerError};
use crate::state::WorkflowState;
use crate::types::{NodeId, RunControl};

/// Persisted form of a collection channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(bound(
    serialize = "T: Serialize",
    deserialize = "T: Deserialize<'de>"
))]
pub struct PersistedVecChannel<T> {
    pub version: u32,
    #[serde(default)]
    pub items: Vec<T>,
}

impl<T> Default for PersistedVecChannel<T> {
    fn default() -> Self {
        Self {
            version: 1,
            items: Vec::new(),
        }
    }
}

/// Persisted form of the extra map channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PersistedMapChannel {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub map: FxHashMap<String, Value>,
}

fn default_version() -> u32 {
    1
}

/// Persisted form of a scalar channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PersistedScalarChannel<T> {
    #[serde(default = "default_version")]
    pub version: u32,
    pub value: T,
}

/// Complete persisted shape of the in-memory [`WorkflowState`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PersistedState {
    pub articles: PersistedVecChannel<Article>,
    pub facts: PersistedVecChannel<Fact>,
    pub decisions: PersistedVecChannel<DecisionRecord>,
    pub extra: PersistedMapChannel,
    pub draft: PersistedScalarChannel<Option<Draft>>,
    pub control: PersistedScalarChannel<RunControl>,
    #[serde(default)]
    pub errors: PersistedVecChannel<ErrorEvent>,
}

/// Full persisted checkpoint record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedCheckpoint {
    pub thread_id: String,
    pub step: u64,
    pub state: PersistedState,
    /// Next frontier encoded via [`NodeId::encode`].
    pub next_nodes: Vec<String>,
    /// RFC3339 save time (keeps chrono out of the serialized shape).
    pub updated_at: String,
}

impl From<&WorkflowState> for PersistedState {
    fn from(s: &WorkflowState) -> Self {
        PersistedState {
            articles: PersistedVecChannel {
                version: s.articles.version(),
                items: s.articles.snapshot(),
            },
            facts: PersistedVecChannel {
                version: s.facts.version(),
                items: s.facts.snapshot(),
            },
            decisions: PersistedVecChannel {
                version: s.decisions.version(),
                items: s.decisions.snapshot(),
            },
            extra: PersistedMapChannel {
                version: s.extra.version(),
                map: s.extra.snapshot(),
            },
            draft: PersistedScalarChannel {
                version: s.draft.version(),
                value: s.draft.snapshot(),
            },
            control: PersistedScalarChannel {
                version: s.control.version(),
                value: s.control.snapshot(),
            },
            errors: PersistedVecChannel {
                version: s.errors.version(),
                items: s.errors.snapshot(),
            },
        }
    }
}

impl From<PersistedState> for WorkflowState {
    fn from(p: PersistedState) -> Self {
        WorkflowState {
            articles: VecChannel::new(p.articles.items, p.articles.version),
            facts: VecChannel::new(p.facts.items, p.facts.version),
            decisions: VecChannel::new(p.decisions.items, p.decisions.version),
            extra: MapChannel::new(p.extra.map, p.extra.version),
            draft: ScalarChannel::new(p.draft.value, p.draft.version),
            control: ScalarChannel::new(p.control.value, p.control.version),
            errors: VecChannel::new(p.errors.items, p.errors.version),
        }
    }
}

impl From<&Checkpoint> for PersistedCheckpoint {
    fn from(cp: &Checkpoint) -> Self {
        PersistedCheckpoint {
            thread_id: cp.thread_id.clone(),
            step: cp.step,
            state: PersistedState::from(&cp.state),
            next_nodes: cp.next_nodes.iter().map(NodeId::encode).collect(),
            updated_at: cp.updated_at.to_rfc3339(),
        }
    }
}

impl From<PersistedCheckpoint> for Checkpoint {
    fn from(p: PersistedCheckpoint) -> Self {
        let updated_at = chrono::DateTime::parse_from_rfc3339(&p.updated_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());
        Checkpoint {
            thread_id: p.thread_id,
            step: p.step,
            state: WorkflowState::from(p.state),
            next_nodes: p.next_nodes.iter().map(|s| NodeId::decode(s)).collect(),
            updated_at,
        }
    }
}

impl PersistedCheckpoint {
    pub fn to_json_string(&self) -> Result<String, CheckpointerError> {
        serde_json::to_string(self).map_err(|e| CheckpointerError::Serde {
            message: e.to_string(),
        })
    }

    pub fn from_json_str(s: &str) -> Result<Self, CheckpointerError> {
        serde_json::from_str(s).map_err(|e| CheckpointerError::Serde {
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RunStatus;

    #[test]
    fn state_roundtrip_preserves_versions_and_contents() {
        let mut state = WorkflowState::builder()
            .with_article(Article::new("https://e.com/1", "Wire", "T"))
            .build();
        state.articles.set_version(4);
        state.control.get_mut().status = RunStatus::AwaitingApproval;
        state.control.get_mut().pending_gate = Some(NodeId::named("review"));

        let persisted = PersistedState::from(&state);
        let restored = WorkflowState::from(persisted);
        assert_eq!(restored, state);
    }

    #[test]
    fn checkpoint_json_roundtrip() {
        let state = WorkflowState::new();
        let cp = Checkpoint::new("2026-W32", 3, &state, vec![NodeId::named("publish")]);
        let persisted = PersistedCheckpoint::from(&cp);
        let json = persisted.to_json_string().unwrap();
        let reloaded = PersistedCheckpoint::from_json_str(&json).unwrap();
        let restored = Checkpoint::from(reloaded);
        assert_eq!(restored.thread_id, "2026-W32");
        assert_eq!(restored.step, 3);
        assert_eq!(restored.next_nodes, vec![NodeId::named("publish")]);
    }
}
