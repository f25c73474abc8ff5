//! Versioned state channels.
//!
//! Each field of [`crate::state::WorkflowState`] lives in its own channel
//! carrying a version counter. Reducers mutate channel contents at stage
//! barriers; versions are bumped only by the barrier, and only when content
//! actually changed, so runners and checkpoints can detect change cheaply.

pub mod errors;

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::content::{Article, DecisionRecord, Draft, Fact};
use crate::types::RunControl;
use errors::ErrorEvent;

/// Common surface of every versioned channel.
pub trait Channel {
    type Payload;

    /// Current version counter.
    fn version(&self) -> u32;

    /// Set the version counter (barrier responsibility).
    fn set_version(&mut self, version: u32);

    /// Clone out the current contents.
    fn snapshot(&self) -> Self::Payload;
}

/// Channel holding an ordered collection.
#[derive(Clone, Debug, PartialEq)]
pub struct VecChannel<T> {
    items: Vec<T>,
    version: u32,
}

impl<T: Clone> VecChannel<T> {
    pub fn new(items: Vec<T>, version: u32) -> Self {
        Self { items, version }
    }

    pub fn get(&self) -> &Vec<T> {
        &self.items
    }

    pub fn get_mut(&mut self) -> &mut Vec<T> {
        &mut self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T> Default for VecChannel<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            version: 1,
        }
    }
}

impl<T: Clone> Channel for VecChannel<T> {
    type Payload = Vec<T>;

    fn version(&self) -> u32 {
        self.version
    }

    fn set_version(&mut self, version: u32) {
        self.version = version;
    }

    fn snapshot(&self) -> Vec<T> {
        self.items.clone()
    }
}

/// Channel holding a string-keyed JSON map.
#[derive(Clone, Debug, PartialEq)]
pub struct MapChannel {
    map: FxHashMap<String, Value>,
    version: u32,
}

impl Default for MapChannel {
    fn default() -> Self {
        Self {
            map: FxHashMap::default(),
            version: 1,
        }
    }
}

impl MapChannel {
    pub fn new(map: FxHashMap<String, Value>, version: u32) -> Self {
        Self { map, version }
    }

    pub fn get(&self) -> &FxHashMap<String, Value> {
        &self.map
    }

    pub fn get_mut(&mut self) -> &mut FxHashMap<String, Value> {
        &mut self.map
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl Channel for MapChannel {
    type Payload = FxHashMap<String, Value>;

    fn version(&self) -> u32 {
        self.version
    }

    fn set_version(&mut self, version: u32) {
        self.version = version;
    }

    fn snapshot(&self) -> FxHashMap<String, Value> {
        self.map.clone()
    }
}

/// Channel holding a single value with overwrite semantics.
#[derive(Clone, Debug, PartialEq)]
pub struct ScalarChannel<T> {
    value: T,
    version: u32,
}

impl<T: Default> Default for ScalarChannel<T> {
    fn default() -> Self {
        Self {
            value: T::default(),
            version: 1,
        }
    }
}

impl<T: Clone> ScalarChannel<T> {
    pub fn new(value: T, version: u32) -> Self {
        Self { value, version }
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

impl<T: Clone> Channel for ScalarChannel<T> {
    type Payload = T;

    fn version(&self) -> u32 {
        self.version
    }

    fn set_version(&mut self, version: u32) {
        self.version = version;
    }

    fn snapshot(&self) -> T {
        self.value.clone()
    }
}

pub type ArticlesChannel = VecChannel<Article>;
pub type FactsChannel = VecChannel<Fact>;
pub type DecisionsChannel = VecChannel<DecisionRecord>;
pub type ErrorsChannel = VecChannel<ErrorEvent>;
pub type ExtrasChannel = MapChannel;
pub type DraftChannel = ScalarChannel<Option<Draft>>;
pub type ControlChannel = ScalarChannel<RunControl>;
