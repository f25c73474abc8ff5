//! State merge algebra.
//!
//! Each state channel has exactly one merge policy, implemented as a
//! [`Reducer`] and dispatched by the [`ReducerRegistry`] at stage barriers:
//!
//! - append-unique-by-key: [`AppendUniqueArticles`] (source URL),
//!   [`AppendUniqueFacts`] and [`AppendDecisions`] (record id). Merging the
//!   same fragment twice equals merging it once, and merge order across
//!   concurrent branches does not change the resulting *set* of elements.
//! - dict-union: [`MapMerge`], right-hand keys win on conflict.
//! - overwrite: [`SetDraft`] and [`MergeControl`] for scalar outputs.
//! - append: [`AddErrors`] for the error log.
//!
//! Reducers never bump channel versions; the barrier does, and only when
//! content changed.

mod add_errors;
mod append_unique;
mod map_merge;
mod overwrite;
mod registry;

pub use add_errors::AddErrors;
pub use append_unique::{AppendDecisions, AppendUniqueArticles, AppendUniqueFacts};
pub use map_merge::MapMerge;
pub use overwrite::{MergeControl, SetDraft};
pub use registry::ReducerRegistry;

use crate::node::NodePartial;
use crate::state::WorkflowState;
use crate::types::ChannelId;
use std::fmt;

/// Unified reducer contract: mutate `state` using the delta in `update`.
pub trait Reducer: Send + Sync {
    fn apply(&self, state: &mut WorkflowState, update: &NodePartial);
}

#[derive(Debug)]
pub enum ReducerError {
    UnknownChannel(ChannelId),
}

impl fmt::Display for ReducerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReducerError::UnknownChannel(channel) => {
                write!(f, "no reducers registered for channel: {channel}")
            }
        }
    }
}

impl std::error::Error for ReducerError {}
