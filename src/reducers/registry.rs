use rustc_hash::FxHashMap;
use std::sync::Arc;

use crate::{
    node::NodePartial,
    reducers::{
        AddErrors, AppendDecisions, AppendUniqueArticles, AppendUniqueFacts, MapMerge,
        MergeControl, Reducer, ReducerError, SetDraft,
    },
    state::WorkflowState,
    types::ChannelId,
};
use tracing::instrument;

/// Per-channel reducer dispatch.
///
/// The default registry wires every channel to its declared merge policy.
/// Additional reducers can be registered per channel and run in registration
/// order after the defaults.
#[derive(Clone)]
pub struct ReducerRegistry {
    reducer_map: FxHashMap<ChannelId, Vec<Arc<dyn Reducer>>>,
}

/// Skip reducer invocation when the partial has nothing for the channel.
fn channel_guard(channel: &ChannelId, partial: &NodePartial) -> bool {
    match channel {
        ChannelId::Articles => partial.articles.as_ref().is_some_and(|v| !v.is_empty()),
        ChannelId::Facts => partial.facts.as_ref().is_some_and(|v| !v.is_empty()),
        ChannelId::Decisions => partial.decisions.as_ref().is_some_and(|v| !v.is_empty()),
        ChannelId::Extra => partial.extra.as_ref().is_some_and(|m| !m.is_empty()),
        ChannelId::Draft => partial.draft.is_some(),
        ChannelId::Control => partial.control.as_ref().is_some_and(|c| !c.is_empty()),
        ChannelId::Errors => partial.errors.as_ref().is_some_and(|v| !v.is_empty()),
    }
}

impl Default for ReducerRegistry {
    fn default() -> Self {
        let mut registry = Self::new();
        registry
            .register(ChannelId::Articles, Arc::new(AppendUniqueArticles))
            .register(ChannelId::Facts, Arc::new(AppendUniqueFacts))
            .register(ChannelId::Decisions, Arc::new(AppendDecisions))
            .register(ChannelId::Extra, Arc::new(MapMerge))
            .register(ChannelId::Draft, Arc::new(SetDraft))
            .register(ChannelId::Control, Arc::new(MergeControl))
            .register(ChannelId::Errors, Arc::new(AddErrors));
        registry
    }
}

impl ReducerRegistry {
    pub fn new() -> Self {
        Self {
            reducer_map: FxHashMap::default(),
        }
    }

    /// Register a reducer for a channel. Multiple reducers per channel are
    /// applied in registration order.
    pub fn register(&mut self, channel: ChannelId, reducer: Arc<dyn Reducer>) -> &mut Self {
        self.reducer_map.entry(channel).or_default().push(reducer);
        self
    }

    /// Builder-style [`register`](Self::register).
    #[must_use]
    pub fn with_reducer(mut self, channel: ChannelId, reducer: Arc<dyn Reducer>) -> Self {
        self.register(channel, reducer);
        self
    }

    #[instrument(skip(self, state, to_update), err)]
    pub fn try_update(
        &self,
        channel: ChannelId,
        state: &mut WorkflowState,
        to_update: &NodePartial,
    ) -> Result<(), ReducerError> {
        if !channel_guard(&channel, to_update) {
            return Ok(());
        }

        if let Some(reducers) = self.reducer_map.get(&channel) {
            for reducer in reducers {
                reducer.apply(state, to_update);
            }
            Ok(())
        } else {
            Err(ReducerError::UnknownChannel(channel))
        }
    }

    #[instrument(skip(self, state, merged_updates), err)]
    pub fn apply_all(
        &self,
        state: &mut WorkflowState,
        merged_updates: &NodePartial,
    ) -> Result<(), ReducerError> {
        for channel in self.reducer_map.keys() {
            self.try_update(channel.clone(), state, merged_updates)?;
        }
        Ok(())
    }
}
