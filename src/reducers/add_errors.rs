use super::Reducer;
use crate::node::NodePartial;
use crate::state::WorkflowState;

/// Appends error events to the error log. Events arrive pre-sorted by the
/// barrier so the log order is stable across reruns.
#[derive(Debug, PartialEq, Clone, Hash, Eq)]
pub struct AddErrors;

impl Reducer for AddErrors {
    fn apply(&self, state: &mut WorkflowState, update: &NodePartial) {
        if let Some(errors) = &update.errors
            && !errors.is_empty()
        {
            state.errors.get_mut().extend(errors.iter().cloned());
        }
    }
}
