//! Overwrite reducers for scalar channels.

use super::Reducer;
use crate::node::NodePartial;
use crate::state::WorkflowState;

/// Replaces the current draft when the update carries one. The draft is a
/// scalar output; last writer in barrier order wins, and the barrier feeds
/// partials in stable node-id order.
#[derive(Debug, PartialEq, Clone, Hash, Eq)]
pub struct SetDraft;

impl Reducer for SetDraft {
    fn apply(&self, state: &mut WorkflowState, update: &NodePartial) {
        if let Some(draft) = &update.draft {
            *state.draft.get_mut() = Some(draft.clone());
        }
    }
}

/// Applies a field-wise overwrite to the control channel; absent fields are
/// left untouched.
#[derive(Debug, PartialEq, Clone, Hash, Eq)]
pub struct MergeControl;

impl Reducer for MergeControl {
    fn apply(&self, state: &mut WorkflowState, update: &NodePartial) {
        if let Some(control_update) = &update.control {
            let control = state.control.get_mut();
            if let Some(status) = control_update.status {
                control.status = status;
            }
            if let Some(gate) = &control_update.pending_gate {
                control.pending_gate = gate.clone();
            }
            if let Some(count) = control_update.revision_count {
                control.revision_count = count;
            }
            if let Some(last_error) = &control_update.last_error {
                control.last_error = last_error.clone();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::Draft;
    use crate::node::{ControlUpdate, NodePartial};
    use crate::types::{NodeId, RunStatus};

    #[test]
    fn set_draft_replaces() {
        let reducer = SetDraft;
        let mut state = WorkflowState::new();
        reducer.apply(
            &mut state,
            &NodePartial::new().with_draft(Draft::new("v1")),
        );
        reducer.apply(
            &mut state,
            &NodePartial::new().with_draft(Draft::new("v2")),
        );
        assert_eq!(state.draft.get().as_ref().unwrap().content, "v2");
    }

    #[test]
    fn merge_control_touches_only_present_fields() {
        let reducer = MergeControl;
        let mut state = WorkflowState::new();
        state.control.get_mut().revision_count = 2;

        let update = NodePartial::new().with_control(
            ControlUpdate::status(RunStatus::AwaitingApproval)
                .with_pending_gate(Some(NodeId::named("review"))),
        );
        reducer.apply(&mut state, &update);

        let control = state.control.get();
        assert_eq!(control.status, RunStatus::AwaitingApproval);
        assert_eq!(control.pending_gate, Some(NodeId::named("review")));
        assert_eq!(control.revision_count, 2);
    }
}
