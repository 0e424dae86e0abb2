//! Pure condition evaluation against a contact's interaction state.
//!
//! Conditions are checked in list order and the first match wins. An empty
//! or unmatched list means `Continue` — a stalled contact is worse than an
//! imperfect message, so evaluation never errors.

use uuid::Uuid;

use outreach_core::types::InteractionState;
use outreach_sequence::{ConditionAction, ConditionType, StepCondition};

/// What execution should do after evaluating a step's conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionOutcome {
    Continue,
    Stop,
    JumpTo(Uuid),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// First condition whose type matches the interaction flags decides the
    /// outcome; no match defaults to `Continue`.
    pub fn evaluate(
        &self,
        conditions: &[StepCondition],
        interactions: &InteractionState,
    ) -> ConditionOutcome {
        for condition in conditions {
            if matches(condition.condition_type, interactions) {
                return match condition.action {
                    ConditionAction::Continue => ConditionOutcome::Continue,
                    ConditionAction::Stop => ConditionOutcome::Stop,
                    ConditionAction::JumpTo { target_step_id } => {
                        ConditionOutcome::JumpTo(target_step_id)
                    }
                };
            }
        }
        ConditionOutcome::Continue
    }
}

/// Whether a single condition type holds for the given interaction flags.
pub fn matches(condition_type: ConditionType, interactions: &InteractionState) -> bool {
    match condition_type {
        ConditionType::IfReplied => interactions.has_replied,
        ConditionType::IfNotReplied => !interactions.has_replied,
        ConditionType::IfOpened => interactions.has_opened,
        ConditionType::IfNotOpened => !interactions.has_opened,
        ConditionType::IfClicked => interactions.has_clicked,
        ConditionType::IfNotClicked => !interactions.has_clicked,
    }
}
