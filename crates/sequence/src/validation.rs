//! Structural validation, run before a sequence is stored or activated.
//!
//! The step payload is a tagged union, so type/config mismatches (a wait
//! step carrying message content, a message step without content) are
//! unrepresentable; what remains to check is referential integrity and
//! activation preconditions.

use outreach_core::{OutreachError, OutreachResult};

use crate::types::{ConditionAction, Sequence, StepKind};

/// Validates a sequence definition. Violations name the offending step.
pub fn validate_sequence(sequence: &Sequence) -> OutreachResult<()> {
    for step in &sequence.steps {
        for condition in &step.conditions {
            if let ConditionAction::JumpTo { target_step_id } = condition.action {
                if sequence.step(&target_step_id).is_none() {
                    return Err(OutreachError::Validation {
                        step_id: step.id,
                        reason: format!(
                            "jump_to target {} does not exist in sequence",
                            target_step_id
                        ),
                    });
                }
            }
        }

        if matches!(step.kind, StepKind::Condition { .. }) && step.conditions.is_empty() {
            return Err(OutreachError::Validation {
                step_id: step.id,
                reason: "condition step has no conditions".into(),
            });
        }
    }

    Ok(())
}

/// Activation preconditions on top of [`validate_sequence`]: at least one
/// trigger and at least one step.
pub fn validate_for_activation(sequence: &Sequence) -> OutreachResult<()> {
    validate_sequence(sequence)?;

    if sequence.triggers.is_empty() {
        return Err(OutreachError::InvalidSequence {
            sequence_id: sequence.id,
            reason: "sequence has no triggers".into(),
        });
    }
    if sequence.steps.is_empty() {
        return Err(OutreachError::InvalidSequence {
            sequence_id: sequence.id,
            reason: "sequence has no steps".into(),
        });
    }

    Ok(())
}
