//! Sequence model — the declarative shape of a multi-step, multi-channel
//! outreach sequence, plus validation and built-in templates.

pub mod templates;
pub mod types;
pub mod validation;

pub use types::{
    ConditionAction, ConditionType, DelayUnit, Sequence, SequenceStats, SequenceStatus, Step,
    StepCondition, StepKind, StepStats, Timing, Trigger,
};
pub use validation::{validate_for_activation, validate_sequence};
