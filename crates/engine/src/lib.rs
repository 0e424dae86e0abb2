//! Direct execution path — drives contacts through a sequence in-process:
//! condition evaluation, template personalization, durable wait scheduling,
//! and the per-contact step state machine.

pub mod engine;
pub mod evaluator;
pub mod personalize;
pub mod scheduler;
pub mod state_machine;
pub mod types;

pub use engine::SequenceEngine;
pub use evaluator::{ConditionEvaluator, ConditionOutcome};
pub use personalize::{personalize, unresolved_tokens};
pub use scheduler::{InMemoryResumeStore, ResumeEntry, ResumeStore};
pub use types::{ContactRunReport, ExecutionContext, ExecutionState, InteractionUpdate};
