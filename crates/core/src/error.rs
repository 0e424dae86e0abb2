use thiserror::Error;
use uuid::Uuid;

pub type OutreachResult<T> = Result<T, OutreachError>;

#[derive(Error, Debug)]
pub enum OutreachError {
    /// Malformed sequence or step — rejected before activation, never
    /// silently coerced.
    #[error("Validation error on step {step_id}: {reason}")]
    Validation { step_id: Uuid, reason: String },

    /// Sequence-level validation failure with no single offending step.
    #[error("Invalid sequence {sequence_id}: {reason}")]
    InvalidSequence { sequence_id: Uuid, reason: String },

    #[error("Sequence {0} not found")]
    SequenceNotFound(Uuid),

    #[error("Execution context {0} not found")]
    ContextNotFound(Uuid),

    /// A channel send or webhook call failed. Scoped to one contact; never
    /// aborts a batch.
    #[error("Delivery error for contact {contact_id}: {reason}")]
    Delivery { contact_id: String, reason: String },

    /// The external automation runtime rejected a workflow or its activation.
    #[error("Deployment error: {0}")]
    Deployment(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}
