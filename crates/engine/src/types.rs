use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use outreach_core::types::Contact;
use outreach_sequence::ConditionType;

/// Runtime state of one contact progressing through one sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    Pending,
    Waiting,
    Evaluating,
    Executing,
    Continuing,
    Stopped,
    Completed,
    Failed,
}

impl ExecutionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionState::Stopped | ExecutionState::Completed | ExecutionState::Failed
        )
    }
}

/// The live progress of one (sequence, contact) pair. One per contact,
/// never shared; serializable so suspended work can be checkpointed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub id: Uuid,
    pub sequence_id: Uuid,
    pub contact: Contact,
    /// Index into the sequence's step list.
    pub cursor: usize,
    pub state: ExecutionState,
    /// Campaign-level personalization variables for this run.
    pub variables: HashMap<String, String>,
    /// Stop conditions from already-passed steps; re-checked at every later
    /// evaluation point so a reply during a multi-day wait still halts the
    /// contact.
    pub armed_stops: Vec<ConditionType>,
    /// Cursor position whose delay has already been served, so a resumed
    /// context does not re-schedule the same wait.
    pub waited_cursor: Option<usize>,
    pub resume_at: Option<DateTime<Utc>>,
    /// The most recent message-bearing step, credited with subsequent
    /// open/reply/click interactions.
    pub last_message_step: Option<Uuid>,
    pub last_error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExecutionContext {
    pub fn new(sequence_id: Uuid, contact: Contact, variables: HashMap<String, String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            sequence_id,
            contact,
            cursor: 0,
            state: ExecutionState::Pending,
            variables,
            armed_stops: Vec::new(),
            waited_cursor: None,
            resume_at: None,
            last_message_step: None,
            last_error: None,
            started_at: now,
            updated_at: now,
        }
    }
}

/// Per-contact outcome of a batch entry or a tick resumption.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactRunReport {
    pub contact_id: String,
    pub context_id: Option<Uuid>,
    pub state: Option<ExecutionState>,
    pub error: Option<String>,
}

/// An interaction observed by the external tracking collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionUpdate {
    Replied,
    Opened,
    Clicked,
}
