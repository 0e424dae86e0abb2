//! Execution-state lifecycle guard.
//!
//! The engine only mutates a context's state through this table, so an
//! impossible transition (say, resuming a stopped contact) is a hard error
//! instead of silent corruption.

use anyhow::{anyhow, Result};

use crate::types::ExecutionState;

/// Enforces the finite set of valid per-contact state transitions.
#[derive(Debug, Clone)]
pub struct ExecutionStateMachine {
    transitions: Vec<(ExecutionState, ExecutionState)>,
}

impl ExecutionStateMachine {
    pub fn new() -> Self {
        use ExecutionState::*;
        let transitions = vec![
            // A fresh context starts evaluating its first step.
            (Pending, Evaluating),
            // Evaluating settles into one of: side effect, advance without
            // side effect (wait/condition/jump), suspension, or a terminal.
            (Evaluating, Executing),
            (Evaluating, Continuing),
            (Evaluating, Waiting),
            (Evaluating, Stopped),
            (Evaluating, Completed),
            // A send either lands or fails this contact.
            (Executing, Continuing),
            (Executing, Failed),
            // After advancing, the next step is evaluated or the sequence
            // is exhausted.
            (Continuing, Evaluating),
            (Continuing, Completed),
            // A suspended contact resumes evaluation, or is stopped while
            // parked (sequence paused, armed stop condition).
            (Waiting, Evaluating),
            (Waiting, Stopped),
        ];
        Self { transitions }
    }

    pub fn can_transition(&self, from: ExecutionState, to: ExecutionState) -> bool {
        self.transitions.iter().any(|(f, t)| *f == from && *t == to)
    }

    /// Validates and returns the new state.
    pub fn transition(&self, from: ExecutionState, to: ExecutionState) -> Result<ExecutionState> {
        if self.can_transition(from, to) {
            Ok(to)
        } else {
            Err(anyhow!(
                "Invalid execution state transition from {:?} to {:?}",
                from,
                to
            ))
        }
    }
}

impl Default for ExecutionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ExecutionState::*;

    #[test]
    fn test_happy_path_transitions() {
        let sm = ExecutionStateMachine::new();
        for (from, to) in [
            (Pending, Evaluating),
            (Evaluating, Executing),
            (Executing, Continuing),
            (Continuing, Evaluating),
            (Evaluating, Waiting),
            (Waiting, Evaluating),
            (Evaluating, Completed),
        ] {
            assert!(sm.can_transition(from, to), "{from:?} -> {to:?}");
        }
    }

    #[test]
    fn test_terminals_have_no_exits() {
        let sm = ExecutionStateMachine::new();
        for terminal in [Stopped, Completed, Failed] {
            for to in [
                Pending, Waiting, Evaluating, Executing, Continuing, Stopped, Completed, Failed,
            ] {
                assert!(!sm.can_transition(terminal, to), "{terminal:?} -> {to:?}");
            }
        }
    }

    #[test]
    fn test_waiting_cannot_skip_evaluation() {
        let sm = ExecutionStateMachine::new();
        assert!(!sm.can_transition(Waiting, Executing));
        assert!(sm.transition(Waiting, Evaluating).is_ok());
        assert!(sm.transition(Waiting, Completed).is_err());
    }
}
