//! Event bus — trait for emitting sequence lifecycle events from any module.
//!
//! Modules accept an `Arc<dyn EventSink>` so event routing (analytics,
//! customer webhooks, logs) stays outside the engine.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use uuid::Uuid;

use crate::types::{EventType, SequenceEvent};

/// Trait for emitting lifecycle events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: SequenceEvent);
}

/// No-op sink for modules that don't need event emission.
pub struct NoOpSink;

impl EventSink for NoOpSink {
    fn emit(&self, _event: SequenceEvent) {}
}

/// In-memory sink that captures events for testing.
#[derive(Default)]
pub struct CaptureSink {
    events: Mutex<Vec<SequenceEvent>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<SequenceEvent> {
        self.events.lock().expect("event bus mutex poisoned").clone()
    }

    pub fn count(&self) -> usize {
        self.events.lock().expect("event bus mutex poisoned").len()
    }

    pub fn count_type(&self, event_type: EventType) -> usize {
        self.events
            .lock()
            .expect("event bus mutex poisoned")
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }
}

impl EventSink for CaptureSink {
    fn emit(&self, event: SequenceEvent) {
        self.events.lock().expect("event bus mutex poisoned").push(event);
    }
}

/// Convenience builder for creating `SequenceEvent` with minimal boilerplate.
pub fn make_event(
    event_type: EventType,
    sequence_id: Uuid,
    contact_id: Option<String>,
    step_id: Option<Uuid>,
) -> SequenceEvent {
    SequenceEvent {
        event_id: Uuid::new_v4(),
        event_type,
        sequence_id,
        contact_id,
        step_id,
        timestamp: Utc::now(),
    }
}

/// Convenience: a no-op event bus for modules that don't need one.
pub fn noop_sink() -> Arc<dyn EventSink> {
    Arc::new(NoOpSink)
}

/// Convenience: a capture sink for tests.
pub fn capture_sink() -> Arc<CaptureSink> {
    Arc::new(CaptureSink::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_sink() {
        let sink = capture_sink();
        assert_eq!(sink.count(), 0);

        let seq = Uuid::new_v4();
        sink.emit(make_event(
            EventType::ContactEntered,
            seq,
            Some("c-1".into()),
            None,
        ));
        sink.emit(make_event(
            EventType::MessageSent,
            seq,
            Some("c-1".into()),
            Some(Uuid::new_v4()),
        ));

        assert_eq!(sink.count(), 2);
        assert_eq!(sink.count_type(EventType::MessageSent), 1);
        assert_eq!(sink.count_type(EventType::ContactStopped), 0);
    }
}
