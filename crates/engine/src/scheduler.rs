//! Durable wait scheduling.
//!
//! A wait is a suspension point, never a blocking sleep: the engine records
//! `(context_id, resume_at)` in a [`ResumeStore`] and a time-ordered drain
//! (`SequenceEngine::tick`) resumes whatever is due. The in-memory store is
//! the default backend; deployments that must survive restarts plug a
//! persistent implementation in through the same trait.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A pending resumption for one suspended execution context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeEntry {
    pub context_id: Uuid,
    pub sequence_id: Uuid,
    pub resume_at: DateTime<Utc>,
}

/// Storage for pending resumptions, time-ordered.
pub trait ResumeStore: Send + Sync {
    fn insert(&self, entry: ResumeEntry);

    /// Removes and returns every entry with `resume_at <= now`, soonest
    /// first.
    fn drain_due(&self, now: DateTime<Utc>) -> Vec<ResumeEntry>;

    /// Drops all pending resumptions for a sequence. Returns how many were
    /// cancelled. Used when a sequence is paused.
    fn cancel_sequence(&self, sequence_id: &Uuid) -> usize;

    fn pending(&self) -> usize;
}

/// Default backend: a `BTreeMap` keyed by `(resume_at, context_id)` under a
/// mutex. Pending work does not survive a process restart.
#[derive(Default)]
pub struct InMemoryResumeStore {
    queue: Mutex<BTreeMap<(DateTime<Utc>, Uuid), ResumeEntry>>,
}

impl InMemoryResumeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResumeStore for InMemoryResumeStore {
    fn insert(&self, entry: ResumeEntry) {
        self.queue
            .lock()
            .insert((entry.resume_at, entry.context_id), entry);
    }

    fn drain_due(&self, now: DateTime<Utc>) -> Vec<ResumeEntry> {
        let mut queue = self.queue.lock();
        let due_keys: Vec<(DateTime<Utc>, Uuid)> = queue
            .range(..)
            .take_while(|((at, _), _)| *at <= now)
            .map(|(k, _)| *k)
            .collect();
        due_keys
            .into_iter()
            .filter_map(|k| queue.remove(&k))
            .collect()
    }

    fn cancel_sequence(&self, sequence_id: &Uuid) -> usize {
        let mut queue = self.queue.lock();
        let before = queue.len();
        queue.retain(|_, entry| entry.sequence_id != *sequence_id);
        before - queue.len()
    }

    fn pending(&self) -> usize {
        self.queue.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn entry(sequence_id: Uuid, offset_mins: i64, base: DateTime<Utc>) -> ResumeEntry {
        ResumeEntry {
            context_id: Uuid::new_v4(),
            sequence_id,
            resume_at: base + Duration::minutes(offset_mins),
        }
    }

    #[test]
    fn test_drain_respects_time_order() {
        let store = InMemoryResumeStore::new();
        let now = Utc::now();
        let seq = Uuid::new_v4();

        store.insert(entry(seq, 30, now));
        store.insert(entry(seq, 5, now));
        store.insert(entry(seq, 90, now));
        assert_eq!(store.pending(), 3);

        let due = store.drain_due(now + Duration::minutes(45));
        assert_eq!(due.len(), 2);
        assert!(due[0].resume_at <= due[1].resume_at);
        assert_eq!(store.pending(), 1);

        // Draining again at the same instant yields nothing.
        assert!(store.drain_due(now + Duration::minutes(45)).is_empty());
    }

    #[test]
    fn test_cancel_sequence() {
        let store = InMemoryResumeStore::new();
        let now = Utc::now();
        let keep = Uuid::new_v4();
        let cancel = Uuid::new_v4();

        store.insert(entry(keep, 10, now));
        store.insert(entry(cancel, 10, now));
        store.insert(entry(cancel, 20, now));

        assert_eq!(store.cancel_sequence(&cancel), 2);
        assert_eq!(store.pending(), 1);

        let due = store.drain_due(now + Duration::hours(1));
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].sequence_id, keep);
    }
}
