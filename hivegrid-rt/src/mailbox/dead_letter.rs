//! Bounded dead-letter queue shared by mailboxes and stream delivery.
//!
//! Dead letters are never replayed automatically; retry is a caller-level
//! policy. When the queue is full the oldest entry is evicted so recent
//! failures stay observable.

// Layer 1: Standard library imports
use std::collections::VecDeque;

// Layer 2: Third-party crate imports
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::warn;

// Layer 3: Internal module imports
use crate::message::EnvelopeRecord;
use crate::util::{ActorKey, MessageId};

/// One captured failure.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    /// Snapshot of the failed envelope.
    pub envelope: EnvelopeRecord,
    /// Human-readable failure cause.
    pub cause: String,
    /// The actor whose handler failed (or would have handled the envelope).
    pub actor: ActorKey,
    /// Capture time.
    pub at: DateTime<Utc>,
}

/// Bounded FIFO of captured failures.
#[derive(Debug)]
pub struct DeadLetterQueue {
    entries: Mutex<VecDeque<DeadLetter>>,
    capacity: usize,
}

impl DeadLetterQueue {
    /// Create a queue holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            capacity,
        }
    }

    /// Capture a failed envelope.
    pub fn push(&self, envelope: EnvelopeRecord, actor: ActorKey, cause: impl Into<String>) {
        let letter = DeadLetter {
            envelope,
            cause: cause.into(),
            actor,
            at: Utc::now(),
        };
        warn!(
            actor = %letter.actor,
            operation = %letter.envelope.operation,
            cause = %letter.cause,
            "envelope dead-lettered"
        );

        let mut entries = self.entries.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(letter);
    }

    /// All entries, oldest first.
    pub fn list(&self) -> Vec<DeadLetter> {
        self.entries.lock().iter().cloned().collect()
    }

    /// Entries for one actor, oldest first.
    pub fn get_by_actor(&self, actor: &ActorKey) -> Vec<DeadLetter> {
        self.entries
            .lock()
            .iter()
            .filter(|letter| &letter.actor == actor)
            .cloned()
            .collect()
    }

    /// Remove one entry by its original message id.
    pub fn remove(&self, message_id: &MessageId) -> Option<DeadLetter> {
        let mut entries = self.entries.lock();
        let index = entries
            .iter()
            .position(|letter| &letter.envelope.message_id == message_id)?;
        entries.remove(index)
    }

    /// Drop all entries.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Number of captured entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether no failures have been captured.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Tests are allowed to use unwrap for simplicity
mod tests {
    use super::*;
    use crate::message::Envelope;
    use bytes::Bytes;

    fn record(actor: &ActorKey, method: &str) -> EnvelopeRecord {
        Envelope::call(actor.clone(), method, Bytes::new()).record()
    }

    #[test]
    fn test_push_and_list() {
        let dlq = DeadLetterQueue::new(8);
        let actor = ActorKey::new("Worker", "w-1");

        dlq.push(record(&actor, "DoWork"), actor.clone(), "boom");

        let letters = dlq.list();
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].cause, "boom");
        assert_eq!(letters[0].actor, actor);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let dlq = DeadLetterQueue::new(2);
        let actor = ActorKey::new("Worker", "w-1");

        dlq.push(record(&actor, "first"), actor.clone(), "c1");
        dlq.push(record(&actor, "second"), actor.clone(), "c2");
        dlq.push(record(&actor, "third"), actor.clone(), "c3");

        let letters = dlq.list();
        assert_eq!(letters.len(), 2);
        assert_eq!(letters[0].envelope.operation, "second");
        assert_eq!(letters[1].envelope.operation, "third");
    }

    #[test]
    fn test_get_by_actor_filters() {
        let dlq = DeadLetterQueue::new(8);
        let a = ActorKey::new("Worker", "a");
        let b = ActorKey::new("Worker", "b");

        dlq.push(record(&a, "m"), a.clone(), "x");
        dlq.push(record(&b, "m"), b.clone(), "y");

        assert_eq!(dlq.get_by_actor(&a).len(), 1);
        assert_eq!(dlq.get_by_actor(&b).len(), 1);
    }

    #[test]
    fn test_remove_by_message_id() {
        let dlq = DeadLetterQueue::new(8);
        let actor = ActorKey::new("Worker", "w");
        let rec = record(&actor, "m");
        let id = rec.message_id;

        dlq.push(rec, actor.clone(), "x");
        assert!(dlq.remove(&id).is_some());
        assert!(dlq.is_empty());
        assert!(dlq.remove(&id).is_none());
    }

    #[test]
    fn test_clear() {
        let dlq = DeadLetterQueue::new(8);
        let actor = ActorKey::new("Worker", "w");
        dlq.push(record(&actor, "m"), actor.clone(), "x");

        dlq.clear();
        assert!(dlq.is_empty());
        assert_eq!(dlq.len(), 0);
    }
}
