// Layer 1: Standard library imports
use std::sync::atomic::{AtomicU64, Ordering};

// Layer 2: Third-party crate imports
// (none)

// Layer 3: Internal module imports
// (none)

/// Lock-free counters for one mailbox.
///
/// `in_flight` is derived (`sent - received`) so the queue never has to be
/// locked just to report its depth.
#[derive(Debug, Default)]
pub struct MailboxMetrics {
    sent: AtomicU64,
    received: AtomicU64,
    dropped: AtomicU64,
    dead_lettered: AtomicU64,
}

impl MailboxMetrics {
    /// Create zeroed metrics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an accepted post.
    pub fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a dequeue by the dispatcher.
    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an envelope discarded by the overflow policy.
    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an envelope routed to the dead-letter queue.
    pub fn record_dead_lettered(&self) {
        self.dead_lettered.fetch_add(1, Ordering::Relaxed);
    }

    /// Total accepted posts.
    pub fn sent_count(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Total dequeues.
    pub fn received_count(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    /// Total policy drops.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Total dead letters.
    pub fn dead_lettered_count(&self) -> u64 {
        self.dead_lettered.load(Ordering::Relaxed)
    }

    /// Envelopes queued but not yet dequeued.
    pub fn in_flight(&self) -> u64 {
        self.sent_count().saturating_sub(self.received_count())
    }
}
