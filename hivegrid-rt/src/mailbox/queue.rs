//! The bounded queue backing every activation mailbox and stream subject.
//!
//! Unlike a plain mpsc channel, the queue supports evicting its oldest entry
//! (DropOldest), so it is built on a `VecDeque` under a short mutex with
//! `Notify`-based wakeups. The lock is never held across an await point.

// Layer 1: Standard library imports
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// Layer 2: Third-party crate imports
use parking_lot::Mutex;
use tokio::sync::Notify;

// Layer 3: Internal module imports
use super::metrics::MailboxMetrics;
use super::traits::{OverflowPolicy, PostError, PostOutcome};
use crate::message::Envelope;

/// Receiver half of an activation mailbox.
pub type MailboxReceiver = QueueReceiver<Envelope>;
/// Sender half of an activation mailbox.
pub type MailboxSender = QueueSender<Envelope>;

/// Create a bounded mailbox, returning the receiver/sender pair.
pub fn mailbox(capacity: usize, policy: OverflowPolicy) -> (MailboxReceiver, MailboxSender) {
    bounded(capacity, policy)
}

/// Create a bounded queue over any item type.
pub fn bounded<T: Send>(
    capacity: usize,
    policy: OverflowPolicy,
) -> (QueueReceiver<T>, QueueSender<T>) {
    let inner = Arc::new(Inner {
        queue: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
        capacity,
        policy,
        closed: AtomicBool::new(false),
        recv_notify: Notify::new(),
        space_notify: Notify::new(),
        metrics: MailboxMetrics::new(),
    });
    (
        QueueReceiver {
            inner: Arc::clone(&inner),
        },
        QueueSender { inner },
    )
}

struct Inner<T> {
    queue: Mutex<VecDeque<T>>,
    capacity: usize,
    policy: OverflowPolicy,
    closed: AtomicBool,
    recv_notify: Notify,
    space_notify: Notify,
    metrics: MailboxMetrics,
}

/// Posting half; cheap to clone and share.
pub struct QueueSender<T> {
    inner: Arc<Inner<T>>,
}

impl<T> std::fmt::Debug for QueueSender<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueSender").finish_non_exhaustive()
    }
}

impl<T> Clone for QueueSender<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send> QueueSender<T> {
    /// Post an item according to the overflow policy.
    ///
    /// Suspends only under [`OverflowPolicy::Block`] on a full queue. A
    /// `Dropped` outcome hands the victim item back so the caller can answer
    /// it.
    pub async fn post(&self, item: T) -> Result<PostOutcome<T>, PostError<T>> {
        let pending = item;
        loop {
            {
                let mut queue = self.inner.queue.lock();
                if self.inner.closed.load(Ordering::Acquire) {
                    return Err(PostError::Closed(pending));
                }
                if queue.len() < self.inner.capacity {
                    queue.push_back(pending);
                    drop(queue);
                    self.inner.metrics.record_sent();
                    self.inner.recv_notify.notify_one();
                    return Ok(PostOutcome::Accepted);
                }
                match self.inner.policy {
                    OverflowPolicy::Error => {
                        return Err(PostError::Full {
                            item: pending,
                            capacity: self.inner.capacity,
                        });
                    }
                    OverflowPolicy::DropNewest => {
                        drop(queue);
                        self.inner.metrics.record_dropped();
                        return Ok(PostOutcome::Dropped(pending));
                    }
                    OverflowPolicy::DropOldest => {
                        // Capacity > 0 is enforced at construction sites, so
                        // a full queue always has a front to evict.
                        let evicted = queue.pop_front();
                        queue.push_back(pending);
                        drop(queue);
                        self.inner.metrics.record_dropped();
                        self.inner.metrics.record_sent();
                        self.inner.recv_notify.notify_one();
                        return match evicted {
                            Some(old) => Ok(PostOutcome::Dropped(old)),
                            None => Ok(PostOutcome::Accepted),
                        };
                    }
                    OverflowPolicy::Block => {}
                }
            }
            // Block policy: wait for the consumer to make room, then retry.
            self.inner.space_notify.notified().await;
        }
    }

    /// Post without ever suspending; Block behaves like Error.
    pub fn try_post(&self, item: T) -> Result<PostOutcome<T>, PostError<T>> {
        let mut queue = self.inner.queue.lock();
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(PostError::Closed(item));
        }
        if queue.len() < self.inner.capacity {
            queue.push_back(item);
            drop(queue);
            self.inner.metrics.record_sent();
            self.inner.recv_notify.notify_one();
            return Ok(PostOutcome::Accepted);
        }
        Err(PostError::Full {
            item,
            capacity: self.inner.capacity,
        })
    }

    /// Shut the queue; pending items remain drainable by the receiver.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.recv_notify.notify_waiters();
        self.inner.space_notify.notify_waiters();
    }

    /// Whether the queue is shut down.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Items currently queued.
    pub fn depth(&self) -> usize {
        self.inner.queue.lock().len()
    }

    /// Counter access for the owning component.
    pub fn metrics(&self) -> &MailboxMetrics {
        &self.inner.metrics
    }
}

/// Receiving half; owned exclusively by one worker.
pub struct QueueReceiver<T> {
    inner: Arc<Inner<T>>,
}

impl<T: Send> QueueReceiver<T> {
    /// Dequeue the next item in enqueue order.
    ///
    /// Returns `None` once the queue is closed and fully drained.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            let notified = self.inner.recv_notify.notified();
            {
                let mut queue = self.inner.queue.lock();
                if let Some(item) = queue.pop_front() {
                    drop(queue);
                    self.inner.metrics.record_received();
                    self.inner.space_notify.notify_one();
                    return Some(item);
                }
                if self.inner.closed.load(Ordering::Acquire) {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Items currently queued.
    pub fn depth(&self) -> usize {
        self.inner.queue.lock().len()
    }

    /// Counter access.
    pub fn metrics(&self) -> &MailboxMetrics {
        &self.inner.metrics
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)] // Tests are allowed to use unwrap for simplicity
mod tests {
    use super::*;
    use super::super::traits::MailboxError;
    use crate::util::ActorKey;
    use bytes::Bytes;

    fn envelope(tag: &str) -> Envelope {
        Envelope::call(ActorKey::new("Test", "a"), tag, Bytes::new())
    }

    fn method_of(envelope: &Envelope) -> String {
        envelope.operation.name()
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let (mut rx, tx) = mailbox(8, OverflowPolicy::Error);
        tx.post(envelope("one")).await.unwrap();
        tx.post(envelope("two")).await.unwrap();

        assert_eq!(method_of(&rx.recv().await.unwrap()), "one");
        assert_eq!(method_of(&rx.recv().await.unwrap()), "two");
    }

    #[tokio::test]
    async fn test_error_policy_rejects_when_full() {
        let (_rx, tx) = mailbox(2, OverflowPolicy::Error);
        tx.post(envelope("1")).await.unwrap();
        tx.post(envelope("2")).await.unwrap();

        let err = tx.post(envelope("3")).await.unwrap_err();
        assert!(matches!(
            err.as_mailbox_error(),
            MailboxError::Full { capacity: 2 }
        ));
    }

    #[tokio::test]
    async fn test_drop_oldest_evicts_front() {
        let (mut rx, tx) = bounded(2, OverflowPolicy::DropOldest);
        tx.post(1u32).await.unwrap();
        tx.post(2u32).await.unwrap();

        let outcome = tx.post(3u32).await.unwrap();
        match outcome {
            PostOutcome::Dropped(victim) => assert_eq!(victim, 1),
            other => panic!("expected eviction, got {other:?}"),
        }

        assert_eq!(rx.recv().await.unwrap(), 2);
        assert_eq!(rx.recv().await.unwrap(), 3);
        assert_eq!(tx.metrics().dropped_count(), 1);
    }

    #[tokio::test]
    async fn test_drop_newest_discards_incoming() {
        let (mut rx, tx) = bounded(1, OverflowPolicy::DropNewest);
        tx.post("keep").await.unwrap();

        let outcome = tx.post("discard").await.unwrap();
        match outcome {
            PostOutcome::Dropped(victim) => assert_eq!(victim, "discard"),
            other => panic!("expected drop, got {other:?}"),
        }

        assert_eq!(rx.recv().await.unwrap(), "keep");
    }

    #[tokio::test]
    async fn test_block_policy_waits_for_space() {
        let (mut rx, tx) = bounded(1, OverflowPolicy::Block);
        tx.post(1u32).await.unwrap();

        let tx2 = tx.clone();
        let blocked = tokio::spawn(async move { tx2.post(2u32).await });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!blocked.is_finished());

        // Dequeue to make room; the blocked post completes.
        assert_eq!(rx.recv().await.unwrap(), 1);
        blocked.await.unwrap().unwrap();
        assert_eq!(rx.recv().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_closed_queue_rejects_posts_and_drains() {
        let (mut rx, tx) = mailbox(4, OverflowPolicy::Error);
        tx.post(envelope("pending")).await.unwrap();
        tx.close();

        let err = tx.post(envelope("late")).await.unwrap_err();
        assert!(matches!(err, PostError::Closed(_)));
        assert_eq!(method_of(&err.into_item()), "late");

        // Receiver still drains what was queued, then observes the close.
        assert_eq!(method_of(&rx.recv().await.unwrap()), "pending");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_close_wakes_blocked_sender() {
        let (_rx, tx) = bounded(1, OverflowPolicy::Block);
        tx.post(1u32).await.unwrap();

        let tx2 = tx.clone();
        let blocked = tokio::spawn(async move { tx2.post(2u32).await });
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        tx.close();
        let result = blocked.await.unwrap();
        assert!(matches!(result, Err(PostError::Closed(_))));
    }

    #[tokio::test]
    async fn test_depth_tracking() {
        let (mut rx, tx) = mailbox(8, OverflowPolicy::Error);
        assert_eq!(tx.depth(), 0);

        tx.post(envelope("1")).await.unwrap();
        tx.post(envelope("2")).await.unwrap();
        assert_eq!(tx.depth(), 2);
        assert_eq!(tx.metrics().in_flight(), 2);

        rx.recv().await.unwrap();
        assert_eq!(tx.depth(), 1);
    }
}
