//! At-least-once outbox drain worker.
//!
//! Messages are persisted by [`OutboxStore::enqueue`] and delivered to an
//! [`OutboxSink`] by a background worker. Failed deliveries retry with
//! jittered exponential backoff (`base * 2^attempts`, capped) up to
//! `max_retries`; after that the row is marked terminally failed and left in
//! the table.

// Layer 1: Standard library imports
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use rand::Rng;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

// Layer 3: Internal module imports
use super::error::StorageError;
use super::traits::{OutboxMessage, OutboxStore};
use crate::util::MessageId;

/// External delivery target for outbox rows.
#[async_trait]
pub trait OutboxSink: Send + Sync + Debug {
    /// Deliver one message; an error schedules a retry.
    async fn deliver(&self, message: &OutboxMessage) -> Result<(), StorageError>;
}

/// Outbox worker tuning.
#[derive(Debug, Clone)]
pub struct OutboxConfig {
    /// Poll interval of the drain loop.
    pub poll_interval: Duration,
    /// Rows fetched per poll.
    pub batch_size: usize,
    /// Base delay for exponential backoff.
    pub base_backoff: Duration,
    /// Cap on the backoff delay.
    pub max_backoff: Duration,
    /// Attempts before a row is marked terminally failed.
    pub max_retries: u32,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            batch_size: 32,
            base_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(60),
            max_retries: 8,
        }
    }
}

impl OutboxConfig {
    /// Backoff delay before attempt `attempts + 1`.
    ///
    /// `base * 2^min(attempts, 10)`, capped at `max_backoff`, with up to 20%
    /// subtractive jitter so rows that failed together do not retry in
    /// lockstep.
    pub fn backoff_delay(&self, attempts: u32) -> Duration {
        let exponent = attempts.min(10);
        let delay = self.base_backoff.saturating_mul(1u32 << exponent);
        let capped = delay.min(self.max_backoff);
        capped.mul_f64(rand::thread_rng().gen_range(0.8..=1.0))
    }
}

/// Durable at-least-once producer with a background drain worker.
#[derive(Debug)]
pub struct Outbox {
    store: Arc<dyn OutboxStore>,
    sink: Arc<dyn OutboxSink>,
    config: OutboxConfig,
    shutdown: watch::Sender<bool>,
    worker: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl Outbox {
    /// Create an outbox over a store and sink.
    pub fn new(store: Arc<dyn OutboxStore>, sink: Arc<dyn OutboxSink>, config: OutboxConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            store,
            sink,
            config,
            shutdown,
            worker: parking_lot::Mutex::new(None),
        }
    }

    /// Persist a message for eventual delivery.
    pub async fn enqueue(&self, payload: Bytes) -> Result<MessageId, StorageError> {
        self.store.enqueue(payload).await
    }

    /// Start the drain worker (idempotent).
    pub fn start(&self) {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return;
        }

        let store = Arc::clone(&self.store);
        let sink = Arc::clone(&self.sink);
        let config = self.config.clone();
        let mut shutdown = self.shutdown.subscribe();

        *worker = Some(tokio::spawn(async move {
            loop {
                if *shutdown.borrow() {
                    break;
                }
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = tokio::time::sleep(config.poll_interval) => {
                        drain_once(store.as_ref(), sink.as_ref(), &config).await;
                    }
                }
            }
        }));
    }

    /// Stop the drain worker (idempotent).
    pub async fn stop(&self) {
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            let _ = self.shutdown.send(true);
            let _ = handle.await;
        }
    }

    /// Run one drain pass inline (tests and shutdown flushes).
    pub async fn drain_now(&self) {
        drain_once(self.store.as_ref(), self.sink.as_ref(), &self.config).await;
    }
}

async fn drain_once(store: &dyn OutboxStore, sink: &dyn OutboxSink, config: &OutboxConfig) {
    let now = Utc::now();
    let batch = match store.pending(now, config.batch_size).await {
        Ok(batch) => batch,
        Err(err) => {
            warn!(error = %err, "outbox poll failed");
            return;
        }
    };

    for message in batch {
        match sink.deliver(&message).await {
            Ok(()) => {
                if let Err(err) = store.mark_sent(&message.id).await {
                    warn!(id = %message.id, error = %err, "outbox mark-sent failed");
                }
            }
            Err(err) => {
                if message.attempts + 1 >= config.max_retries {
                    warn!(id = %message.id, error = %err, "outbox delivery failed terminally");
                    if let Err(err) = store.mark_failed(&message.id).await {
                        warn!(id = %message.id, error = %err, "outbox mark-failed failed");
                    }
                } else {
                    let delay = config.backoff_delay(message.attempts);
                    debug!(
                        id = %message.id,
                        attempts = message.attempts + 1,
                        delay_ms = delay.as_millis() as u64,
                        "outbox delivery failed, scheduling retry"
                    );
                    let next = now
                        + chrono::Duration::from_std(delay)
                            .unwrap_or_else(|_| chrono::Duration::seconds(60));
                    if let Err(err) = store.mark_retry(&message.id, next).await {
                        warn!(id = %message.id, error = %err, "outbox mark-retry failed");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Tests are allowed to use unwrap for simplicity
mod tests {
    use super::*;
    use crate::storage::memory::MemoryOutboxStore;
    use crate::storage::traits::OutboxStatus;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, Default)]
    struct CountingSink {
        delivered: AtomicU32,
        fail_first: u32,
    }

    #[async_trait]
    impl OutboxSink for CountingSink {
        async fn deliver(&self, _message: &OutboxMessage) -> Result<(), StorageError> {
            let n = self.delivered.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                Err(StorageError::Unavailable("sink down".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let config = OutboxConfig {
            base_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(1),
            ..OutboxConfig::default()
        };

        // Jitter subtracts up to 20%, so each delay lands in
        // [0.8 * ceiling, ceiling].
        for (attempts, ceiling_ms) in [(0u32, 100u64), (1, 200), (2, 400)] {
            let delay = config.backoff_delay(attempts);
            assert!(delay <= Duration::from_millis(ceiling_ms), "delay {delay:?}");
            assert!(
                delay >= Duration::from_millis(ceiling_ms * 8 / 10),
                "delay {delay:?} below jitter floor for attempt {attempts}"
            );
        }

        // The cap holds for large and overflowing exponents.
        for attempts in [10u32, 30] {
            let delay = config.backoff_delay(attempts);
            assert!(delay <= Duration::from_secs(1));
            assert!(delay >= Duration::from_millis(800));
        }
    }

    #[tokio::test]
    async fn test_drain_marks_sent() {
        let store = Arc::new(MemoryOutboxStore::new());
        let sink = Arc::new(CountingSink::default());
        let outbox = Outbox::new(
            Arc::clone(&store) as Arc<dyn OutboxStore>,
            Arc::clone(&sink) as Arc<dyn OutboxSink>,
            OutboxConfig::default(),
        );

        let id = outbox.enqueue(Bytes::from_static(b"evt")).await.unwrap();
        outbox.drain_now().await;

        let row = store.get(&id).await.unwrap().unwrap();
        assert_eq!(row.status, OutboxStatus::Sent);
        assert_eq!(sink.delivered.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_delivery_schedules_retry() {
        let store = Arc::new(MemoryOutboxStore::new());
        let sink = Arc::new(CountingSink {
            fail_first: 1,
            ..CountingSink::default()
        });
        let outbox = Outbox::new(
            Arc::clone(&store) as Arc<dyn OutboxStore>,
            Arc::clone(&sink) as Arc<dyn OutboxSink>,
            OutboxConfig::default(),
        );

        let id = outbox.enqueue(Bytes::from_static(b"evt")).await.unwrap();
        outbox.drain_now().await;

        let row = store.get(&id).await.unwrap().unwrap();
        assert_eq!(row.status, OutboxStatus::Pending);
        assert_eq!(row.attempts, 1);
        assert!(row.next_attempt_at > row.enqueued_at);
    }

    #[tokio::test]
    async fn test_terminal_failure_after_max_retries() {
        let store = Arc::new(MemoryOutboxStore::new());
        let sink = Arc::new(CountingSink {
            fail_first: u32::MAX,
            ..CountingSink::default()
        });
        let config = OutboxConfig {
            max_retries: 2,
            base_backoff: Duration::ZERO,
            ..OutboxConfig::default()
        };
        let outbox = Outbox::new(
            Arc::clone(&store) as Arc<dyn OutboxStore>,
            Arc::clone(&sink) as Arc<dyn OutboxSink>,
            config,
        );

        let id = outbox.enqueue(Bytes::from_static(b"evt")).await.unwrap();
        outbox.drain_now().await;
        outbox.drain_now().await;

        let row = store.get(&id).await.unwrap().unwrap();
        assert_eq!(row.status, OutboxStatus::Failed);
    }

    #[tokio::test]
    async fn test_worker_start_stop_idempotent() {
        let store = Arc::new(MemoryOutboxStore::new());
        let sink = Arc::new(CountingSink::default());
        let outbox = Outbox::new(
            Arc::clone(&store) as Arc<dyn OutboxStore>,
            sink as Arc<dyn OutboxSink>,
            OutboxConfig {
                poll_interval: Duration::from_millis(10),
                ..OutboxConfig::default()
            },
        );

        outbox.start();
        outbox.start();

        outbox.enqueue(Bytes::from_static(b"evt")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        outbox.stop().await;
        outbox.stop().await;
    }
}
