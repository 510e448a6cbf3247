//! Subject registry, fan-out, backpressure, and implicit consumer routing.
//!
//! A subject delivers to two audiences: explicit subscribers (callback
//! handles, invoked on the broker's workers) and implicit consumers (actor
//! types bound to the subject namespace; delivery is an enqueue into that
//! actor's mailbox with the subject key as the actor id). Per-publisher
//! order is preserved because a subject funnels through one FIFO.

// Layer 1: Standard library imports
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::{Duration, Instant};

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use futures::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

// Layer 3: Internal module imports
use super::backpressure::DeliveryPolicy;
use super::subject::StreamSubject;
use crate::error::{ErrorKind, InvokeError};
use crate::mailbox::{bounded, DeadLetterQueue, OverflowPolicy, PostError, PostOutcome, QueueSender};
use crate::message::Envelope;
use crate::monitoring::{names, Telemetry, TelemetryEvent};
use crate::actor::ActorTypeRegistry;
use crate::util::ActorKey;

/// Callback invoked for every delivered message of an explicit subscription.
pub type SubscriberFn = Arc<dyn Fn(StreamSubject, Bytes) -> BoxFuture<'static, ()> + Send + Sync>;
/// Optional payload filter applied before a subscriber's callback.
pub type SubscriberFilter = Arc<dyn Fn(&Bytes) -> bool + Send + Sync>;

/// Routes a stream event into a consumer actor's mailbox, locally or via the
/// transport. Implemented by the hosting silo.
#[async_trait]
pub trait ConsumerDelivery: Send + Sync + std::fmt::Debug {
    /// Deliver one event to the consumer actor.
    async fn deliver(
        &self,
        consumer: ActorKey,
        subject: StreamSubject,
        payload: Bytes,
    ) -> Result<(), InvokeError>;
}

/// Counters for one subject.
#[derive(Debug, Default)]
struct SubjectMetrics {
    published: AtomicU64,
    throttle_events: AtomicU64,
    peak_depth: AtomicU64,
}

/// Point-in-time stats for one subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectStats {
    /// Messages accepted by publish.
    pub published: u64,
    /// Messages discarded by a drop policy.
    pub dropped: u64,
    /// Publishes delayed or rejected by throttling.
    pub throttle_events: u64,
    /// Messages currently buffered.
    pub current_depth: usize,
    /// Highest buffered depth observed.
    pub peak_depth: u64,
}

struct Subscriber {
    id: Uuid,
    owner: Option<ActorKey>,
    filter: Option<SubscriberFilter>,
    handler: SubscriberFn,
}

struct SubjectState {
    subject: StreamSubject,
    policy: DeliveryPolicy,
    subscribers: RwLock<Vec<Subscriber>>,
    metrics: SubjectMetrics,
    /// Present for the buffered policies.
    buffer: Option<QueueSender<Bytes>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    /// Publish admission times within the throttle window.
    throttle_window: Mutex<VecDeque<Instant>>,
}

/// The per-process stream broker.
pub struct StreamBroker {
    inner: Arc<BrokerInner>,
}

pub(crate) struct BrokerInner {
    registry: Arc<ActorTypeRegistry>,
    delivery: OnceLock<Arc<dyn ConsumerDelivery>>,
    subjects: DashMap<StreamSubject, Arc<SubjectState>>,
    default_policy: DeliveryPolicy,
    dlq: Arc<DeadLetterQueue>,
    telemetry: Arc<dyn Telemetry>,
}

impl StreamBroker {
    /// Create a broker with a default per-subject policy.
    pub fn new(
        registry: Arc<ActorTypeRegistry>,
        dlq: Arc<DeadLetterQueue>,
        telemetry: Arc<dyn Telemetry>,
        default_policy: DeliveryPolicy,
    ) -> Arc<Self> {
        Arc::new(Self {
            inner: Arc::new(BrokerInner {
                registry,
                delivery: OnceLock::new(),
                subjects: DashMap::new(),
                default_policy,
                dlq,
                telemetry,
            }),
        })
    }

    /// Wire the consumer-delivery route (set once by the hosting silo).
    pub fn set_consumer_delivery(&self, delivery: Arc<dyn ConsumerDelivery>) {
        let _ = self.inner.delivery.set(delivery);
    }

    /// Set the backpressure policy for a subject (before its first publish).
    pub fn configure(&self, subject: StreamSubject, policy: DeliveryPolicy) {
        self.inner.state_of(subject, Some(policy));
    }

    /// Publish a payload on a subject.
    ///
    /// Suspension depends on the subject's policy: `Unbuffered` waits for
    /// delivery, `Block` waits for buffer space, `Throttle { block: true }`
    /// waits for the window. `deadline` bounds any of those waits.
    pub async fn publish(
        &self,
        subject: &StreamSubject,
        payload: Bytes,
        deadline: Option<Duration>,
    ) -> Result<(), InvokeError> {
        let has_consumers = !self
            .inner
            .registry
            .stream_consumers(subject.namespace())
            .is_empty();
        if has_consumers && subject.key().is_empty() {
            return Err(InvokeError::marshalling(
                "implicit consumers require a non-empty subject key",
            ));
        }

        let state = self.inner.state_of(subject.clone(), None);
        self.inner
            .telemetry
            .record(TelemetryEvent::now(names::STREAM_PUBLISH));

        let attempt = self.publish_to(&state, payload);
        match deadline {
            Some(deadline) => match tokio::time::timeout(deadline, attempt).await {
                Ok(result) => result,
                Err(_) => Err(InvokeError::timeout("publish deadline elapsed")),
            },
            None => attempt.await,
        }
    }

    async fn publish_to(
        &self,
        state: &Arc<SubjectState>,
        payload: Bytes,
    ) -> Result<(), InvokeError> {
        match &state.policy {
            DeliveryPolicy::Unbuffered => {
                state.metrics.published.fetch_add(1, Ordering::Relaxed);
                self.inner.deliver_now(state, payload).await;
                Ok(())
            }
            DeliveryPolicy::Throttle {
                max_per_window,
                window,
                block,
            } => {
                self.admit_throttled(state, *max_per_window, *window, *block)
                    .await?;
                state.metrics.published.fetch_add(1, Ordering::Relaxed);
                self.inner.deliver_now(state, payload).await;
                Ok(())
            }
            DeliveryPolicy::DropOldest { .. }
            | DeliveryPolicy::DropNewest { .. }
            | DeliveryPolicy::Block { .. } => {
                let Some(buffer) = &state.buffer else {
                    return Err(InvokeError::new(
                        ErrorKind::StoreCorrupted,
                        "buffered subject has no queue",
                    ));
                };
                match buffer.post(payload).await {
                    Ok(PostOutcome::Accepted) | Ok(PostOutcome::Dropped(_)) => {
                        state.metrics.published.fetch_add(1, Ordering::Relaxed);
                        let depth = buffer.depth() as u64;
                        state.metrics.peak_depth.fetch_max(depth, Ordering::Relaxed);
                        Ok(())
                    }
                    Err(err @ PostError::Full { .. }) => Err(InvokeError::new(
                        ErrorKind::Throttled,
                        err.as_mailbox_error().to_string(),
                    )),
                    Err(PostError::Closed(_)) => Err(InvokeError::new(
                        ErrorKind::PeerShutdown,
                        "stream broker is shut down",
                    )),
                }
            }
        }
    }

    async fn admit_throttled(
        &self,
        state: &Arc<SubjectState>,
        max_per_window: u32,
        window: Duration,
        block: bool,
    ) -> Result<(), InvokeError> {
        loop {
            let wait = {
                let mut admitted = state.throttle_window.lock();
                let now = Instant::now();
                while admitted
                    .front()
                    .is_some_and(|&at| now.duration_since(at) >= window)
                {
                    admitted.pop_front();
                }
                if (admitted.len() as u32) < max_per_window {
                    admitted.push_back(now);
                    return Ok(());
                }
                let oldest = *admitted.front().unwrap_or(&now);
                window.saturating_sub(now.duration_since(oldest))
            };

            state.metrics.throttle_events.fetch_add(1, Ordering::Relaxed);
            if !block {
                return Err(InvokeError::new(
                    ErrorKind::Throttled,
                    format!("subject {} exceeded {max_per_window}/{window:?}", state.subject),
                )
                .with_retry_after(wait));
            }
            tokio::time::sleep(wait.max(Duration::from_millis(1))).await;
        }
    }

    /// Subscribe a callback to a subject.
    pub fn subscribe(&self, subject: StreamSubject, handler: SubscriberFn) -> SubscriptionHandle {
        self.subscribe_inner(subject, None, None, handler)
    }

    /// Subscribe with a payload filter.
    pub fn subscribe_filtered(
        &self,
        subject: StreamSubject,
        filter: SubscriberFilter,
        handler: SubscriberFn,
    ) -> SubscriptionHandle {
        self.subscribe_inner(subject, None, Some(filter), handler)
    }

    /// Subscribe on behalf of an activation; the subscription dies with it.
    pub fn subscribe_owned(
        &self,
        subject: StreamSubject,
        owner: ActorKey,
        handler: SubscriberFn,
    ) -> SubscriptionHandle {
        self.subscribe_inner(subject, Some(owner), None, handler)
    }

    fn subscribe_inner(
        &self,
        subject: StreamSubject,
        owner: Option<ActorKey>,
        filter: Option<SubscriberFilter>,
        handler: SubscriberFn,
    ) -> SubscriptionHandle {
        let state = self.inner.state_of(subject.clone(), None);
        let id = Uuid::new_v4();
        state.subscribers.write().push(Subscriber {
            id,
            owner,
            filter,
            handler,
        });
        SubscriptionHandle {
            subject,
            id,
            broker: Arc::downgrade(&self.inner),
        }
    }

    /// Drop every subscription owned by a deactivated consumer.
    pub fn drop_owner(&self, owner: &ActorKey) {
        for state in self.inner.subjects.iter() {
            state
                .subscribers
                .write()
                .retain(|sub| sub.owner.as_ref() != Some(owner));
        }
    }

    /// Stats for a subject, if it has been used.
    pub fn stats(&self, subject: &StreamSubject) -> Option<SubjectStats> {
        self.inner.subjects.get(subject).map(|state| {
            let dropped = state
                .buffer
                .as_ref()
                .map(|buffer| buffer.metrics().dropped_count())
                .unwrap_or(0);
            SubjectStats {
                published: state.metrics.published.load(Ordering::Relaxed),
                dropped,
                throttle_events: state.metrics.throttle_events.load(Ordering::Relaxed),
                current_depth: state
                    .buffer
                    .as_ref()
                    .map(|buffer| buffer.depth())
                    .unwrap_or(0),
                peak_depth: state.metrics.peak_depth.load(Ordering::Relaxed),
            }
        })
    }

    /// Close all subject buffers and stop their workers.
    pub async fn stop(&self) {
        let mut workers = Vec::new();
        for state in self.inner.subjects.iter() {
            if let Some(buffer) = &state.buffer {
                buffer.close();
            }
            if let Some(worker) = state.worker.lock().take() {
                workers.push(worker);
            }
        }
        for worker in workers {
            let _ = worker.await;
        }
    }
}

impl std::fmt::Debug for StreamBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamBroker")
            .field("subjects", &self.inner.subjects.len())
            .finish()
    }
}

impl BrokerInner {
    fn state_of(
        self: &Arc<Self>,
        subject: StreamSubject,
        policy: Option<DeliveryPolicy>,
    ) -> Arc<SubjectState> {
        if let Some(existing) = self.subjects.get(&subject) {
            return Arc::clone(&existing);
        }

        let policy = policy.unwrap_or(self.default_policy);
        let entry = self
            .subjects
            .entry(subject.clone())
            .or_insert_with(|| self.build_state(subject, policy));
        Arc::clone(&entry)
    }

    fn build_state(self: &Arc<Self>, subject: StreamSubject, policy: DeliveryPolicy) -> Arc<SubjectState> {
        let (buffer_sender, worker) = match policy.buffer() {
            Some(capacity) => {
                let overflow = match policy {
                    DeliveryPolicy::DropOldest { .. } => OverflowPolicy::DropOldest,
                    DeliveryPolicy::DropNewest { .. } => OverflowPolicy::DropNewest,
                    _ => OverflowPolicy::Block,
                };
                let (receiver, sender) = bounded::<Bytes>(capacity, overflow);
                (Some(sender), Some(receiver))
            }
            None => (None, None),
        };

        let state = Arc::new(SubjectState {
            subject: subject.clone(),
            policy,
            subscribers: RwLock::new(Vec::new()),
            metrics: SubjectMetrics::default(),
            buffer: buffer_sender,
            worker: Mutex::new(None),
            throttle_window: Mutex::new(VecDeque::new()),
        });

        if let Some(mut receiver) = worker {
            let broker = Arc::clone(self);
            let worker_state = Arc::clone(&state);
            let handle = tokio::spawn(async move {
                while let Some(payload) = receiver.recv().await {
                    broker.deliver_now(&worker_state, payload).await;
                }
            });
            *state.worker.lock() = Some(handle);
            debug!(subject = %state.subject, ?policy, "subject buffer worker started");
        }

        state
    }

    /// Fan one payload out to explicit subscribers and implicit consumers.
    async fn deliver_now(&self, state: &Arc<SubjectState>, payload: Bytes) {
        let handlers: Vec<(Option<SubscriberFilter>, SubscriberFn)> = {
            let subscribers = state.subscribers.read();
            subscribers
                .iter()
                .map(|sub| (sub.filter.clone(), Arc::clone(&sub.handler)))
                .collect()
        };

        // Serial delivery preserves per-publisher order for every subscriber.
        for (filter, handler) in handlers {
            if filter.as_ref().is_some_and(|filter| !filter(&payload)) {
                continue;
            }
            self.telemetry
                .record(TelemetryEvent::now(names::STREAM_CONSUME));
            handler(state.subject.clone(), payload.clone()).await;
        }

        let consumers = self.registry.stream_consumers(state.subject.namespace());
        if consumers.is_empty() {
            return;
        }
        let Some(delivery) = self.delivery.get() else {
            warn!(subject = %state.subject, "no consumer-delivery route wired");
            return;
        };
        for descriptor in consumers {
            let consumer = ActorKey::new(descriptor.type_name(), state.subject.key());
            if let Err(err) = delivery
                .deliver(consumer.clone(), state.subject.clone(), payload.clone())
                .await
            {
                let record =
                    Envelope::stream(consumer.clone(), state.subject.clone(), payload.clone())
                        .record();
                self.dlq
                    .push(record, consumer, format!("stream delivery failed: {err}"));
            }
        }
    }
}

/// Handle for one explicit subscription.
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    subject: StreamSubject,
    id: Uuid,
    broker: Weak<BrokerInner>,
}

impl SubscriptionHandle {
    /// The subscribed subject.
    pub fn subject(&self) -> &StreamSubject {
        &self.subject
    }

    /// Remove the subscription; later messages are no longer delivered.
    pub fn unsubscribe(&self) {
        if let Some(broker) = self.broker.upgrade() {
            if let Some(state) = broker.subjects.get(&self.subject) {
                state.subscribers.write().retain(|sub| sub.id != self.id);
            }
        }
    }
}
