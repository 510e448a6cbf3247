//! The silo host: wires ring, membership, activations, reminders, streams,
//! transport, and the client gateway into one process-level component.

// Layer 1: Standard library imports
use std::sync::{Arc, Weak};

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

// Layer 3: Internal module imports
use super::config::SiloConfig;
use crate::activation::{ActivationDefaults, ActivationManager};
use crate::actor::{ActorTypeRegistry, CallOptions, RuntimeEnv};
use crate::client::{ClientConfig, ClusterClient};
use crate::codec::{Codec, JsonCodec};
use crate::error::{ErrorKind, InvokeError};
use crate::mailbox::DeadLetterQueue;
use crate::membership::{traits::active_silos, Membership, MembershipError, SiloInfo};
use crate::message::{CallChain, DeadlineExt, Envelope, Operation};
use crate::monitoring::{NoopTelemetry, Telemetry};
use crate::reminder::{Reminder, ReminderService, ReminderServiceConfig};
use crate::ring::RingState;
use crate::storage::{ReminderStore, StateStore};
use crate::stream::{ConsumerDelivery, StreamBroker, StreamSubject};
use crate::transport::{
    InboundHandler, Transport, WireRequest, WireResponse, FLAG_STREAM_EVENT,
};
use crate::util::{ActorKey, CorrelationId, MessageId, SiloId};

/// Silo lifecycle errors.
#[derive(Debug, Error)]
pub enum SiloError {
    /// A required component was not supplied to the builder.
    #[error("Missing component: {0}")]
    MissingComponent(&'static str),

    /// Configuration validation failed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Membership provider error.
    #[error("Membership error: {0}")]
    Membership(#[from] MembershipError),

    /// Transport error during start/stop.
    #[error("Transport error: {0}")]
    Transport(#[from] InvokeError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SiloState {
    Created,
    Running,
    Stopped,
}

/// One process hosting a subset of the cluster's activations.
pub struct Silo {
    inner: Arc<SiloInner>,
}

pub(crate) struct SiloInner {
    config: SiloConfig,
    info: SiloInfo,
    registry: Arc<ActorTypeRegistry>,
    membership: Arc<dyn Membership>,
    transport: Arc<dyn Transport>,
    state_store: Arc<dyn StateStore>,
    reminder_store: Arc<dyn ReminderStore>,
    codec: Arc<dyn Codec>,
    telemetry: Arc<dyn Telemetry>,
    ring: Arc<RingState>,
    dlq: Arc<DeadLetterQueue>,
    manager: Arc<ActivationManager>,
    reminders: Arc<ReminderService>,
    streams: Arc<StreamBroker>,
    client: ClusterClient,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    shutdown: watch::Sender<bool>,
    state: Mutex<SiloState>,
}

impl Silo {
    /// Create a builder.
    pub fn builder() -> SiloBuilder {
        SiloBuilder::default()
    }

    /// This silo's id.
    pub fn id(&self) -> &SiloId {
        &self.inner.info.id
    }

    /// A client gateway bound to this silo's placement view.
    pub fn client(&self) -> ClusterClient {
        self.inner.client.clone()
    }

    /// The stream broker.
    pub fn streams(&self) -> Arc<StreamBroker> {
        Arc::clone(&self.inner.streams)
    }

    /// The dead-letter queue.
    pub fn dead_letters(&self) -> Arc<DeadLetterQueue> {
        Arc::clone(&self.inner.dlq)
    }

    /// The activation manager (diagnostics and tests).
    pub fn activations(&self) -> Arc<ActivationManager> {
        Arc::clone(&self.inner.manager)
    }

    /// The actor-type registry this silo serves.
    pub fn registry(&self) -> Arc<ActorTypeRegistry> {
        Arc::clone(&self.inner.registry)
    }

    /// Register a durable reminder without going through an actor context.
    pub async fn register_reminder(&self, reminder: Reminder) -> Result<(), InvokeError> {
        self.inner
            .reminder_store
            .upsert(reminder)
            .await
            .map_err(Into::into)
    }

    /// Join the cluster and start serving.
    pub async fn start(&self) -> Result<(), SiloError> {
        {
            let mut state = self.inner.state.lock();
            if *state == SiloState::Running {
                return Ok(());
            }
            *state = SiloState::Running;
        }

        let inner = &self.inner;
        info!(silo = %inner.info.id, "silo starting");

        inner.transport.bind(Arc::new(SiloHandler {
            inner: Arc::downgrade(&self.inner),
        }));
        inner.transport.start().await?;

        inner.membership.join(inner.info.clone()).await?;
        let silos = active_silos(inner.membership.as_ref()).await;
        inner.ring.publish(&silos);

        // Heartbeat loop.
        {
            let membership = Arc::clone(&inner.membership);
            let silo = inner.info.id.clone();
            let interval = inner.config.heartbeat_interval;
            let mut shutdown = inner.shutdown.subscribe();
            self.spawn_task(async move {
                loop {
                    if *shutdown.borrow() {
                        break;
                    }
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        _ = tokio::time::sleep(interval) => {
                            if let Err(err) = membership.beat(&silo).await {
                                warn!(silo = %silo, error = %err, "heartbeat failed");
                            }
                        }
                    }
                }
            });
        }

        // Membership listener: republish the ring and drain moved keys.
        {
            let weak = Arc::downgrade(&self.inner);
            let mut events = inner.membership.subscribe();
            let mut shutdown = inner.shutdown.subscribe();
            self.spawn_task(async move {
                loop {
                    if *shutdown.borrow() {
                        break;
                    }
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        event = events.recv() => {
                            if event.is_err() && !matches!(
                                event,
                                Err(tokio::sync::broadcast::error::RecvError::Lagged(_))
                            ) {
                                break;
                            }
                            let Some(inner) = weak.upgrade() else { break };
                            let silos = active_silos(inner.membership.as_ref()).await;
                            debug!(silo = %inner.info.id, active = silos.len(), "membership changed, rebuilding ring");
                            inner.ring.publish(&silos);
                            inner.manager.drain_not_owned();
                        }
                    }
                }
            });
        }

        // Idle-collection sweep.
        {
            let weak = Arc::downgrade(&self.inner);
            let interval = inner.config.collection_interval;
            let mut shutdown = inner.shutdown.subscribe();
            self.spawn_task(async move {
                loop {
                    if *shutdown.borrow() {
                        break;
                    }
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        _ = tokio::time::sleep(interval) => {
                            let Some(inner) = weak.upgrade() else { break };
                            inner.manager.collect_idle();
                        }
                    }
                }
            });
        }

        inner.reminders.start();
        info!(silo = %inner.info.id, "silo started");
        Ok(())
    }

    /// Leave the cluster and stop. With `drain`, queued envelopes finish.
    pub async fn stop(&self, drain: bool) -> Result<(), SiloError> {
        {
            let mut state = self.inner.state.lock();
            if *state != SiloState::Running {
                return Ok(());
            }
            *state = SiloState::Stopped;
        }

        let inner = &self.inner;
        info!(silo = %inner.info.id, drain, "silo stopping");

        if let Err(err) = inner.membership.leave(&inner.info.id).await {
            warn!(silo = %inner.info.id, error = %err, "leave failed");
        }

        let _ = inner.shutdown.send(true);
        let tasks: Vec<JoinHandle<()>> = inner.tasks.lock().drain(..).collect();
        for task in tasks {
            let _ = task.await;
        }

        inner.reminders.stop().await;
        inner
            .manager
            .stop(drain, inner.config.shutdown_timeout)
            .await;
        inner.streams.stop().await;
        inner.transport.stop(drain).await?;

        info!(silo = %inner.info.id, "silo stopped");
        Ok(())
    }

    /// Abandon the cluster without draining (crash simulation in tests).
    pub async fn kill(&self) {
        {
            let mut state = self.inner.state.lock();
            if *state != SiloState::Running {
                return;
            }
            *state = SiloState::Stopped;
        }
        let inner = &self.inner;
        let _ = inner.shutdown.send(true);
        let tasks: Vec<JoinHandle<()>> = inner.tasks.lock().drain(..).collect();
        for task in tasks {
            task.abort();
        }
        inner.reminders.stop().await;
        inner
            .manager
            .stop(false, std::time::Duration::from_millis(100))
            .await;
        let _ = inner.transport.stop(false).await;
    }

    fn spawn_task(&self, future: impl std::future::Future<Output = ()> + Send + 'static) {
        self.inner.tasks.lock().push(tokio::spawn(future));
    }
}

impl std::fmt::Debug for Silo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Silo")
            .field("id", &self.inner.info.id)
            .field("state", &*self.inner.state.lock())
            .finish()
    }
}

/// Builder assembling a silo from its collaborators.
#[derive(Default)]
pub struct SiloBuilder {
    id: Option<SiloId>,
    config: Option<SiloConfig>,
    registry: Option<Arc<ActorTypeRegistry>>,
    membership: Option<Arc<dyn Membership>>,
    transport: Option<Arc<dyn Transport>>,
    state_store: Option<Arc<dyn StateStore>>,
    reminder_store: Option<Arc<dyn ReminderStore>>,
    codec: Option<Arc<dyn Codec>>,
    telemetry: Option<Arc<dyn Telemetry>>,
}

impl SiloBuilder {
    /// Set the silo id (random if unset).
    pub fn with_id(mut self, id: SiloId) -> Self {
        self.id = Some(id);
        self
    }

    /// Set the configuration (defaults if unset).
    pub fn with_config(mut self, config: SiloConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the actor-type registry (required).
    pub fn with_registry(mut self, registry: Arc<ActorTypeRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Set the membership provider (required).
    pub fn with_membership(mut self, membership: Arc<dyn Membership>) -> Self {
        self.membership = Some(membership);
        self
    }

    /// Set the transport (required).
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Set the state store (required).
    pub fn with_state_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.state_store = Some(store);
        self
    }

    /// Set the reminder store (required).
    pub fn with_reminder_store(mut self, store: Arc<dyn ReminderStore>) -> Self {
        self.reminder_store = Some(store);
        self
    }

    /// Set the codec (JSON if unset).
    pub fn with_codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Set the telemetry sink (noop if unset).
    pub fn with_telemetry(mut self, telemetry: Arc<dyn Telemetry>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Assemble the silo.
    pub fn build(self) -> Result<Silo, SiloError> {
        let config = self.config.unwrap_or_default();
        config.validate().map_err(SiloError::Config)?;

        let id = self.id.unwrap_or_else(SiloId::random);
        let registry = self
            .registry
            .ok_or(SiloError::MissingComponent("registry"))?;
        let membership = self
            .membership
            .ok_or(SiloError::MissingComponent("membership"))?;
        let transport = self
            .transport
            .ok_or(SiloError::MissingComponent("transport"))?;
        let state_store = self
            .state_store
            .ok_or(SiloError::MissingComponent("state_store"))?;
        let reminder_store = self
            .reminder_store
            .ok_or(SiloError::MissingComponent("reminder_store"))?;
        let codec = self.codec.unwrap_or_else(|| Arc::new(JsonCodec));
        let telemetry = self
            .telemetry
            .unwrap_or_else(|| Arc::new(NoopTelemetry));

        let info = SiloInfo::active(id.clone(), format!("local:{id}"));
        let ring = Arc::new(RingState::new(config.virtual_nodes));
        let dlq = Arc::new(DeadLetterQueue::new(config.dlq_capacity));

        let manager = Arc::new(ActivationManager::new(
            id.clone(),
            Arc::clone(&registry),
            Arc::clone(&ring),
            Arc::clone(&dlq),
            Arc::clone(&telemetry),
            ActivationDefaults {
                mailbox_capacity: config.mailbox_capacity,
                overflow: config.overflow,
                idle_ttl: config.idle_ttl,
            },
        ));

        let reminders = ReminderService::new(
            id.clone(),
            Arc::clone(&reminder_store),
            Arc::clone(&ring),
            Arc::clone(&manager),
            Arc::clone(&telemetry),
            ReminderServiceConfig {
                tick_interval: config.reminder_interval,
            },
        );

        let streams = StreamBroker::new(
            Arc::clone(&registry),
            Arc::clone(&dlq),
            Arc::clone(&telemetry),
            config.stream_default_policy,
        );

        let client = ClusterClient::for_silo(
            Arc::clone(&ring),
            Arc::clone(&membership),
            Arc::clone(&transport),
            Arc::clone(&codec),
            Arc::clone(&telemetry),
            ClientConfig {
                retry_budget: config.retry_budget,
                default_timeout: config.default_call_timeout,
                ..ClientConfig::default()
            },
        );

        let inner = Arc::new(SiloInner {
            config,
            info,
            registry,
            membership,
            transport,
            state_store,
            reminder_store,
            codec,
            telemetry,
            ring,
            dlq,
            manager,
            reminders,
            streams,
            client,
            tasks: Mutex::new(Vec::new()),
            shutdown: watch::channel(false).0,
            state: Mutex::new(SiloState::Created),
        });

        // Late wiring: contexts, consumer delivery, and subscription cleanup
        // hold weak references back into the silo to avoid ownership cycles.
        inner.manager.set_env(Arc::new(SiloEnv {
            silo: inner.info.id.clone(),
            state_store: Arc::clone(&inner.state_store),
            codec: Arc::clone(&inner.codec),
            telemetry: Arc::clone(&inner.telemetry),
            inner: Arc::downgrade(&inner),
        }));
        inner.streams.set_consumer_delivery(Arc::new(SiloDelivery {
            inner: Arc::downgrade(&inner),
        }));
        {
            let streams = Arc::downgrade(&inner.streams);
            inner
                .manager
                .set_deactivation_listener(Arc::new(move |key: &ActorKey| {
                    if let Some(streams) = streams.upgrade() {
                        streams.drop_owner(key);
                    }
                }));
        }

        Ok(Silo { inner })
    }
}

/// Inbound transport handler: wire request → envelope → mailbox → response.
struct SiloHandler {
    inner: Weak<SiloInner>,
}

#[async_trait]
impl InboundHandler for SiloHandler {
    async fn handle(&self, request: WireRequest) -> WireResponse {
        let correlation_id = request.correlation_id;
        match self.handle_inner(request).await {
            Ok(payload) => WireResponse::ok(correlation_id, payload),
            Err(error) => WireResponse::error(correlation_id, &error),
        }
    }
}

impl SiloHandler {
    async fn handle_inner(&self, request: WireRequest) -> Result<Bytes, InvokeError> {
        let inner = self.inner.upgrade().ok_or_else(|| {
            InvokeError::new(ErrorKind::PeerShutdown, "silo is gone")
        })?;

        let key = ActorKey::new(request.actor_type.clone(), request.actor_id.clone());
        let operation = if request.flags & FLAG_STREAM_EVENT != 0 {
            Operation::Stream {
                subject: StreamSubject::new(request.method.clone(), request.actor_id.clone()),
            }
        } else {
            Operation::Call {
                method: request.method.clone(),
            }
        };

        let deadline = request.deadline();
        let (reply_tx, reply_rx) = oneshot::channel();
        let envelope = Envelope {
            message_id: MessageId::new(),
            correlation_id: request.correlation_id,
            sender: None,
            recipient: key,
            operation,
            payload: request.args,
            reply: Some(reply_tx),
            deadline,
            trace: request.trace,
            attempt: 1,
            chain: CallChain::from_keys(request.chain),
            enqueued_at: Utc::now(),
        };

        inner.manager.post(envelope).await?;

        let wait = deadline
            .and_then(|d| d.remaining(Utc::now()))
            .unwrap_or(inner.config.default_call_timeout);
        match tokio::time::timeout(wait, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(InvokeError::new(
                ErrorKind::SupervisionTerminated,
                "activation dropped the request",
            )),
            Err(_) => Err(InvokeError::timeout("no response within deadline")),
        }
    }
}

/// Runtime services exposed to actor contexts; weak to avoid cycles.
struct SiloEnv {
    silo: SiloId,
    state_store: Arc<dyn StateStore>,
    codec: Arc<dyn Codec>,
    telemetry: Arc<dyn Telemetry>,
    inner: Weak<SiloInner>,
}

impl std::fmt::Debug for SiloEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SiloEnv").field("silo", &self.silo).finish()
    }
}

impl SiloEnv {
    fn upgrade(&self) -> Result<Arc<SiloInner>, InvokeError> {
        self.inner
            .upgrade()
            .ok_or_else(|| InvokeError::new(ErrorKind::PeerShutdown, "silo is gone"))
    }
}

#[async_trait]
impl RuntimeEnv for SiloEnv {
    fn silo_id(&self) -> &SiloId {
        &self.silo
    }

    fn state_store(&self) -> Arc<dyn StateStore> {
        Arc::clone(&self.state_store)
    }

    fn codec(&self) -> Arc<dyn Codec> {
        Arc::clone(&self.codec)
    }

    fn telemetry(&self) -> Arc<dyn Telemetry> {
        Arc::clone(&self.telemetry)
    }

    async fn call(
        &self,
        chain: CallChain,
        target: ActorKey,
        method: &str,
        args: Bytes,
        options: CallOptions,
    ) -> Result<Bytes, InvokeError> {
        let inner = self.upgrade()?;
        inner
            .client
            .invoke_raw(&target, method, args, chain, options)
            .await
    }

    async fn register_reminder(&self, reminder: Reminder) -> Result<(), InvokeError> {
        let inner = self.upgrade()?;
        inner
            .reminder_store
            .upsert(reminder)
            .await
            .map_err(Into::into)
    }

    async fn unregister_reminder(
        &self,
        actor: &ActorKey,
        name: &str,
    ) -> Result<bool, InvokeError> {
        let inner = self.upgrade()?;
        inner
            .reminder_store
            .remove(actor, name)
            .await
            .map_err(Into::into)
    }

    async fn publish(&self, subject: StreamSubject, payload: Bytes) -> Result<(), InvokeError> {
        let inner = self.upgrade()?;
        inner.streams.publish(&subject, payload, None).await
    }

    fn set_supervisor(&self, actor: &ActorKey, supervisor: ActorKey) {
        if let Some(inner) = self.inner.upgrade() {
            inner.manager.set_supervisor(actor, supervisor);
        }
    }
}

/// Routes stream events into consumer mailboxes, locally or over the wire.
struct SiloDelivery {
    inner: Weak<SiloInner>,
}

impl std::fmt::Debug for SiloDelivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SiloDelivery").finish()
    }
}

#[async_trait]
impl ConsumerDelivery for SiloDelivery {
    async fn deliver(
        &self,
        consumer: ActorKey,
        subject: StreamSubject,
        payload: Bytes,
    ) -> Result<(), InvokeError> {
        let inner = self.inner.upgrade().ok_or_else(|| {
            InvokeError::new(ErrorKind::PeerShutdown, "silo is gone")
        })?;

        let deadline = Utc::now()
            + chrono::Duration::from_std(inner.config.default_call_timeout)
                .unwrap_or_else(|_| chrono::Duration::seconds(30));

        if inner.manager.is_local_owner(&consumer) {
            let (reply_tx, reply_rx) = oneshot::channel();
            let envelope = Envelope::stream(consumer, subject, payload)
                .with_reply(reply_tx)
                .with_deadline(deadline);
            inner.manager.post(envelope).await?;
            match tokio::time::timeout(inner.config.default_call_timeout, reply_rx).await {
                Ok(Ok(result)) => result.map(|_| ()),
                Ok(Err(_)) => Err(InvokeError::new(
                    ErrorKind::SupervisionTerminated,
                    "consumer dropped the event",
                )),
                Err(_) => Err(InvokeError::timeout("consumer did not finish in time")),
            }
        } else {
            let owner = inner.ring.owner(&consumer).ok_or_else(|| {
                InvokeError::new(ErrorKind::RingRefresh, "placement ring is empty")
            })?;
            let request = WireRequest {
                correlation_id: CorrelationId::new(),
                deadline_ms: deadline.timestamp_millis().max(0) as u64,
                flags: FLAG_STREAM_EVENT,
                trace: Bytes::new(),
                actor_type: consumer.type_name().to_string(),
                actor_id: consumer.id().to_string(),
                method: subject.namespace().to_string(),
                chain: Vec::new(),
                args: payload,
            };
            let response = inner.transport.invoke(&owner, request).await?;
            response.into_result().map(|_| ())
        }
    }
}
