//! Per-invocation context handed to actor handlers.

// Layer 1: Standard library imports
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

// Layer 3: Internal module imports
use crate::codec::{self, Codec};
use crate::error::InvokeError;
use crate::message::CallChain;
use crate::monitoring::Telemetry;
use crate::reminder::Reminder;
use crate::state::StateCell;
use crate::storage::StateStore;
use crate::stream::StreamSubject;
use crate::util::{ActorKey, SiloId};

/// Per-call knobs for outgoing invocations.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Overall deadline for the call; the silo default applies when unset.
    pub timeout: Option<Duration>,
    /// Marks the call safe to retry across owners on unreachable/timeout.
    pub idempotent: bool,
    /// Overrides the gateway retry budget for transient errors.
    pub retry_budget: Option<usize>,
}

impl CallOptions {
    /// Options for an idempotent call.
    pub fn idempotent() -> Self {
        Self {
            idempotent: true,
            ..Self::default()
        }
    }

    /// Builder method: set the call deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Runtime services the context exposes to actor code.
///
/// Implemented by the hosting silo; the indirection keeps activations free of
/// owning references back into the host (supervisors and callees are reached
/// by [`ActorKey`] identity only).
#[async_trait]
pub trait RuntimeEnv: Send + Sync + Debug {
    /// The hosting silo.
    fn silo_id(&self) -> &SiloId;

    /// Durable state store.
    fn state_store(&self) -> Arc<dyn StateStore>;

    /// Payload codec.
    fn codec(&self) -> Arc<dyn Codec>;

    /// Telemetry sink.
    fn telemetry(&self) -> Arc<dyn Telemetry>;

    /// Invoke a method on another actor, propagating the call chain.
    async fn call(
        &self,
        chain: CallChain,
        target: ActorKey,
        method: &str,
        args: Bytes,
        options: CallOptions,
    ) -> Result<Bytes, InvokeError>;

    /// Register (or replace) a durable reminder.
    async fn register_reminder(&self, reminder: Reminder) -> Result<(), InvokeError>;

    /// Remove a reminder; returns whether it existed.
    async fn unregister_reminder(&self, actor: &ActorKey, name: &str)
        -> Result<bool, InvokeError>;

    /// Publish a payload on a stream subject.
    async fn publish(&self, subject: StreamSubject, payload: Bytes) -> Result<(), InvokeError>;

    /// Record `supervisor` as the supervisor of `actor`.
    fn set_supervisor(&self, actor: &ActorKey, supervisor: ActorKey);
}

/// Context for one handler invocation.
///
/// Created by the dispatcher per envelope; the call chain it carries is the
/// incoming chain extended with this actor, so every outgoing call is guarded
/// against re-entry.
pub struct ActivationContext {
    key: ActorKey,
    env: Arc<dyn RuntimeEnv>,
    chain: CallChain,
}

impl ActivationContext {
    /// Create a context for `key` with the chain its handlers will call with.
    pub fn new(key: ActorKey, env: Arc<dyn RuntimeEnv>, chain: CallChain) -> Self {
        Self { key, env, chain }
    }

    /// This activation's key.
    pub fn key(&self) -> &ActorKey {
        &self.key
    }

    /// The hosting silo.
    pub fn silo_id(&self) -> &SiloId {
        self.env.silo_id()
    }

    /// The call chain outgoing invocations will carry.
    pub fn chain(&self) -> &CallChain {
        &self.chain
    }

    /// The payload codec.
    pub fn codec(&self) -> Arc<dyn Codec> {
        self.env.codec()
    }

    /// A typed handle to one named state record of this actor.
    pub fn state<T: Serialize + DeserializeOwned>(&self, name: &str) -> StateCell<T> {
        StateCell::new(
            self.key.clone(),
            name,
            self.env.state_store(),
            self.env.codec(),
            self.env.telemetry(),
        )
    }

    /// Call a method on another actor with default options.
    pub async fn call<Req, Resp>(
        &self,
        target: ActorKey,
        method: &str,
        args: &Req,
    ) -> Result<Resp, InvokeError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        self.call_with(target, method, args, CallOptions::default())
            .await
    }

    /// Call a method on another actor with explicit options.
    pub async fn call_with<Req, Resp>(
        &self,
        target: ActorKey,
        method: &str,
        args: &Req,
        options: CallOptions,
    ) -> Result<Resp, InvokeError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let codec = self.env.codec();
        let payload = codec::encode(codec.as_ref(), args)?;
        let response = self
            .env
            .call(self.chain.clone(), target, method, payload, options)
            .await?;
        codec::decode(codec.as_ref(), &response)
    }

    /// Register a periodic reminder for this actor.
    ///
    /// A zero period makes it one-shot. Replaces any reminder with the same
    /// name.
    pub async fn register_reminder(
        &self,
        name: &str,
        due_time: DateTime<Utc>,
        period: Duration,
    ) -> Result<(), InvokeError> {
        self.env
            .register_reminder(Reminder::periodic(self.key.clone(), name, due_time, period))
            .await
    }

    /// Remove one of this actor's reminders; returns whether it existed.
    pub async fn unregister_reminder(&self, name: &str) -> Result<bool, InvokeError> {
        self.env.unregister_reminder(&self.key, name).await
    }

    /// Publish a typed event on a stream subject.
    pub async fn publish<E: Serialize + Sync>(
        &self,
        subject: StreamSubject,
        event: &E,
    ) -> Result<(), InvokeError> {
        let payload = codec::encode(self.env.codec().as_ref(), event)?;
        self.env.publish(subject, payload).await
    }

    /// Declare `supervisor` as this activation's supervisor.
    ///
    /// Typically called from the activation hook. The link is held by key;
    /// the supervisor is resolved through the activation manager when a
    /// failure escalates.
    pub fn set_supervisor(&self, supervisor: ActorKey) {
        self.env.set_supervisor(&self.key, supervisor);
    }
}

impl Debug for ActivationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivationContext")
            .field("key", &self.key)
            .field("silo", self.env.silo_id())
            .field("chain_depth", &self.chain.depth())
            .finish()
    }
}
