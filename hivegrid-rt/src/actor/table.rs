//! Method tables and the type-erased activation bodies built from them.
//!
//! Dispatch from a string method name goes through a table built once at
//! registration; nothing is reflected at call time. Non-re-entrant actors
//! run exclusive handlers (`&mut A`, strictly serial); re-entrant actors run
//! shared handlers (`&A`, interleaved up to a fan-out cap) and manage
//! interior mutability themselves.
//!
//! Handlers are erased behind small object-safe traits with blanket impls
//! rather than `dyn Fn` aliases, so plain `fn` items with borrowed-future
//! signatures register without higher-ranked inference gymnastics.

// Layer 1: Standard library imports
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;

// Layer 3: Internal module imports
use super::context::ActivationContext;
use super::error::ActorError;
use crate::codec;
use crate::error::{ErrorKind, InvokeError};
use crate::message::Operation;
use crate::reminder::ReminderTick;
use crate::stream::StreamSubject;

/// Future returned by actor handlers; borrows the actor for its lifetime.
pub type MethodFuture<'a, T> = BoxFuture<'a, Result<T, ActorError>>;

// ---------------------------------------------------------------------------
// Erased handler traits (object-safe) with blanket impls over the matching
// borrowed-future `Fn` signatures.
// ---------------------------------------------------------------------------

pub(crate) trait ExclusiveMethod<A>: Send + Sync {
    fn call<'a>(
        &'a self,
        actor: &'a mut A,
        ctx: &'a ActivationContext,
        payload: Bytes,
    ) -> MethodFuture<'a, Bytes>;
}

pub(crate) trait SharedMethod<A>: Send + Sync {
    fn call<'a>(
        &'a self,
        actor: &'a A,
        ctx: &'a ActivationContext,
        payload: Bytes,
    ) -> MethodFuture<'a, Bytes>;
}

pub(crate) trait ExclusiveHook<A>: Send + Sync {
    fn call<'a>(&'a self, actor: &'a mut A, ctx: &'a ActivationContext) -> MethodFuture<'a, ()>;
}

impl<A, H> ExclusiveHook<A> for H
where
    H: for<'a> Fn(&'a mut A, &'a ActivationContext) -> MethodFuture<'a, ()> + Send + Sync,
{
    fn call<'a>(&'a self, actor: &'a mut A, ctx: &'a ActivationContext) -> MethodFuture<'a, ()> {
        self(actor, ctx)
    }
}

pub(crate) trait SharedHook<A>: Send + Sync {
    fn call<'a>(&'a self, actor: &'a A, ctx: &'a ActivationContext) -> MethodFuture<'a, ()>;
}

impl<A, H> SharedHook<A> for H
where
    H: for<'a> Fn(&'a A, &'a ActivationContext) -> MethodFuture<'a, ()> + Send + Sync,
{
    fn call<'a>(&'a self, actor: &'a A, ctx: &'a ActivationContext) -> MethodFuture<'a, ()> {
        self(actor, ctx)
    }
}

pub(crate) trait ExclusiveReminderHandler<A>: Send + Sync {
    fn call<'a>(
        &'a self,
        actor: &'a mut A,
        ctx: &'a ActivationContext,
        tick: ReminderTick,
    ) -> MethodFuture<'a, ()>;
}

impl<A, H> ExclusiveReminderHandler<A> for H
where
    H: for<'a> Fn(&'a mut A, &'a ActivationContext, ReminderTick) -> MethodFuture<'a, ()>
        + Send
        + Sync,
{
    fn call<'a>(
        &'a self,
        actor: &'a mut A,
        ctx: &'a ActivationContext,
        tick: ReminderTick,
    ) -> MethodFuture<'a, ()> {
        self(actor, ctx, tick)
    }
}

pub(crate) trait SharedReminderHandler<A>: Send + Sync {
    fn call<'a>(
        &'a self,
        actor: &'a A,
        ctx: &'a ActivationContext,
        tick: ReminderTick,
    ) -> MethodFuture<'a, ()>;
}

impl<A, H> SharedReminderHandler<A> for H
where
    H: for<'a> Fn(&'a A, &'a ActivationContext, ReminderTick) -> MethodFuture<'a, ()>
        + Send
        + Sync,
{
    fn call<'a>(
        &'a self,
        actor: &'a A,
        ctx: &'a ActivationContext,
        tick: ReminderTick,
    ) -> MethodFuture<'a, ()> {
        self(actor, ctx, tick)
    }
}

pub(crate) trait ExclusiveStreamHandler<A>: Send + Sync {
    fn call<'a>(
        &'a self,
        actor: &'a mut A,
        ctx: &'a ActivationContext,
        subject: StreamSubject,
        payload: Bytes,
    ) -> MethodFuture<'a, ()>;
}

impl<A, H> ExclusiveStreamHandler<A> for H
where
    H: for<'a> Fn(
            &'a mut A,
            &'a ActivationContext,
            StreamSubject,
            Bytes,
        ) -> MethodFuture<'a, ()>
        + Send
        + Sync,
{
    fn call<'a>(
        &'a self,
        actor: &'a mut A,
        ctx: &'a ActivationContext,
        subject: StreamSubject,
        payload: Bytes,
    ) -> MethodFuture<'a, ()> {
        self(actor, ctx, subject, payload)
    }
}

pub(crate) trait SharedStreamHandler<A>: Send + Sync {
    fn call<'a>(
        &'a self,
        actor: &'a A,
        ctx: &'a ActivationContext,
        subject: StreamSubject,
        payload: Bytes,
    ) -> MethodFuture<'a, ()>;
}

impl<A, H> SharedStreamHandler<A> for H
where
    H: for<'a> Fn(&'a A, &'a ActivationContext, StreamSubject, Bytes) -> MethodFuture<'a, ()>
        + Send
        + Sync,
{
    fn call<'a>(
        &'a self,
        actor: &'a A,
        ctx: &'a ActivationContext,
        subject: StreamSubject,
        payload: Bytes,
    ) -> MethodFuture<'a, ()> {
        self(actor, ctx, subject, payload)
    }
}

// ---------------------------------------------------------------------------
// Typed adapters: decode the request, run the user handler, encode the reply.
// ---------------------------------------------------------------------------

pub(crate) struct ExclusiveCall<Req, Resp, H> {
    pub(crate) handler: H,
    pub(crate) _marker: PhantomData<fn() -> (Req, Resp)>,
}

impl<A, Req, Resp, H> ExclusiveMethod<A> for ExclusiveCall<Req, Resp, H>
where
    A: Send + 'static,
    Req: DeserializeOwned + Send + 'static,
    Resp: Serialize + Send + 'static,
    H: for<'a> Fn(&'a mut A, &'a ActivationContext, Req) -> MethodFuture<'a, Resp>
        + Send
        + Sync
        + 'static,
{
    fn call<'a>(
        &'a self,
        actor: &'a mut A,
        ctx: &'a ActivationContext,
        payload: Bytes,
    ) -> MethodFuture<'a, Bytes> {
        Box::pin(async move {
            let req: Req = codec::decode(ctx.codec().as_ref(), &payload)?;
            let resp = (self.handler)(actor, ctx, req).await?;
            Ok(codec::encode(ctx.codec().as_ref(), &resp)?)
        })
    }
}

pub(crate) struct SharedCall<Req, Resp, H> {
    pub(crate) handler: H,
    pub(crate) _marker: PhantomData<fn() -> (Req, Resp)>,
}

impl<A, Req, Resp, H> SharedMethod<A> for SharedCall<Req, Resp, H>
where
    A: Send + Sync + 'static,
    Req: DeserializeOwned + Send + 'static,
    Resp: Serialize + Send + 'static,
    H: for<'a> Fn(&'a A, &'a ActivationContext, Req) -> MethodFuture<'a, Resp>
        + Send
        + Sync
        + 'static,
{
    fn call<'a>(
        &'a self,
        actor: &'a A,
        ctx: &'a ActivationContext,
        payload: Bytes,
    ) -> MethodFuture<'a, Bytes> {
        Box::pin(async move {
            let req: Req = codec::decode(ctx.codec().as_ref(), &payload)?;
            let resp = (self.handler)(actor, ctx, req).await?;
            Ok(codec::encode(ctx.codec().as_ref(), &resp)?)
        })
    }
}

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

/// Handlers of a non-re-entrant actor type.
pub(crate) struct ExclusiveTable<A> {
    pub(crate) methods: HashMap<String, Arc<dyn ExclusiveMethod<A>>>,
    pub(crate) on_activate: Option<Arc<dyn ExclusiveHook<A>>>,
    pub(crate) on_deactivate: Option<Arc<dyn ExclusiveHook<A>>>,
    pub(crate) on_reminder: Option<Arc<dyn ExclusiveReminderHandler<A>>>,
    pub(crate) on_stream: Option<Arc<dyn ExclusiveStreamHandler<A>>>,
}

impl<A> Default for ExclusiveTable<A> {
    fn default() -> Self {
        Self {
            methods: HashMap::new(),
            on_activate: None,
            on_deactivate: None,
            on_reminder: None,
            on_stream: None,
        }
    }
}

/// Handlers of a re-entrant actor type.
pub(crate) struct SharedTable<A> {
    pub(crate) methods: HashMap<String, Arc<dyn SharedMethod<A>>>,
    pub(crate) on_activate: Option<Arc<dyn SharedHook<A>>>,
    pub(crate) on_deactivate: Option<Arc<dyn SharedHook<A>>>,
    pub(crate) on_reminder: Option<Arc<dyn SharedReminderHandler<A>>>,
    pub(crate) on_stream: Option<Arc<dyn SharedStreamHandler<A>>>,
}

impl<A> Default for SharedTable<A> {
    fn default() -> Self {
        Self {
            methods: HashMap::new(),
            on_activate: None,
            on_deactivate: None,
            on_reminder: None,
            on_stream: None,
        }
    }
}

fn unsupported(type_hint: &str, operation: &Operation) -> ActorError {
    ActorError::Runtime(InvokeError::new(
        ErrorKind::UnsupportedMethod,
        format!("{type_hint} does not handle {}", operation.name()),
    ))
}

// ---------------------------------------------------------------------------
// Type-erased activation bodies
// ---------------------------------------------------------------------------

/// Type-erased body of a non-re-entrant activation.
#[async_trait]
pub(crate) trait ErasedActor: Send {
    async fn activate(&mut self, ctx: &ActivationContext) -> Result<(), ActorError>;
    async fn deactivate(&mut self, ctx: &ActivationContext) -> Result<(), ActorError>;
    async fn handle(
        &mut self,
        ctx: &ActivationContext,
        operation: &Operation,
        payload: Bytes,
    ) -> Result<Bytes, ActorError>;
}

/// Type-erased body of a re-entrant activation.
#[async_trait]
pub(crate) trait ErasedSharedActor: Send + Sync {
    async fn activate(&self, ctx: &ActivationContext) -> Result<(), ActorError>;
    async fn deactivate(&self, ctx: &ActivationContext) -> Result<(), ActorError>;
    async fn handle(
        &self,
        ctx: &ActivationContext,
        operation: &Operation,
        payload: Bytes,
    ) -> Result<Bytes, ActorError>;
}

/// One constructed activation body.
pub(crate) enum ActorInstance {
    Exclusive(Box<dyn ErasedActor>),
    Shared(Arc<dyn ErasedSharedActor>),
}

pub(crate) struct TypedExclusive<A> {
    pub(crate) actor: A,
    pub(crate) table: Arc<ExclusiveTable<A>>,
    pub(crate) type_name: Arc<str>,
}

#[async_trait]
impl<A: Send + 'static> ErasedActor for TypedExclusive<A> {
    async fn activate(&mut self, ctx: &ActivationContext) -> Result<(), ActorError> {
        match &self.table.on_activate {
            Some(hook) => hook.call(&mut self.actor, ctx).await,
            None => Ok(()),
        }
    }

    async fn deactivate(&mut self, ctx: &ActivationContext) -> Result<(), ActorError> {
        match &self.table.on_deactivate {
            Some(hook) => hook.call(&mut self.actor, ctx).await,
            None => Ok(()),
        }
    }

    async fn handle(
        &mut self,
        ctx: &ActivationContext,
        operation: &Operation,
        payload: Bytes,
    ) -> Result<Bytes, ActorError> {
        match operation {
            Operation::Call { method } => match self.table.methods.get(method) {
                Some(handler) => handler.call(&mut self.actor, ctx, payload).await,
                None => Err(unsupported(&self.type_name, operation)),
            },
            Operation::Reminder {
                name,
                last_fired,
                fired_at,
            } => match &self.table.on_reminder {
                Some(handler) => {
                    let tick = ReminderTick {
                        name: name.clone(),
                        last_fired: *last_fired,
                        fired_at: *fired_at,
                    };
                    handler.call(&mut self.actor, ctx, tick).await?;
                    Ok(Bytes::new())
                }
                None => Err(unsupported(&self.type_name, operation)),
            },
            Operation::Stream { subject } => match &self.table.on_stream {
                Some(handler) => {
                    handler
                        .call(&mut self.actor, ctx, subject.clone(), payload)
                        .await?;
                    Ok(Bytes::new())
                }
                None => Err(unsupported(&self.type_name, operation)),
            },
        }
    }
}

pub(crate) struct TypedShared<A> {
    pub(crate) actor: A,
    pub(crate) table: Arc<SharedTable<A>>,
    pub(crate) type_name: Arc<str>,
}

#[async_trait]
impl<A: Send + Sync + 'static> ErasedSharedActor for TypedShared<A> {
    async fn activate(&self, ctx: &ActivationContext) -> Result<(), ActorError> {
        match &self.table.on_activate {
            Some(hook) => hook.call(&self.actor, ctx).await,
            None => Ok(()),
        }
    }

    async fn deactivate(&self, ctx: &ActivationContext) -> Result<(), ActorError> {
        match &self.table.on_deactivate {
            Some(hook) => hook.call(&self.actor, ctx).await,
            None => Ok(()),
        }
    }

    async fn handle(
        &self,
        ctx: &ActivationContext,
        operation: &Operation,
        payload: Bytes,
    ) -> Result<Bytes, ActorError> {
        match operation {
            Operation::Call { method } => match self.table.methods.get(method) {
                Some(handler) => handler.call(&self.actor, ctx, payload).await,
                None => Err(unsupported(&self.type_name, operation)),
            },
            Operation::Reminder {
                name,
                last_fired,
                fired_at,
            } => match &self.table.on_reminder {
                Some(handler) => {
                    let tick = ReminderTick {
                        name: name.clone(),
                        last_fired: *last_fired,
                        fired_at: *fired_at,
                    };
                    handler.call(&self.actor, ctx, tick).await?;
                    Ok(Bytes::new())
                }
                None => Err(unsupported(&self.type_name, operation)),
            },
            Operation::Stream { subject } => match &self.table.on_stream {
                Some(handler) => {
                    handler
                        .call(&self.actor, ctx, subject.clone(), payload)
                        .await?;
                    Ok(Bytes::new())
                }
                None => Err(unsupported(&self.type_name, operation)),
            },
        }
    }
}
