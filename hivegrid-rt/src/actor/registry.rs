//! Actor-type registry populated at process init.
//!
//! Each actor type registers a factory, a method table, and its placement
//! attributes; stream bindings tie subject namespaces to consumer types. The
//! registry replaces attribute-driven discovery: everything the runtime needs
//! at dispatch time is in these tables before the silo starts.

// Layer 1: Standard library imports
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

// Layer 2: Third-party crate imports
use bytes::Bytes;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

// Layer 3: Internal module imports
use super::context::ActivationContext;
use super::table::{
    ActorInstance, ExclusiveCall, ExclusiveTable, MethodFuture, SharedCall, SharedTable,
    TypedExclusive, TypedShared,
};
use crate::mailbox::OverflowPolicy;
use crate::supervision::SupervisorPolicy;
use crate::util::ActorKey;

/// Default concurrent envelope fan-out for re-entrant activations.
pub const DEFAULT_MAX_INFLIGHT: usize = 16;

/// Registration errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The type name is already registered.
    #[error("Actor type already registered: {0}")]
    DuplicateType(String),

    /// A binding referenced an unregistered type.
    #[error("Unknown actor type: {0}")]
    UnknownType(String),

    /// A stream binding targets a type without a stream handler.
    #[error("Actor type {0} has no stream handler")]
    MissingStreamHandler(String),
}

/// Placement and dispatch attributes of one actor type.
#[derive(Debug, Clone)]
pub struct ActorOptions {
    /// Re-entrant types process envelopes concurrently (shared handlers).
    pub reentrant: bool,
    /// Stateless workers fan out to several local instances per key.
    pub stateless: bool,
    /// Instance cap for stateless workers (1 otherwise).
    pub max_instances: usize,
    /// Concurrent envelope cap for re-entrant activations.
    pub max_inflight: usize,
    /// Override of the silo-wide idle collection TTL.
    pub idle_ttl: Option<Duration>,
    /// Override of the silo-wide mailbox capacity.
    pub mailbox_capacity: Option<usize>,
    /// Override of the silo-wide overflow policy.
    pub overflow: Option<OverflowPolicy>,
    /// Directives this type applies to activations it supervises.
    pub supervision: SupervisorPolicy,
}

impl Default for ActorOptions {
    fn default() -> Self {
        Self {
            reentrant: false,
            stateless: false,
            max_instances: 1,
            max_inflight: DEFAULT_MAX_INFLIGHT,
            idle_ttl: None,
            mailbox_capacity: None,
            overflow: None,
            supervision: SupervisorPolicy::default(),
        }
    }
}

/// Registered description of one actor type.
pub struct ActorTypeDescriptor {
    type_name: String,
    options: ActorOptions,
    factory: Arc<dyn Fn(&ActorKey) -> ActorInstance + Send + Sync>,
    has_reminder_handler: bool,
    has_stream_handler: bool,
}

impl ActorTypeDescriptor {
    /// The registered type name.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// The type's attributes.
    pub fn options(&self) -> &ActorOptions {
        &self.options
    }

    /// Whether the type registered a reminder handler.
    pub fn has_reminder_handler(&self) -> bool {
        self.has_reminder_handler
    }

    /// Whether the type registered a stream handler.
    pub fn has_stream_handler(&self) -> bool {
        self.has_stream_handler
    }

    pub(crate) fn spawn(&self, key: &ActorKey) -> ActorInstance {
        (self.factory)(key)
    }
}

impl std::fmt::Debug for ActorTypeDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorTypeDescriptor")
            .field("type_name", &self.type_name)
            .field("reentrant", &self.options.reentrant)
            .field("stateless", &self.options.stateless)
            .finish()
    }
}

/// Entry points for describing actor types.
pub struct ActorType;

impl ActorType {
    /// Describe a non-re-entrant type; handlers take `&mut A`.
    pub fn exclusive<A, F>(type_name: impl Into<String>, factory: F) -> ExclusiveBuilder<A>
    where
        A: Send + 'static,
        F: Fn(&ActorKey) -> A + Send + Sync + 'static,
    {
        ExclusiveBuilder {
            type_name: type_name.into(),
            make: Arc::new(factory),
            table: ExclusiveTable::default(),
            options: ActorOptions::default(),
        }
    }

    /// Describe a re-entrant type; handlers take `&A` and may interleave.
    pub fn reentrant<A, F>(type_name: impl Into<String>, factory: F) -> ReentrantBuilder<A>
    where
        A: Send + Sync + 'static,
        F: Fn(&ActorKey) -> A + Send + Sync + 'static,
    {
        ReentrantBuilder {
            type_name: type_name.into(),
            make: Arc::new(factory),
            table: SharedTable::default(),
            options: ActorOptions {
                reentrant: true,
                ..ActorOptions::default()
            },
        }
    }
}

/// Builder for non-re-entrant actor types.
pub struct ExclusiveBuilder<A> {
    type_name: String,
    make: Arc<dyn Fn(&ActorKey) -> A + Send + Sync>,
    table: ExclusiveTable<A>,
    options: ActorOptions,
}

impl<A: Send + 'static> ExclusiveBuilder<A> {
    /// Register a method; arguments and result go through the codec.
    pub fn method<Req, Resp, H>(mut self, name: impl Into<String>, handler: H) -> Self
    where
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + 'static,
        H: for<'a> Fn(&'a mut A, &'a ActivationContext, Req) -> MethodFuture<'a, Resp>
            + Send
            + Sync
            + 'static,
    {
        self.table.methods.insert(
            name.into(),
            Arc::new(ExclusiveCall {
                handler,
                _marker: PhantomData,
            }),
        );
        self
    }

    /// Register the activation hook.
    pub fn on_activate<H>(mut self, hook: H) -> Self
    where
        H: for<'a> Fn(&'a mut A, &'a ActivationContext) -> MethodFuture<'a, ()>
            + Send
            + Sync
            + 'static,
    {
        self.table.on_activate = Some(Arc::new(hook));
        self
    }

    /// Register the deactivation hook, run during drain.
    pub fn on_deactivate<H>(mut self, hook: H) -> Self
    where
        H: for<'a> Fn(&'a mut A, &'a ActivationContext) -> MethodFuture<'a, ()>
            + Send
            + Sync
            + 'static,
    {
        self.table.on_deactivate = Some(Arc::new(hook));
        self
    }

    /// Register the reminder callback.
    pub fn on_reminder<H>(mut self, handler: H) -> Self
    where
        H: for<'a> Fn(
                &'a mut A,
                &'a ActivationContext,
                crate::reminder::ReminderTick,
            ) -> MethodFuture<'a, ()>
            + Send
            + Sync
            + 'static,
    {
        self.table.on_reminder = Some(Arc::new(handler));
        self
    }

    /// Register the stream callback.
    pub fn on_stream<H>(mut self, handler: H) -> Self
    where
        H: for<'a> Fn(
                &'a mut A,
                &'a ActivationContext,
                crate::stream::StreamSubject,
                Bytes,
            ) -> MethodFuture<'a, ()>
            + Send
            + Sync
            + 'static,
    {
        self.table.on_stream = Some(Arc::new(handler));
        self
    }

    /// Mark the type a stateless worker with up to `max_instances` local
    /// instances per key. Stateless workers skip the call-chain guard:
    /// a re-entering call is served by another instance.
    pub fn stateless_worker(mut self, max_instances: usize) -> Self {
        self.options.stateless = true;
        self.options.max_instances = max_instances.max(1);
        self
    }

    /// Override the idle collection TTL for this type.
    pub fn idle_ttl(mut self, ttl: Duration) -> Self {
        self.options.idle_ttl = Some(ttl);
        self
    }

    /// Override the mailbox capacity for this type.
    pub fn mailbox_capacity(mut self, capacity: usize) -> Self {
        self.options.mailbox_capacity = Some(capacity.max(1));
        self
    }

    /// Override the mailbox overflow policy for this type.
    pub fn overflow(mut self, policy: OverflowPolicy) -> Self {
        self.options.overflow = Some(policy);
        self
    }

    /// Set the supervision policy this type applies to its supervisees.
    pub fn supervision(mut self, policy: SupervisorPolicy) -> Self {
        self.options.supervision = policy;
        self
    }

    /// Finish the description.
    pub fn build(self) -> ActorTypeDescriptor {
        let table = Arc::new(self.table);
        let make = self.make;
        let type_name: Arc<str> = Arc::from(self.type_name.as_str());
        let has_reminder_handler = table.on_reminder.is_some();
        let has_stream_handler = table.on_stream.is_some();
        ActorTypeDescriptor {
            type_name: self.type_name,
            options: self.options,
            has_reminder_handler,
            has_stream_handler,
            factory: Arc::new(move |key| {
                ActorInstance::Exclusive(Box::new(TypedExclusive {
                    actor: make(key),
                    table: Arc::clone(&table),
                    type_name: Arc::clone(&type_name),
                }))
            }),
        }
    }
}

/// Builder for re-entrant actor types.
pub struct ReentrantBuilder<A> {
    type_name: String,
    make: Arc<dyn Fn(&ActorKey) -> A + Send + Sync>,
    table: SharedTable<A>,
    options: ActorOptions,
}

impl<A: Send + Sync + 'static> ReentrantBuilder<A> {
    /// Register a method; handlers take `&A` and may interleave.
    pub fn method<Req, Resp, H>(mut self, name: impl Into<String>, handler: H) -> Self
    where
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + 'static,
        H: for<'a> Fn(&'a A, &'a ActivationContext, Req) -> MethodFuture<'a, Resp>
            + Send
            + Sync
            + 'static,
    {
        self.table.methods.insert(
            name.into(),
            Arc::new(SharedCall {
                handler,
                _marker: PhantomData,
            }),
        );
        self
    }

    /// Register the activation hook.
    pub fn on_activate<H>(mut self, hook: H) -> Self
    where
        H: for<'a> Fn(&'a A, &'a ActivationContext) -> MethodFuture<'a, ()> + Send + Sync + 'static,
    {
        self.table.on_activate = Some(Arc::new(hook));
        self
    }

    /// Register the deactivation hook.
    pub fn on_deactivate<H>(mut self, hook: H) -> Self
    where
        H: for<'a> Fn(&'a A, &'a ActivationContext) -> MethodFuture<'a, ()> + Send + Sync + 'static,
    {
        self.table.on_deactivate = Some(Arc::new(hook));
        self
    }

    /// Register the reminder callback.
    pub fn on_reminder<H>(mut self, handler: H) -> Self
    where
        H: for<'a> Fn(
                &'a A,
                &'a ActivationContext,
                crate::reminder::ReminderTick,
            ) -> MethodFuture<'a, ()>
            + Send
            + Sync
            + 'static,
    {
        self.table.on_reminder = Some(Arc::new(handler));
        self
    }

    /// Register the stream callback.
    pub fn on_stream<H>(mut self, handler: H) -> Self
    where
        H: for<'a> Fn(
                &'a A,
                &'a ActivationContext,
                crate::stream::StreamSubject,
                Bytes,
            ) -> MethodFuture<'a, ()>
            + Send
            + Sync
            + 'static,
    {
        self.table.on_stream = Some(Arc::new(handler));
        self
    }

    /// Cap concurrent envelopes per activation.
    pub fn max_inflight(mut self, max_inflight: usize) -> Self {
        self.options.max_inflight = max_inflight.max(1);
        self
    }

    /// Override the idle collection TTL for this type.
    pub fn idle_ttl(mut self, ttl: Duration) -> Self {
        self.options.idle_ttl = Some(ttl);
        self
    }

    /// Override the mailbox capacity for this type.
    pub fn mailbox_capacity(mut self, capacity: usize) -> Self {
        self.options.mailbox_capacity = Some(capacity.max(1));
        self
    }

    /// Override the mailbox overflow policy for this type.
    pub fn overflow(mut self, policy: OverflowPolicy) -> Self {
        self.options.overflow = Some(policy);
        self
    }

    /// Set the supervision policy this type applies to its supervisees.
    pub fn supervision(mut self, policy: SupervisorPolicy) -> Self {
        self.options.supervision = policy;
        self
    }

    /// Finish the description.
    pub fn build(self) -> ActorTypeDescriptor {
        let table = Arc::new(self.table);
        let make = self.make;
        let type_name: Arc<str> = Arc::from(self.type_name.as_str());
        let has_reminder_handler = table.on_reminder.is_some();
        let has_stream_handler = table.on_stream.is_some();
        ActorTypeDescriptor {
            type_name: self.type_name,
            options: self.options,
            has_reminder_handler,
            has_stream_handler,
            factory: Arc::new(move |key| {
                ActorInstance::Shared(Arc::new(TypedShared {
                    actor: make(key),
                    table: Arc::clone(&table),
                    type_name: Arc::clone(&type_name),
                }))
            }),
        }
    }
}

/// Process-wide table of actor types and stream bindings.
#[derive(Debug, Default)]
pub struct ActorTypeRegistry {
    types: DashMap<String, Arc<ActorTypeDescriptor>>,
    stream_bindings: DashMap<String, Vec<String>>,
}

impl ActorTypeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an actor type.
    pub fn register(&self, descriptor: ActorTypeDescriptor) -> Result<(), RegistryError> {
        let name = descriptor.type_name().to_string();
        match self.types.entry(name.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(RegistryError::DuplicateType(name))
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(Arc::new(descriptor));
                Ok(())
            }
        }
    }

    /// Bind a subject namespace to a consumer actor type.
    ///
    /// The first message on any subject in the namespace activates (or routes
    /// to) an instance of the type, with the subject key as the actor id.
    pub fn bind_stream(
        &self,
        namespace: impl Into<String>,
        actor_type: impl Into<String>,
    ) -> Result<(), RegistryError> {
        let actor_type = actor_type.into();
        let descriptor = self
            .types
            .get(&actor_type)
            .ok_or_else(|| RegistryError::UnknownType(actor_type.clone()))?;
        if !descriptor.has_stream_handler() {
            return Err(RegistryError::MissingStreamHandler(actor_type));
        }
        drop(descriptor);

        self.stream_bindings
            .entry(namespace.into())
            .or_default()
            .push(actor_type);
        Ok(())
    }

    /// Look up a type descriptor.
    pub fn get(&self, type_name: &str) -> Option<Arc<ActorTypeDescriptor>> {
        self.types.get(type_name).map(|entry| Arc::clone(&entry))
    }

    /// Consumer types bound to a subject namespace.
    pub fn stream_consumers(&self, namespace: &str) -> Vec<Arc<ActorTypeDescriptor>> {
        self.stream_bindings
            .get(namespace)
            .map(|types| {
                types
                    .iter()
                    .filter_map(|name| self.get(name))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Registered type names, sorted.
    pub fn type_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.types.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Tests are allowed to use unwrap for simplicity
mod tests {
    use super::*;
    use crate::stream::StreamSubject;

    struct Counter {
        count: u64,
    }

    fn increment<'a>(
        actor: &'a mut Counter,
        _ctx: &'a ActivationContext,
        _args: (),
    ) -> MethodFuture<'a, u64> {
        Box::pin(async move {
            actor.count += 1;
            Ok(actor.count)
        })
    }

    fn consume<'a>(
        actor: &'a mut Counter,
        _ctx: &'a ActivationContext,
        _subject: StreamSubject,
        _payload: Bytes,
    ) -> MethodFuture<'a, ()> {
        Box::pin(async move {
            actor.count += 1;
            Ok(())
        })
    }

    fn counter_type() -> ActorTypeDescriptor {
        ActorType::exclusive("Counter", |_key| Counter { count: 0 })
            .method("Increment", increment)
            .build()
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = ActorTypeRegistry::new();
        registry.register(counter_type()).unwrap();

        let descriptor = registry.get("Counter").unwrap();
        assert_eq!(descriptor.type_name(), "Counter");
        assert!(!descriptor.options().reentrant);
        assert!(registry.get("Ghost").is_none());
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let registry = ActorTypeRegistry::new();
        registry.register(counter_type()).unwrap();

        let err = registry.register(counter_type()).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateType(_)));
    }

    #[test]
    fn test_stream_binding_requires_handler() {
        let registry = ActorTypeRegistry::new();
        registry.register(counter_type()).unwrap();

        let err = registry.bind_stream("events", "Counter").unwrap_err();
        assert!(matches!(err, RegistryError::MissingStreamHandler(_)));

        let err = registry.bind_stream("events", "Ghost").unwrap_err();
        assert!(matches!(err, RegistryError::UnknownType(_)));
    }

    #[test]
    fn test_stream_binding_and_consumers() {
        let registry = ActorTypeRegistry::new();
        let with_stream = ActorType::exclusive("Consumer", |_key| Counter { count: 0 })
            .on_stream(consume)
            .build();
        assert!(with_stream.has_stream_handler());
        registry.register(with_stream).unwrap();

        registry.bind_stream("events", "Consumer").unwrap();
        let consumers = registry.stream_consumers("events");
        assert_eq!(consumers.len(), 1);
        assert_eq!(consumers[0].type_name(), "Consumer");
        assert!(registry.stream_consumers("other").is_empty());
    }

    #[test]
    fn test_stateless_worker_options() {
        let descriptor = ActorType::exclusive("Identity", |_key| Counter { count: 0 })
            .stateless_worker(4)
            .build();
        assert!(descriptor.options().stateless);
        assert_eq!(descriptor.options().max_instances, 4);
    }
}
