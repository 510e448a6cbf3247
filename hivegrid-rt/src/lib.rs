//! # hivegrid-rt - Distributed Virtual-Actor Runtime
//!
//! A cluster of processes ("silos") hosts large populations of lightweight,
//! single-threaded, location-transparent actors addressed by
//! `(type-name, id)`. Actors activate on demand on exactly one silo, process
//! messages one at a time (unless declared re-entrant), persist state with
//! optimistic concurrency, register durable wall-clock reminders, and
//! publish/subscribe through named streams.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use hivegrid_rt::prelude::*;
//! use hivegrid_rt::MethodFuture;
//! use std::sync::Arc;
//!
//! struct Counter { count: u64 }
//!
//! fn increment<'a>(
//!     actor: &'a mut Counter,
//!     _ctx: &'a ActivationContext,
//!     _args: (),
//! ) -> MethodFuture<'a, u64> {
//!     Box::pin(async move {
//!         actor.count += 1;
//!         Ok(actor.count)
//!     })
//! }
//!
//! fn get<'a>(
//!     actor: &'a mut Counter,
//!     _ctx: &'a ActivationContext,
//!     _args: (),
//! ) -> MethodFuture<'a, u64> {
//!     Box::pin(async move { Ok(actor.count) })
//! }
//!
//! fn counter_type() -> ActorTypeDescriptor {
//!     ActorType::exclusive("Counter", |_key| Counter { count: 0 })
//!         .method("Increment", increment)
//!         .method("Get", get)
//!         .build()
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = Arc::new(ActorTypeRegistry::new());
//!     registry.register(counter_type())?;
//!
//!     let membership = InMemoryMembership::with_defaults();
//!     let network = LoopbackNetwork::new();
//!     let silo_id = SiloId::new("s1");
//!
//!     let silo = Silo::builder()
//!         .with_id(silo_id.clone())
//!         .with_registry(registry)
//!         .with_membership(membership)
//!         .with_transport(Arc::new(LoopbackTransport::new(network, silo_id)))
//!         .with_state_store(Arc::new(MemoryStateStore::new()))
//!         .with_reminder_store(Arc::new(MemoryReminderStore::new()))
//!         .build()?;
//!     silo.start().await?;
//!
//!     let counter = silo.client().actor("Counter", "k");
//!     let _: u64 = counter.call("Increment", &()).await?;
//!     let count: u64 = counter.call("Get", &()).await?;
//!     assert_eq!(count, 1);
//!
//!     silo.stop(true).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! ## Core Runtime
//! - [`actor`] - Type registry, method tables, handler context
//! - [`activation`] - Activation directory, single-writer dispatch, collection
//! - [`mailbox`] - Bounded queues, overflow policies, dead letters
//! - [`message`] - Envelopes, operations, call chains
//!
//! ## Cluster
//! - [`ring`] - Consistent-hash placement with lock-free snapshots
//! - [`membership`] - Cluster membership seam and in-memory hub
//! - [`transport`] - Wire frames and the loopback transport
//! - [`client`] - Typed handles and the retrying gateway
//! - [`silo`] - The process host wiring everything together
//!
//! ## Durability & Streams
//! - [`state`] - Versioned state cells over the storage seam
//! - [`storage`] - State/reminder/outbox stores and in-memory providers
//! - [`reminder`] - Durable reminders with ring-derived ownership
//! - [`stream`] - Subjects, subscriptions, backpressure, implicit consumers
//!
//! ## Cross-cutting
//! - [`codec`] - Payload marshalling seam
//! - [`error`] - Categorical error kinds and the tagged error type
//! - [`supervision`] - Failure directives and policies
//! - [`monitoring`] - Telemetry hooks with stable instrumentation names
//! - [`util`] - Identifiers and addressing
//!
//! # Guarantees
//!
//! - **Single writer**: one envelope in flight per non-re-entrant activation;
//!   re-entrant activations interleave through shared (`&self`) handlers.
//! - **Placement determinism**: every silo computes the same owner for a key
//!   from the same membership snapshot; ring reads are lock-free.
//! - **Optimistic concurrency**: versioned compare-and-set state writes; the
//!   loser of a race observes `concurrency-conflict` and retries its logic.
//! - **At-least-once reminders**: durable, fired by the current ring owner,
//!   redistributed by the next tick after a membership change.
//! - **Per-publisher stream order**: subscribers observe one publisher's
//!   messages in publish order; backpressure is a per-subject policy.

pub mod activation;
pub mod actor;
pub mod client;
pub mod codec;
pub mod error;
pub mod mailbox;
pub mod membership;
pub mod message;
pub mod monitoring;
pub mod reminder;
pub mod ring;
pub mod silo;
pub mod state;
pub mod storage;
pub mod stream;
pub mod supervision;
pub mod transport;
pub mod util;

// Re-export commonly used types
pub use activation::{ActivationDefaults, ActivationManager};
pub use actor::{
    ActivationContext, ActorError, ActorOptions, ActorType, ActorTypeDescriptor,
    ActorTypeRegistry, CallOptions, MethodFuture, RegistryError, RuntimeEnv,
};
pub use client::{ActorRef, ClientConfig, ClusterClient};
pub use codec::{Codec, JsonCodec};
pub use error::{ErrorClass, ErrorKind, InvokeError};
pub use mailbox::{DeadLetter, DeadLetterQueue, MailboxError, OverflowPolicy};
pub use membership::{
    InMemoryMembership, Membership, MembershipConfig, MembershipError, MembershipEvent, SiloInfo,
    SiloStatus,
};
pub use message::{CallChain, Envelope, EnvelopeRecord, Operation};
pub use monitoring::{InMemoryTelemetry, NoopTelemetry, Telemetry, TelemetryEvent};
pub use reminder::{Reminder, ReminderService, ReminderTick};
pub use ring::{HashRing, RingState};
pub use silo::{Silo, SiloBuilder, SiloConfig, SiloError};
pub use state::{PersistedState, StateCell};
pub use storage::{
    Inbox, MemoryInboxStore, MemoryOutboxStore, MemoryReminderStore, MemoryStateStore, Outbox,
    OutboxConfig, OutboxSink, OutboxStore, ReminderStore, StateRecord, StateStore, StorageError,
};
pub use stream::{DeliveryPolicy, StreamBroker, StreamSubject, SubjectStats, SubscriptionHandle};
pub use supervision::{Directive, FailureCause, SupervisorPolicy};
pub use transport::{LoopbackNetwork, LoopbackTransport, Transport, WireRequest, WireResponse};
pub use util::{ActorKey, CorrelationId, MessageId, SiloId};

/// Convenience re-exports for building a silo.
pub mod prelude {
    pub use crate::actor::{
        ActivationContext, ActorError, ActorType, ActorTypeDescriptor, ActorTypeRegistry,
        CallOptions,
    };
    pub use crate::client::{ActorRef, ClusterClient};
    pub use crate::error::{ErrorKind, InvokeError};
    pub use crate::mailbox::OverflowPolicy;
    pub use crate::membership::InMemoryMembership;
    pub use crate::silo::{Silo, SiloConfig};
    pub use crate::storage::{MemoryReminderStore, MemoryStateStore};
    pub use crate::stream::{DeliveryPolicy, StreamSubject};
    pub use crate::supervision::{Directive, SupervisorPolicy};
    pub use crate::transport::{LoopbackNetwork, LoopbackTransport};
    pub use crate::util::{ActorKey, SiloId};
}
