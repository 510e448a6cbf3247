//! Actor types: registry, method tables, handler context, and errors.

pub mod context;
pub mod error;
pub mod registry;
pub mod table;

pub use context::{ActivationContext, CallOptions, RuntimeEnv};
pub use error::ActorError;
pub use registry::{
    ActorOptions, ActorType, ActorTypeDescriptor, ActorTypeRegistry, ExclusiveBuilder,
    ReentrantBuilder, RegistryError,
};
pub use table::MethodFuture;
