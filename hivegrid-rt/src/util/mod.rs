//! Shared utilities: identifiers and addressing.

pub mod ids;

pub use ids::{ActorKey, CorrelationId, MessageId, SiloId};
