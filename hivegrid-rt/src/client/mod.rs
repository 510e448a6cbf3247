//! Client gateway: typed handles over the placement ring and transport.

pub mod gateway;

pub use gateway::{ActorRef, ClientConfig, ClusterClient};
