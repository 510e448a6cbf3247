//! Inter-silo request/response plumbing and the in-process reference hub.

pub mod loopback;
pub mod traits;
pub mod wire;

pub use loopback::{LoopbackNetwork, LoopbackTransport};
pub use traits::{InboundHandler, Transport};
pub use wire::{WireRequest, WireResponse, FLAG_ONE_WAY, FLAG_STREAM_EVENT};
