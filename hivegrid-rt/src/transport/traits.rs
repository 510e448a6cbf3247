// Layer 1: Standard library imports
use std::fmt::Debug;
use std::sync::Arc;

// Layer 2: Third-party crate imports
use async_trait::async_trait;

// Layer 3: Internal module imports
use super::wire::{WireRequest, WireResponse};
use crate::error::InvokeError;
use crate::util::SiloId;

/// Client side of the wire: send a request to a peer silo and await the
/// correlated response.
///
/// Implementations must preserve the correlation id and surface categorical
/// errors (`not-owner`, `unreachable`, `timeout`, `peer-shutdown`,
/// `marshalling-failed`). No ordering is guaranteed across independent
/// requests. `invoke` suspends until the response arrives or the request
/// deadline passes; dropping the future cancels the wait cooperatively.
#[async_trait]
pub trait Transport: Send + Sync + Debug {
    /// Send one request and await its response.
    async fn invoke(
        &self,
        target: &SiloId,
        request: WireRequest,
    ) -> Result<WireResponse, InvokeError>;

    /// Register the local request handler served to peers.
    fn bind(&self, handler: Arc<dyn InboundHandler>);

    /// Start serving (idempotent).
    async fn start(&self) -> Result<(), InvokeError>;

    /// Stop serving (idempotent). With `drain`, in-flight requests finish.
    async fn stop(&self, drain: bool) -> Result<(), InvokeError>;
}

/// Server side of the wire: the silo's request handler, registered with the
/// transport so peers can reach it.
#[async_trait]
pub trait InboundHandler: Send + Sync {
    /// Handle one decoded request and produce the response.
    async fn handle(&self, request: WireRequest) -> WireResponse;
}
