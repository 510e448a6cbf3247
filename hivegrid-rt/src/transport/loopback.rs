//! In-process transport connecting the silos of one test cluster.
//!
//! Every request round-trips through the wire frame encode/decode, so the
//! byte layout is exercised even without sockets. Deadlines are enforced on
//! the calling side; a caller that drops the invoke future abandons the
//! server-side wait cooperatively.

// Layer 1: Standard library imports
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tracing::debug;

// Layer 3: Internal module imports
use super::traits::{InboundHandler, Transport};
use super::wire::{WireRequest, WireResponse};
use crate::error::{ErrorKind, InvokeError};
use crate::message::DeadlineExt;
use crate::util::SiloId;

/// Shared hub: silo id → inbound handler.
#[derive(Default)]
pub struct LoopbackNetwork {
    peers: DashMap<SiloId, Arc<dyn InboundHandler>>,
}

impl LoopbackNetwork {
    /// Create an empty hub.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a silo's handler (replaces any previous registration).
    pub fn register(&self, silo: SiloId, handler: Arc<dyn InboundHandler>) {
        debug!(silo = %silo, "registering loopback peer");
        self.peers.insert(silo, handler);
    }

    /// Remove a silo's handler.
    pub fn unregister(&self, silo: &SiloId) {
        self.peers.remove(silo);
    }

    fn peer(&self, silo: &SiloId) -> Option<Arc<dyn InboundHandler>> {
        self.peers.get(silo).map(|entry| Arc::clone(&entry))
    }
}

impl std::fmt::Debug for LoopbackNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackNetwork")
            .field("peers", &self.peers.len())
            .finish()
    }
}

/// One silo's view of the loopback hub.
#[derive(Debug)]
pub struct LoopbackTransport {
    network: Arc<LoopbackNetwork>,
    local: SiloId,
    running: AtomicBool,
}

impl LoopbackTransport {
    /// Create a transport for `local` over the shared hub.
    pub fn new(network: Arc<LoopbackNetwork>, local: SiloId) -> Self {
        Self {
            network,
            local,
            running: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn invoke(
        &self,
        target: &SiloId,
        request: WireRequest,
    ) -> Result<WireResponse, InvokeError> {
        if !self.running.load(Ordering::Acquire) {
            return Err(InvokeError::new(
                ErrorKind::Unreachable,
                format!("transport on {} is not started", self.local),
            ));
        }

        // Round-trip through the frame layout so the wire codec is always
        // exercised, loopback or not.
        let frame = request.encode();
        let decoded = WireRequest::decode(frame)?;

        let peer = self.network.peer(target).ok_or_else(|| {
            InvokeError::new(ErrorKind::Unreachable, format!("no route to silo {target}"))
        })?;

        let deadline = decoded.deadline();
        let call = async {
            let response = peer.handle(decoded).await;
            WireResponse::decode(response.encode())
        };

        match deadline {
            Some(deadline) => {
                let now = Utc::now();
                let remaining = deadline
                    .remaining(now)
                    .ok_or_else(|| InvokeError::timeout("deadline elapsed before send"))?;
                match tokio::time::timeout(remaining, call).await {
                    Ok(result) => result,
                    Err(_) => Err(InvokeError::timeout(format!(
                        "no response from {target} within deadline"
                    ))),
                }
            }
            None => call.await,
        }
    }

    fn bind(&self, handler: Arc<dyn InboundHandler>) {
        self.network.register(self.local.clone(), handler);
    }

    async fn start(&self) -> Result<(), InvokeError> {
        self.running.store(true, Ordering::Release);
        Ok(())
    }

    async fn stop(&self, _drain: bool) -> Result<(), InvokeError> {
        self.running.store(false, Ordering::Release);
        self.network.unregister(&self.local);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Tests are allowed to use unwrap for simplicity
mod tests {
    use super::*;
    use bytes::Bytes;

    #[derive(Debug)]
    struct EchoHandler;

    #[async_trait]
    impl InboundHandler for EchoHandler {
        async fn handle(&self, request: WireRequest) -> WireResponse {
            WireResponse::ok(request.correlation_id, request.args)
        }
    }

    #[derive(Debug)]
    struct SlowHandler;

    #[async_trait]
    impl InboundHandler for SlowHandler {
        async fn handle(&self, request: WireRequest) -> WireResponse {
            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            WireResponse::ok(request.correlation_id, Bytes::new())
        }
    }

    #[tokio::test]
    async fn test_roundtrip_preserves_correlation_and_payload() {
        let network = LoopbackNetwork::new();
        network.register(SiloId::new("s1"), Arc::new(EchoHandler));

        let transport = LoopbackTransport::new(Arc::clone(&network), SiloId::new("client"));
        transport.start().await.unwrap();

        let request = WireRequest::call("T", "id", "Echo", Bytes::from_static(b"hello"));
        let correlation = request.correlation_id;

        let response = transport.invoke(&SiloId::new("s1"), request).await.unwrap();
        assert_eq!(response.correlation_id, correlation);
        assert_eq!(&response.into_result().unwrap()[..], b"hello");
    }

    #[tokio::test]
    async fn test_unknown_peer_is_unreachable() {
        let network = LoopbackNetwork::new();
        let transport = LoopbackTransport::new(network, SiloId::new("client"));
        transport.start().await.unwrap();

        let err = transport
            .invoke(
                &SiloId::new("ghost"),
                WireRequest::call("T", "id", "M", Bytes::new()),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unreachable);
    }

    #[tokio::test]
    async fn test_deadline_trips_timeout() {
        let network = LoopbackNetwork::new();
        network.register(SiloId::new("s1"), Arc::new(SlowHandler));

        let transport = LoopbackTransport::new(Arc::clone(&network), SiloId::new("client"));
        transport.start().await.unwrap();

        let request = WireRequest::call("T", "id", "M", Bytes::new())
            .with_deadline(Utc::now() + chrono::Duration::milliseconds(50));

        let started = std::time::Instant::now();
        let err = transport.invoke(&SiloId::new("s1"), request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(started.elapsed() < std::time::Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_stopped_transport_refuses() {
        let network = LoopbackNetwork::new();
        network.register(SiloId::new("s1"), Arc::new(EchoHandler));
        let transport = LoopbackTransport::new(network, SiloId::new("client"));

        let err = transport
            .invoke(
                &SiloId::new("s1"),
                WireRequest::call("T", "id", "M", Bytes::new()),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unreachable);

        transport.start().await.unwrap();
        transport.stop(true).await.unwrap();
        let err = transport
            .invoke(
                &SiloId::new("s1"),
                WireRequest::call("T", "id", "M", Bytes::new()),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unreachable);
    }
}
