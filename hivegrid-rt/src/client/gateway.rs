//! Turns a typed call on an actor handle into a transport invocation.
//!
//! Retry discipline: `not-owner`, `ring-refresh-needed`, `throttled`, and
//! `peer-shutdown` are rejected before the target executes anything, so they
//! are always retried within the budget (refreshing the placement view
//! first). `unreachable` and `timeout` leave the outcome unknown; those are
//! only retried when the caller marked the call idempotent.

// Layer 1: Standard library imports
use std::sync::Arc;
use std::time::Duration;

// Layer 2: Third-party crate imports
use bytes::Bytes;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

// Layer 3: Internal module imports
use crate::actor::CallOptions;
use crate::codec::{self, Codec};
use crate::error::{ErrorKind, InvokeError};
use crate::membership::{traits::active_silos, Membership};
use crate::message::CallChain;
use crate::monitoring::{names, Telemetry, TelemetryEvent};
use crate::ring::RingState;
use crate::transport::{Transport, WireRequest};
use crate::util::ActorKey;

/// Gateway tuning.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Transient-error retries per call.
    pub retry_budget: usize,
    /// Deadline applied when the caller sets none.
    pub default_timeout: Duration,
    /// Pause before re-reading a ring somebody else refreshes.
    pub refresh_backoff: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            retry_budget: 3,
            default_timeout: Duration::from_secs(30),
            refresh_backoff: Duration::from_millis(50),
        }
    }
}

struct ClientInner {
    ring: Arc<RingState>,
    owns_ring: bool,
    membership: Arc<dyn Membership>,
    transport: Arc<dyn Transport>,
    codec: Arc<dyn Codec>,
    telemetry: Arc<dyn Telemetry>,
    config: ClientConfig,
}

/// Handle to the cluster, usable from inside a silo or an external process.
#[derive(Clone)]
pub struct ClusterClient {
    inner: Arc<ClientInner>,
}

impl ClusterClient {
    /// Client sharing a silo's ring (the silo's membership listener keeps it
    /// fresh; the client only re-reads on retry).
    pub fn for_silo(
        ring: Arc<RingState>,
        membership: Arc<dyn Membership>,
        transport: Arc<dyn Transport>,
        codec: Arc<dyn Codec>,
        telemetry: Arc<dyn Telemetry>,
        config: ClientConfig,
    ) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                ring,
                owns_ring: false,
                membership,
                transport,
                codec,
                telemetry,
                config,
            }),
        }
    }

    /// Client for an external process; owns its ring and rebuilds it from
    /// membership on creation and on every refresh.
    pub async fn standalone(
        membership: Arc<dyn Membership>,
        transport: Arc<dyn Transport>,
        codec: Arc<dyn Codec>,
        telemetry: Arc<dyn Telemetry>,
        config: ClientConfig,
        virtual_nodes: usize,
    ) -> Self {
        let ring = Arc::new(RingState::new(virtual_nodes));
        let silos = active_silos(membership.as_ref()).await;
        ring.publish(&silos);
        Self {
            inner: Arc::new(ClientInner {
                ring,
                owns_ring: true,
                membership,
                transport,
                codec,
                telemetry,
                config,
            }),
        }
    }

    /// Typed handle for `(type_name, id)`.
    pub fn actor(&self, type_name: impl Into<String>, id: impl Into<String>) -> ActorRef {
        ActorRef {
            client: self.clone(),
            key: ActorKey::new(type_name, id),
        }
    }

    /// The codec used for argument marshalling.
    pub fn codec(&self) -> Arc<dyn Codec> {
        Arc::clone(&self.inner.codec)
    }

    async fn refresh_placement(&self) {
        if self.inner.owns_ring {
            let silos = active_silos(self.inner.membership.as_ref()).await;
            self.inner.ring.publish(&silos);
        } else {
            // Someone else rebuilds the shared ring; give them a beat.
            tokio::time::sleep(self.inner.config.refresh_backoff).await;
        }
    }

    /// Invoke with pre-marshalled arguments and an explicit call chain.
    pub async fn invoke_raw(
        &self,
        key: &ActorKey,
        method: &str,
        args: Bytes,
        chain: CallChain,
        options: CallOptions,
    ) -> Result<Bytes, InvokeError> {
        let deadline = Utc::now()
            + chrono::Duration::from_std(
                options.timeout.unwrap_or(self.inner.config.default_timeout),
            )
            .unwrap_or_else(|_| chrono::Duration::seconds(30));
        let budget = options
            .retry_budget
            .unwrap_or(self.inner.config.retry_budget);

        let mut last_error = InvokeError::new(ErrorKind::Unreachable, "no active silos");
        for attempt in 0..=budget {
            let Some(owner) = self.inner.ring.owner(key) else {
                self.refresh_placement().await;
                last_error =
                    InvokeError::new(ErrorKind::RingRefresh, "placement ring is empty");
                continue;
            };

            let request = WireRequest {
                chain: chain.keys().to_vec(),
                ..WireRequest::call(key.type_name(), key.id(), method, args.clone())
            }
            .with_deadline(deadline);

            self.inner
                .telemetry
                .record(TelemetryEvent::actor(names::TRANSPORT_INVOKE, key.clone()));

            let result = match self.inner.transport.invoke(&owner, request).await {
                Ok(response) => response.into_result(),
                Err(err) => Err(err),
            };

            let error = match result {
                Ok(payload) => return Ok(payload),
                Err(error) => error,
            };

            let retry = match error.kind() {
                // Rejected before execution; always safe to retry.
                ErrorKind::NotOwner
                | ErrorKind::RingRefresh
                | ErrorKind::Throttled
                | ErrorKind::PeerShutdown => true,
                // Outcome unknown; only the caller can authorize a replay.
                ErrorKind::Unreachable | ErrorKind::Timeout => options.idempotent,
                _ => false,
            };
            if !retry || attempt == budget {
                return Err(error);
            }

            debug!(
                actor = %key,
                method,
                attempt,
                kind = %error.kind(),
                "retrying after transient error"
            );
            if let Some(after) = error.retry_after() {
                tokio::time::sleep(after).await;
            }
            self.refresh_placement().await;
            last_error = error;
        }
        Err(last_error)
    }
}

impl std::fmt::Debug for ClusterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterClient")
            .field("owns_ring", &self.inner.owns_ring)
            .finish()
    }
}

/// Typed handle to one actor.
#[derive(Debug, Clone)]
pub struct ActorRef {
    client: ClusterClient,
    key: ActorKey,
}

impl ActorRef {
    /// The addressed key.
    pub fn key(&self) -> &ActorKey {
        &self.key
    }

    /// Call a method with default options.
    pub async fn call<Req, Resp>(&self, method: &str, args: &Req) -> Result<Resp, InvokeError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        self.call_with(method, args, CallOptions::default()).await
    }

    /// Call a method with explicit options.
    pub async fn call_with<Req, Resp>(
        &self,
        method: &str,
        args: &Req,
        options: CallOptions,
    ) -> Result<Resp, InvokeError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let codec = self.client.codec();
        let payload = codec::encode(codec.as_ref(), args)?;
        let response = self
            .client
            .invoke_raw(&self.key, method, payload, CallChain::new(), options)
            .await?;
        codec::decode(codec.as_ref(), &response)
    }
}
