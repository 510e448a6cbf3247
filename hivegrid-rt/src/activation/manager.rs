//! Per-silo activation directory: resolve, create, collect, drain.

// Layer 1: Standard library imports
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

// Layer 2: Third-party crate imports
use chrono::Utc;
use dashmap::DashMap;
use tracing::{debug, warn};

// Layer 3: Internal module imports
use super::dispatcher;
use super::handle::{ActivationHandle, ActivationShared, RejectMode};
use crate::actor::{ActorTypeDescriptor, ActorTypeRegistry, RuntimeEnv};
use crate::error::{ErrorKind, InvokeError};
use crate::mailbox::{mailbox, DeadLetterQueue, OverflowPolicy, PostError, PostOutcome};
use crate::message::Envelope;
use crate::monitoring::Telemetry;
use crate::ring::RingState;
use crate::supervision::{Directive, FailureCause};
use crate::util::{ActorKey, SiloId};

/// Silo-wide activation defaults; per-type options override them.
#[derive(Debug, Clone)]
pub struct ActivationDefaults {
    /// Mailbox capacity for types without an override.
    pub mailbox_capacity: usize,
    /// Overflow policy for types without an override.
    pub overflow: OverflowPolicy,
    /// Idle TTL before collection for types without an override.
    pub idle_ttl: Duration,
}

impl Default for ActivationDefaults {
    fn default() -> Self {
        Self {
            mailbox_capacity: 1000,
            overflow: OverflowPolicy::Error,
            idle_ttl: Duration::from_secs(300),
        }
    }
}

pub(crate) enum Slot {
    Single(Arc<ActivationHandle>),
    Pool {
        instances: Vec<Arc<ActivationHandle>>,
        counter: AtomicUsize,
    },
}

impl Slot {
    fn handles(&self) -> Vec<Arc<ActivationHandle>> {
        match self {
            Slot::Single(handle) => vec![Arc::clone(handle)],
            Slot::Pool { instances, .. } => instances.iter().map(Arc::clone).collect(),
        }
    }

    fn pick(&self) -> Option<Arc<ActivationHandle>> {
        match self {
            Slot::Single(handle) => Some(Arc::clone(handle)),
            Slot::Pool { instances, counter } => {
                if instances.is_empty() {
                    return None;
                }
                let index = counter.fetch_add(1, Ordering::Relaxed) % instances.len();
                Some(Arc::clone(&instances[index]))
            }
        }
    }
}

/// The per-silo map from actor key to live activation.
///
/// `resolve` semantics: if this silo owns the key on the current ring, an
/// activation is found or created under a per-key latch (the map's shard
/// entry); otherwise the caller is told to forward. Construction is lazy:
/// the activation hook runs in the worker before the first envelope.
pub struct ActivationManager {
    inner: Arc<ManagerInner>,
}

pub(crate) struct ManagerInner {
    pub(crate) silo: SiloId,
    pub(crate) registry: Arc<ActorTypeRegistry>,
    pub(crate) ring: Arc<RingState>,
    pub(crate) dlq: Arc<DeadLetterQueue>,
    pub(crate) telemetry: Arc<dyn Telemetry>,
    pub(crate) defaults: ActivationDefaults,
    pub(crate) slots: DashMap<ActorKey, Slot>,
    pub(crate) env: OnceLock<Arc<dyn RuntimeEnv>>,
    pub(crate) shutting_down: AtomicBool,
    /// Notifies the stream broker when an activation goes away, so owned
    /// subscriptions die with their consumer.
    pub(crate) on_deactivated: OnceLock<Arc<dyn Fn(&ActorKey) + Send + Sync>>,
}

impl std::fmt::Debug for ManagerInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivationManager")
            .field("silo", &self.silo)
            .field("activations", &self.slots.len())
            .finish()
    }
}

impl std::fmt::Debug for ActivationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.inner.fmt(f)
    }
}

impl ActivationManager {
    /// Create a manager for `silo`.
    pub fn new(
        silo: SiloId,
        registry: Arc<ActorTypeRegistry>,
        ring: Arc<RingState>,
        dlq: Arc<DeadLetterQueue>,
        telemetry: Arc<dyn Telemetry>,
        defaults: ActivationDefaults,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                silo,
                registry,
                ring,
                dlq,
                telemetry,
                defaults,
                slots: DashMap::new(),
                env: OnceLock::new(),
                shutting_down: AtomicBool::new(false),
                on_deactivated: OnceLock::new(),
            }),
        }
    }

    /// Wire the runtime environment contexts are built from (set once by the
    /// hosting silo before any envelope is posted).
    pub fn set_env(&self, env: Arc<dyn RuntimeEnv>) {
        let _ = self.inner.env.set(env);
    }

    /// Wire the deactivation listener (stream broker subscription cleanup).
    pub fn set_deactivation_listener(&self, listener: Arc<dyn Fn(&ActorKey) + Send + Sync>) {
        let _ = self.inner.on_deactivated.set(listener);
    }

    /// The ring owner of `key`, if the ring is non-empty.
    pub fn owner_of(&self, key: &ActorKey) -> Option<SiloId> {
        self.inner.ring.owner(key)
    }

    /// Whether this silo owns `key` on the current snapshot.
    pub fn is_local_owner(&self, key: &ActorKey) -> bool {
        self.owner_of(key).as_ref() == Some(&self.inner.silo)
    }

    /// Route one envelope to its local activation.
    ///
    /// Fails with `not-owner` when the ring places the key elsewhere (the
    /// caller retries against the owner), with `reentrancy` when the call
    /// chain already contains a non-re-entrant recipient, and with
    /// `throttled` when the mailbox rejected the envelope.
    pub async fn post(&self, envelope: Envelope) -> Result<(), InvokeError> {
        if self.inner.shutting_down.load(Ordering::Acquire) {
            return Err(InvokeError::new(
                ErrorKind::PeerShutdown,
                format!("silo {} is shutting down", self.inner.silo),
            ));
        }

        let key = envelope.recipient.clone();
        let owner = self.owner_of(&key).ok_or_else(|| {
            InvokeError::new(ErrorKind::RingRefresh, "placement ring is empty")
        })?;
        if owner != self.inner.silo {
            return Err(InvokeError::not_owner(format!(
                "{key} is owned by {owner}"
            )));
        }

        let descriptor = self
            .inner
            .registry
            .get(key.type_name())
            .ok_or_else(|| InvokeError::not_found(format!("unknown actor type {}", key.type_name())))?;

        // Call-chain guard. Stateless workers are exempt: a re-entering call
        // is served by another instance of the pool.
        let options = descriptor.options();
        if !options.reentrant && !options.stateless && envelope.chain.contains(&key) {
            return Err(InvokeError::new(
                ErrorKind::Reentrancy,
                format!("circular call {}", envelope.chain.describe_cycle(&key)),
            ));
        }

        let mut envelope = envelope;
        for _attempt in 0..3 {
            let Some(handle) = self.get_or_create(&key, &descriptor) else {
                continue;
            };
            match handle.sender.post(envelope).await {
                Ok(PostOutcome::Accepted) => return Ok(()),
                Ok(PostOutcome::Dropped(mut victim)) => {
                    victim.respond(Err(InvokeError::new(
                        ErrorKind::Throttled,
                        "dropped by mailbox overflow policy",
                    )));
                    return Ok(());
                }
                Err(PostError::Full { capacity, .. }) => {
                    return Err(InvokeError::new(
                        ErrorKind::Throttled,
                        format!("mailbox full (capacity {capacity})"),
                    )
                    .with_retry_after(Duration::from_millis(10)));
                }
                Err(PostError::Closed(recovered)) => {
                    // The activation was collected between resolve and post;
                    // drop the stale slot and retry against a fresh one.
                    self.remove_if_same(&key, &handle);
                    envelope = recovered;
                }
            }
        }
        Err(InvokeError::new(
            ErrorKind::Throttled,
            format!("could not place envelope for {key}"),
        ))
    }

    fn get_or_create(
        &self,
        key: &ActorKey,
        descriptor: &Arc<ActorTypeDescriptor>,
    ) -> Option<Arc<ActivationHandle>> {
        // The shard entry lock doubles as the per-key construction latch.
        let slot = self.inner.slots.entry(key.clone()).or_insert_with(|| {
            let options = descriptor.options();
            if options.stateless {
                let instances = (0..options.max_instances)
                    .map(|_| self.spawn_activation(key, descriptor))
                    .collect();
                Slot::Pool {
                    instances,
                    counter: AtomicUsize::new(0),
                }
            } else {
                Slot::Single(self.spawn_activation(key, descriptor))
            }
        });
        let picked = slot.pick();
        drop(slot);
        if picked.is_none() {
            // A fully drained pool slot; drop it so the next attempt
            // rebuilds the instances.
            self.inner.slots.remove_if(key, |_, slot| {
                matches!(slot, Slot::Pool { instances, .. } if instances.is_empty())
            });
        }
        picked
    }

    fn spawn_activation(
        &self,
        key: &ActorKey,
        descriptor: &Arc<ActorTypeDescriptor>,
    ) -> Arc<ActivationHandle> {
        let options = descriptor.options();
        let capacity = options
            .mailbox_capacity
            .unwrap_or(self.inner.defaults.mailbox_capacity)
            .max(1);
        let overflow = options.overflow.unwrap_or(self.inner.defaults.overflow);

        let (receiver, sender) = mailbox(capacity, overflow);
        let shared = Arc::new(ActivationShared::new(key.clone(), Arc::clone(descriptor)));
        let instance = descriptor.spawn(key);

        debug!(actor = %key, silo = %self.inner.silo, "spawning activation");
        let worker = tokio::spawn(dispatcher::run_worker(
            Arc::clone(&self.inner),
            Arc::clone(&shared),
            receiver,
            sender.clone(),
            instance,
        ));

        Arc::new(ActivationHandle::new(sender, shared, worker))
    }

    /// Record a supervisor link for a live activation.
    pub fn set_supervisor(&self, key: &ActorKey, supervisor: ActorKey) {
        if let Some(slot) = self.inner.slots.get(key) {
            for handle in slot.handles() {
                handle.shared.set_supervisor(supervisor.clone());
            }
        }
    }

    /// The supervisor of a live activation, if any.
    pub fn supervisor_of(&self, key: &ActorKey) -> Option<ActorKey> {
        self.inner
            .slots
            .get(key)
            .and_then(|slot| slot.handles().first().and_then(|h| h.shared.supervisor()))
    }

    /// Number of live activation slots (pools count once).
    pub fn active_count(&self) -> usize {
        self.inner.slots.len()
    }

    /// Whether an activation for `key` currently exists.
    pub fn is_active(&self, key: &ActorKey) -> bool {
        self.inner.slots.contains_key(key)
    }

    /// Collect activations idle past their TTL with empty mailboxes.
    pub fn collect_idle(&self) {
        let now = Utc::now();
        let mut victims = Vec::new();

        for entry in self.inner.slots.iter() {
            let handles = entry.value().handles();
            let Some(first) = handles.first() else {
                continue;
            };
            let ttl = first
                .shared
                .descriptor
                .options()
                .idle_ttl
                .unwrap_or(self.inner.defaults.idle_ttl);
            let cutoff = match chrono::Duration::from_std(ttl) {
                Ok(ttl) => now - ttl,
                Err(_) => continue,
            };
            let all_idle = handles
                .iter()
                .all(|handle| handle.is_idle() && handle.shared.idle_since() < cutoff);
            if all_idle {
                victims.push(entry.key().clone());
            }
        }

        for key in victims {
            debug!(actor = %key, "collecting idle activation");
            self.evict(&key, RejectMode::None);
        }
    }

    /// Drain and evict every activation whose ring owner is no longer this
    /// silo. Queued envelopes answer `not-owner` so callers re-resolve.
    pub fn drain_not_owned(&self) {
        let victims: Vec<ActorKey> = self
            .inner
            .slots
            .iter()
            .filter(|entry| {
                self.inner.ring.owner(entry.key()).as_ref() != Some(&self.inner.silo)
            })
            .map(|entry| entry.key().clone())
            .collect();

        for key in victims {
            debug!(actor = %key, "draining activation after ownership change");
            self.evict(&key, RejectMode::NotOwner);
        }
    }

    /// Close an activation's mailbox; its worker drains and deactivates.
    pub(crate) fn evict(&self, key: &ActorKey, mode: RejectMode) {
        if let Some((_, slot)) = self.inner.slots.remove(key) {
            for handle in slot.handles() {
                handle.close(mode);
            }
        }
    }

    pub(crate) fn remove_if_same(&self, key: &ActorKey, handle: &Arc<ActivationHandle>) {
        if let Some(mut slot) = self.inner.slots.get_mut(key) {
            if let Slot::Pool { instances, .. } = slot.value_mut() {
                instances.retain(|existing| !Arc::ptr_eq(&existing.shared, &handle.shared));
            }
        }
        self.inner.slots.remove_if(key, |_, slot| match slot {
            Slot::Single(existing) => Arc::ptr_eq(&existing.shared, &handle.shared),
            Slot::Pool { instances, .. } => instances.is_empty(),
        });
    }

    /// Stop all activations. With `drain` the workers finish queued
    /// envelopes; without it queued envelopes answer `peer-shutdown`.
    pub async fn stop(&self, drain: bool, timeout: Duration) {
        self.inner.shutting_down.store(true, Ordering::Release);

        let keys: Vec<ActorKey> = self.inner.slots.iter().map(|e| e.key().clone()).collect();
        let mut workers = Vec::new();
        for key in keys {
            if let Some((_, slot)) = self.inner.slots.remove(&key) {
                for handle in slot.handles() {
                    handle.close(if drain {
                        RejectMode::None
                    } else {
                        RejectMode::Terminated
                    });
                    if let Some(worker) = handle.take_worker() {
                        workers.push(worker);
                    }
                }
            }
        }

        let join_all = async {
            for worker in workers {
                let _ = worker.await;
            }
        };
        if tokio::time::timeout(timeout, join_all).await.is_err() {
            warn!(silo = %self.inner.silo, "activation drain timed out");
        }
    }
}

impl ManagerInner {
    /// Resolve a failure into a directive by consulting the supervisor
    /// chain. An escalation that runs off the top of the chain terminates
    /// the activation.
    pub(crate) fn resolve_directive(&self, key: &ActorKey, cause: FailureCause) -> Directive {
        let baseline = match cause {
            FailureCause::ActivationFailed => Directive::Stop,
            FailureCause::HandlerError => Directive::Resume,
            FailureCause::DeactivationFailed => Directive::Stop,
        };

        let mut current = key.clone();
        let mut depth = 0usize;
        loop {
            let supervisor = match self.supervisor_link(&current) {
                Some(supervisor) => supervisor,
                None => {
                    // Escalations that reached the root terminate.
                    return if depth > 0 { Directive::Stop } else { baseline };
                }
            };
            let policy = self
                .registry
                .get(supervisor.type_name())
                .map(|descriptor| descriptor.options().supervision)
                .unwrap_or_default();
            let directive = policy.directive_for(cause);
            if directive != Directive::Escalate {
                return directive;
            }
            current = supervisor;
            depth += 1;
            if depth > 16 {
                warn!(actor = %key, "supervision escalation depth exceeded, stopping");
                return Directive::Stop;
            }
        }
    }

    fn supervisor_link(&self, key: &ActorKey) -> Option<ActorKey> {
        self.slots
            .get(key)
            .and_then(|slot| slot.handles().first().and_then(|h| h.shared.supervisor()))
    }

    pub(crate) fn remove_worker_slot(&self, key: &ActorKey, shared: &Arc<ActivationShared>) {
        if let Some(mut slot) = self.slots.get_mut(key) {
            if let Slot::Pool { instances, .. } = slot.value_mut() {
                instances.retain(|handle| !Arc::ptr_eq(&handle.shared, shared));
            }
        }
        self.slots.remove_if(key, |_, slot| match slot {
            Slot::Single(existing) => Arc::ptr_eq(&existing.shared, shared),
            Slot::Pool { instances, .. } => instances.is_empty(),
        });
        if let Some(listener) = self.on_deactivated.get() {
            if !self.slots.contains_key(key) {
                listener(key);
            }
        }
    }
}
