// Layer 1: Standard library imports
use std::sync::atomic::{AtomicI64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

// Layer 2: Third-party crate imports
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::task::JoinHandle;

// Layer 3: Internal module imports
use crate::actor::ActorTypeDescriptor;
use crate::mailbox::MailboxSender;
use crate::util::ActorKey;

/// Rejection mode applied to envelopes once an activation is condemned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RejectMode {
    /// Normal operation; envelopes are dispatched.
    None,
    /// The ring owner moved away; callers must re-resolve.
    NotOwner,
    /// Supervision terminated the activation.
    Terminated,
}

impl RejectMode {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::NotOwner,
            2 => Self::Terminated,
            _ => Self::None,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::None => 0,
            Self::NotOwner => 1,
            Self::Terminated => 2,
        }
    }
}

/// State shared between an activation's worker and the manager.
#[derive(Debug)]
pub(crate) struct ActivationShared {
    pub(crate) key: ActorKey,
    pub(crate) descriptor: Arc<ActorTypeDescriptor>,
    /// Epoch milliseconds of the last dispatched envelope.
    last_activity: AtomicI64,
    /// Envelopes currently being processed (0 or 1 unless re-entrant).
    inflight: AtomicUsize,
    /// Rejection mode for condemned activations.
    reject: AtomicU8,
    /// Supervisor link, held by key identity only.
    supervisor: Mutex<Option<ActorKey>>,
}

impl ActivationShared {
    pub(crate) fn new(key: ActorKey, descriptor: Arc<ActorTypeDescriptor>) -> Self {
        Self {
            key,
            descriptor,
            last_activity: AtomicI64::new(Utc::now().timestamp_millis()),
            inflight: AtomicUsize::new(0),
            reject: AtomicU8::new(RejectMode::None.as_u8()),
            supervisor: Mutex::new(None),
        }
    }

    pub(crate) fn touch(&self) {
        self.last_activity
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub(crate) fn idle_since(&self) -> DateTime<Utc> {
        let millis = self.last_activity.load(Ordering::Relaxed);
        DateTime::<Utc>::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
    }

    pub(crate) fn begin_dispatch(&self) {
        self.inflight.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn end_dispatch(&self) {
        self.inflight.fetch_sub(1, Ordering::AcqRel);
    }

    pub(crate) fn inflight(&self) -> usize {
        self.inflight.load(Ordering::Acquire)
    }

    pub(crate) fn condemn(&self, mode: RejectMode) {
        self.reject.store(mode.as_u8(), Ordering::Release);
    }

    pub(crate) fn reject_mode(&self) -> RejectMode {
        RejectMode::from_u8(self.reject.load(Ordering::Acquire))
    }

    pub(crate) fn set_supervisor(&self, supervisor: ActorKey) {
        *self.supervisor.lock() = Some(supervisor);
    }

    pub(crate) fn supervisor(&self) -> Option<ActorKey> {
        self.supervisor.lock().clone()
    }
}

/// Manager-side handle to one running activation.
#[derive(Debug)]
pub(crate) struct ActivationHandle {
    pub(crate) sender: MailboxSender,
    pub(crate) shared: Arc<ActivationShared>,
    pub(crate) worker: Mutex<Option<JoinHandle<()>>>,
}

impl ActivationHandle {
    pub(crate) fn new(
        sender: MailboxSender,
        shared: Arc<ActivationShared>,
        worker: JoinHandle<()>,
    ) -> Self {
        Self {
            sender,
            shared,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Close the mailbox; the worker drains and exits.
    pub(crate) fn close(&self, mode: RejectMode) {
        if mode != RejectMode::None {
            self.shared.condemn(mode);
        }
        self.sender.close();
    }

    /// Take the worker join handle (shutdown waits on it).
    pub(crate) fn take_worker(&self) -> Option<JoinHandle<()>> {
        self.worker.lock().take()
    }

    /// Whether the activation is idle: nothing queued, nothing in flight.
    pub(crate) fn is_idle(&self) -> bool {
        self.sender.depth() == 0 && self.shared.inflight() == 0
    }
}
