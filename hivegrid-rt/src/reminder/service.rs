//! Per-silo reminder tick loop.
//!
//! Each tick queries the durable table for due reminders, keeps only those
//! whose actor this silo owns on the current ring, enqueues a synthetic
//! reminder envelope, and advances (or unregisters) the reminder. Failures
//! are logged, never retried inside the tick: the next tick picks up
//! stragglers, which is where the at-least-once guarantee comes from. After
//! a membership change, the new owner's filter picks the reminder up on its
//! next tick and the old owner's filter drops it.

// Layer 1: Standard library imports
use std::sync::Arc;
use std::time::Duration;

// Layer 2: Third-party crate imports
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

// Layer 3: Internal module imports
use crate::activation::ActivationManager;
use crate::message::Envelope;
use crate::monitoring::{names, Telemetry, TelemetryEvent};
use crate::ring::RingState;
use crate::storage::ReminderStore;
use crate::util::SiloId;

/// Default tick interval.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Reminder service tuning.
#[derive(Debug, Clone)]
pub struct ReminderServiceConfig {
    /// Interval between due-reminder scans.
    pub tick_interval: Duration,
}

impl Default for ReminderServiceConfig {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
        }
    }
}

/// The per-silo tick worker.
pub struct ReminderService {
    silo: SiloId,
    store: Arc<dyn ReminderStore>,
    ring: Arc<RingState>,
    manager: Arc<ActivationManager>,
    telemetry: Arc<dyn Telemetry>,
    config: ReminderServiceConfig,
    shutdown: watch::Sender<bool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ReminderService {
    /// Create a service for `silo`.
    pub fn new(
        silo: SiloId,
        store: Arc<dyn ReminderStore>,
        ring: Arc<RingState>,
        manager: Arc<ActivationManager>,
        telemetry: Arc<dyn Telemetry>,
        config: ReminderServiceConfig,
    ) -> Arc<Self> {
        let (shutdown, _) = watch::channel(false);
        Arc::new(Self {
            silo,
            store,
            ring,
            manager,
            telemetry,
            config,
            shutdown,
            worker: Mutex::new(None),
        })
    }

    /// Start the tick loop on its own worker (idempotent).
    pub fn start(self: &Arc<Self>) {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return;
        }
        let service = Arc::clone(self);
        let mut shutdown = self.shutdown.subscribe();
        *worker = Some(tokio::spawn(async move {
            loop {
                if *shutdown.borrow() {
                    break;
                }
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = tokio::time::sleep(service.config.tick_interval) => {
                        service.tick().await;
                    }
                }
            }
        }));
    }

    /// Stop the tick loop (idempotent).
    pub async fn stop(&self) {
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            let _ = self.shutdown.send(true);
            let _ = handle.await;
        }
    }

    /// Run one tick inline (tests).
    pub async fn tick(&self) {
        self.telemetry
            .record(TelemetryEvent::now(names::REMINDER_TICK));

        let now = Utc::now();
        let due = match self.store.due(now).await {
            Ok(due) => due,
            Err(err) => {
                warn!(silo = %self.silo, error = %err, "reminder scan failed");
                return;
            }
        };

        for reminder in due {
            // Ownership follows the ring, so a hand-off needs no explicit
            // lease transfer: the filter flips on the next tick.
            if self.ring.owner(&reminder.actor).as_ref() != Some(&self.silo) {
                continue;
            }

            let fired_at = now;
            let envelope = Envelope::reminder(
                reminder.actor.clone(),
                reminder.name.clone(),
                reminder.last_fired,
                fired_at,
            );
            if let Err(err) = self.manager.post(envelope).await {
                // Leave next_fire untouched so the next tick retries.
                warn!(
                    actor = %reminder.actor,
                    reminder = %reminder.name,
                    error = %err,
                    "reminder delivery failed"
                );
                continue;
            }

            debug!(actor = %reminder.actor, reminder = %reminder.name, "reminder fired");
            let next_fire = reminder.next_after(fired_at);
            match self
                .store
                .record_fired(&reminder.actor, &reminder.name, fired_at, next_fire)
                .await
            {
                Ok(_still_exists) => {}
                Err(err) => {
                    warn!(
                        actor = %reminder.actor,
                        reminder = %reminder.name,
                        error = %err,
                        "reminder bookkeeping failed"
                    );
                }
            }
        }
    }
}

impl std::fmt::Debug for ReminderService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReminderService")
            .field("silo", &self.silo)
            .field("tick_interval", &self.config.tick_interval)
            .finish()
    }
}
