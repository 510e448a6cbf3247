// Layer 1: Standard library imports
use std::fmt::Debug;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

// Layer 3: Internal module imports
use super::error::StorageError;
use crate::reminder::Reminder;
use crate::util::{ActorKey, MessageId};

/// One persisted state record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateRecord {
    /// Opaque payload bytes emitted by the codec.
    pub payload: Bytes,
    /// Strictly increasing version, starting at 1.
    pub version: u64,
    /// Last accepted write time.
    pub updated_at: DateTime<Utc>,
}

/// Durable actor-state store with compare-and-set writes.
///
/// Required guarantees: conditional write semantics on the version, and
/// durable read-your-writes per key. Per-key monotonic timestamps are not
/// required.
#[async_trait]
pub trait StateStore: Send + Sync + Debug {
    /// Load the record for `(actor, state_name)`, or `None` if absent.
    async fn load(
        &self,
        actor: &ActorKey,
        state_name: &str,
    ) -> Result<Option<StateRecord>, StorageError>;

    /// Conditionally write a record.
    ///
    /// `expected` 0 requires the record to be absent; any other value must
    /// equal the stored version. On success the new version
    /// (`expected + 1`) is returned; on conflict the record is unchanged and
    /// [`StorageError::Concurrency`] is raised.
    async fn save(
        &self,
        actor: &ActorKey,
        state_name: &str,
        payload: Bytes,
        expected: u64,
    ) -> Result<u64, StorageError>;

    /// Conditionally delete a record. `expected` follows [`Self::save`];
    /// deleting an absent record with `expected` 0 is a no-op.
    async fn delete(
        &self,
        actor: &ActorKey,
        state_name: &str,
        expected: u64,
    ) -> Result<(), StorageError>;
}

/// Durable reminder table keyed by `(actor, name)`.
#[async_trait]
pub trait ReminderStore: Send + Sync + Debug {
    /// Insert or replace a reminder.
    async fn upsert(&self, reminder: Reminder) -> Result<(), StorageError>;

    /// Remove a reminder; returns whether it existed.
    async fn remove(&self, actor: &ActorKey, name: &str) -> Result<bool, StorageError>;

    /// Fetch one reminder.
    async fn get(&self, actor: &ActorKey, name: &str) -> Result<Option<Reminder>, StorageError>;

    /// All reminders with `next_fire <= now`, any owner.
    async fn due(&self, now: DateTime<Utc>) -> Result<Vec<Reminder>, StorageError>;

    /// All reminders registered by one actor.
    async fn list_for(&self, actor: &ActorKey) -> Result<Vec<Reminder>, StorageError>;

    /// Record a firing, conditional on the reminder still existing.
    ///
    /// `next_fire` `None` unregisters a one-shot. Returns whether the
    /// reminder still existed.
    async fn record_fired(
        &self,
        actor: &ActorKey,
        name: &str,
        fired_at: DateTime<Utc>,
        next_fire: Option<DateTime<Utc>>,
    ) -> Result<bool, StorageError>;
}

/// Delivery status of one outbox row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboxStatus {
    /// Waiting for the drain worker.
    Pending,
    /// Delivered to the sink.
    Sent,
    /// Gave up after max retries; kept for inspection.
    Failed,
}

/// One outbox row.
#[derive(Debug, Clone)]
pub struct OutboxMessage {
    /// Assigned id, also the dedup key for downstream inboxes.
    pub id: MessageId,
    /// Opaque payload for the sink.
    pub payload: Bytes,
    /// When the row was enqueued.
    pub enqueued_at: DateTime<Utc>,
    /// Delivery attempts so far.
    pub attempts: u32,
    /// Earliest time the next attempt may run.
    pub next_attempt_at: DateTime<Utc>,
    /// Current status.
    pub status: OutboxStatus,
}

/// Durable at-least-once outbox.
#[async_trait]
pub trait OutboxStore: Send + Sync + Debug {
    /// Persist a message for later delivery.
    async fn enqueue(&self, payload: Bytes) -> Result<MessageId, StorageError>;

    /// Pending rows whose `next_attempt_at <= now`, oldest first.
    async fn pending(&self, now: DateTime<Utc>, limit: usize)
        -> Result<Vec<OutboxMessage>, StorageError>;

    /// Mark a row delivered.
    async fn mark_sent(&self, id: &MessageId) -> Result<(), StorageError>;

    /// Record a failed attempt and schedule the next one.
    async fn mark_retry(
        &self,
        id: &MessageId,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    /// Mark a row terminally failed.
    async fn mark_failed(&self, id: &MessageId) -> Result<(), StorageError>;

    /// Fetch one row (diagnostics and tests).
    async fn get(&self, id: &MessageId) -> Result<Option<OutboxMessage>, StorageError>;
}

/// Inbound dedup table for at-least-once integration.
#[async_trait]
pub trait InboxStore: Send + Sync + Debug {
    /// Record `(actor, message_id)`; returns `true` the first time, `false`
    /// for a duplicate within the retention window.
    async fn observe(
        &self,
        actor: &ActorKey,
        message_id: &MessageId,
        now: DateTime<Utc>,
    ) -> Result<bool, StorageError>;

    /// Drop entries older than `cutoff`; returns how many were purged.
    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, StorageError>;
}
