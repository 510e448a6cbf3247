//! In-memory reference implementations of the storage seams.
//!
//! These back the test suites and single-process deployments. They are
//! shared (`Arc`) across the silos of one in-process cluster, which is what
//! gives restarted silos durable reads in the membership-change tests.

// Layer 1: Standard library imports
use std::fmt::Debug;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

// Layer 3: Internal module imports
use super::error::StorageError;
use super::traits::{
    InboxStore, OutboxMessage, OutboxStatus, OutboxStore, ReminderStore, StateRecord, StateStore,
};
use crate::reminder::Reminder;
use crate::util::{ActorKey, MessageId};

fn state_key(actor: &ActorKey, state_name: &str) -> (String, String) {
    (actor.to_string(), state_name.to_string())
}

fn reminder_key(actor: &ActorKey, name: &str) -> (String, String) {
    (actor.to_string(), name.to_string())
}

/// Compare-and-set state store over a concurrent map.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    records: DashMap<(String, String), StateRecord>,
}

impl MemoryStateStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records (tests).
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(
        &self,
        actor: &ActorKey,
        state_name: &str,
    ) -> Result<Option<StateRecord>, StorageError> {
        Ok(self
            .records
            .get(&state_key(actor, state_name))
            .map(|record| record.clone()))
    }

    async fn save(
        &self,
        actor: &ActorKey,
        state_name: &str,
        payload: Bytes,
        expected: u64,
    ) -> Result<u64, StorageError> {
        // The entry guard makes the compare-and-set atomic per key.
        let entry = self.records.entry(state_key(actor, state_name));
        match entry {
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                if expected != 0 {
                    return Err(StorageError::Concurrency {
                        expected,
                        actual: 0,
                    });
                }
                vacant.insert(StateRecord {
                    payload,
                    version: 1,
                    updated_at: Utc::now(),
                });
                Ok(1)
            }
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                let actual = occupied.get().version;
                if expected != actual {
                    return Err(StorageError::Concurrency { expected, actual });
                }
                let next = actual + 1;
                occupied.insert(StateRecord {
                    payload,
                    version: next,
                    updated_at: Utc::now(),
                });
                Ok(next)
            }
        }
    }

    async fn delete(
        &self,
        actor: &ActorKey,
        state_name: &str,
        expected: u64,
    ) -> Result<(), StorageError> {
        let entry = self.records.entry(state_key(actor, state_name));
        match entry {
            dashmap::mapref::entry::Entry::Vacant(_) => {
                if expected != 0 {
                    return Err(StorageError::Concurrency {
                        expected,
                        actual: 0,
                    });
                }
                Ok(())
            }
            dashmap::mapref::entry::Entry::Occupied(occupied) => {
                let actual = occupied.get().version;
                if expected != actual {
                    return Err(StorageError::Concurrency { expected, actual });
                }
                occupied.remove();
                Ok(())
            }
        }
    }
}

/// Reminder table over a concurrent map.
#[derive(Debug, Default)]
pub struct MemoryReminderStore {
    reminders: DashMap<(String, String), Reminder>,
}

impl MemoryReminderStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReminderStore for MemoryReminderStore {
    async fn upsert(&self, reminder: Reminder) -> Result<(), StorageError> {
        self.reminders.insert(
            reminder_key(&reminder.actor, &reminder.name),
            reminder,
        );
        Ok(())
    }

    async fn remove(&self, actor: &ActorKey, name: &str) -> Result<bool, StorageError> {
        Ok(self.reminders.remove(&reminder_key(actor, name)).is_some())
    }

    async fn get(&self, actor: &ActorKey, name: &str) -> Result<Option<Reminder>, StorageError> {
        Ok(self
            .reminders
            .get(&reminder_key(actor, name))
            .map(|reminder| reminder.clone()))
    }

    async fn due(&self, now: DateTime<Utc>) -> Result<Vec<Reminder>, StorageError> {
        let mut due: Vec<Reminder> = self
            .reminders
            .iter()
            .filter(|entry| entry.next_fire <= now)
            .map(|entry| entry.clone())
            .collect();
        due.sort_by_key(|reminder| reminder.next_fire);
        Ok(due)
    }

    async fn list_for(&self, actor: &ActorKey) -> Result<Vec<Reminder>, StorageError> {
        let prefix = actor.to_string();
        let mut list: Vec<Reminder> = self
            .reminders
            .iter()
            .filter(|entry| entry.key().0 == prefix)
            .map(|entry| entry.clone())
            .collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(list)
    }

    async fn record_fired(
        &self,
        actor: &ActorKey,
        name: &str,
        fired_at: DateTime<Utc>,
        next_fire: Option<DateTime<Utc>>,
    ) -> Result<bool, StorageError> {
        match next_fire {
            Some(next) => {
                let mut entry = match self.reminders.get_mut(&reminder_key(actor, name)) {
                    Some(entry) => entry,
                    None => return Ok(false),
                };
                entry.last_fired = Some(fired_at);
                entry.next_fire = next;
                Ok(true)
            }
            None => Ok(self.reminders.remove(&reminder_key(actor, name)).is_some()),
        }
    }
}

/// Outbox table over a concurrent map.
#[derive(Debug, Default)]
pub struct MemoryOutboxStore {
    rows: DashMap<MessageId, OutboxMessage>,
}

impl MemoryOutboxStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OutboxStore for MemoryOutboxStore {
    async fn enqueue(&self, payload: Bytes) -> Result<MessageId, StorageError> {
        let id = MessageId::new();
        let now = Utc::now();
        self.rows.insert(
            id,
            OutboxMessage {
                id,
                payload,
                enqueued_at: now,
                attempts: 0,
                next_attempt_at: now,
                status: OutboxStatus::Pending,
            },
        );
        Ok(id)
    }

    async fn pending(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<OutboxMessage>, StorageError> {
        let mut rows: Vec<OutboxMessage> = self
            .rows
            .iter()
            .filter(|row| row.status == OutboxStatus::Pending && row.next_attempt_at <= now)
            .map(|row| row.clone())
            .collect();
        rows.sort_by_key(|row| row.enqueued_at);
        rows.truncate(limit);
        Ok(rows)
    }

    async fn mark_sent(&self, id: &MessageId) -> Result<(), StorageError> {
        if let Some(mut row) = self.rows.get_mut(id) {
            row.status = OutboxStatus::Sent;
        }
        Ok(())
    }

    async fn mark_retry(
        &self,
        id: &MessageId,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        if let Some(mut row) = self.rows.get_mut(id) {
            row.attempts += 1;
            row.next_attempt_at = next_attempt_at;
        }
        Ok(())
    }

    async fn mark_failed(&self, id: &MessageId) -> Result<(), StorageError> {
        if let Some(mut row) = self.rows.get_mut(id) {
            row.attempts += 1;
            row.status = OutboxStatus::Failed;
        }
        Ok(())
    }

    async fn get(&self, id: &MessageId) -> Result<Option<OutboxMessage>, StorageError> {
        Ok(self.rows.get(id).map(|row| row.clone()))
    }
}

/// Inbound dedup table with time-bounded retention.
#[derive(Debug, Default)]
pub struct MemoryInboxStore {
    seen: DashMap<(String, MessageId), DateTime<Utc>>,
}

impl MemoryInboxStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InboxStore for MemoryInboxStore {
    async fn observe(
        &self,
        actor: &ActorKey,
        message_id: &MessageId,
        now: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let key = (actor.to_string(), *message_id);
        match self.seen.entry(key) {
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(now);
                Ok(true)
            }
            dashmap::mapref::entry::Entry::Occupied(_) => Ok(false),
        }
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, StorageError> {
        let before = self.seen.len();
        self.seen.retain(|_, seen_at| *seen_at >= cutoff);
        Ok(before - self.seen.len())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Tests are allowed to use unwrap for simplicity
mod tests {
    use super::*;

    fn actor(id: &str) -> ActorKey {
        ActorKey::new("Account", id)
    }

    #[tokio::test]
    async fn test_state_first_save_requires_absent() {
        let store = MemoryStateStore::new();
        let key = actor("a");

        let version = store
            .save(&key, "balance", Bytes::from_static(b"100"), 0)
            .await
            .unwrap();
        assert_eq!(version, 1);

        // A second expected-absent save conflicts.
        let err = store
            .save(&key, "balance", Bytes::from_static(b"150"), 0)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StorageError::Concurrency {
                expected: 0,
                actual: 1
            }
        ));
    }

    #[tokio::test]
    async fn test_state_versioned_update_chain() {
        let store = MemoryStateStore::new();
        let key = actor("a");

        assert_eq!(
            store
                .save(&key, "s", Bytes::from_static(b"1"), 0)
                .await
                .unwrap(),
            1
        );
        assert_eq!(
            store
                .save(&key, "s", Bytes::from_static(b"2"), 1)
                .await
                .unwrap(),
            2
        );

        let record = store.load(&key, "s").await.unwrap().unwrap();
        assert_eq!(record.version, 2);
        assert_eq!(&record.payload[..], b"2");
    }

    #[tokio::test]
    async fn test_state_conflict_leaves_record_unchanged() {
        let store = MemoryStateStore::new();
        let key = actor("a");
        store
            .save(&key, "s", Bytes::from_static(b"good"), 0)
            .await
            .unwrap();

        let err = store
            .save(&key, "s", Bytes::from_static(b"stale"), 7)
            .await
            .unwrap_err();
        assert!(err.is_concurrency());

        let record = store.load(&key, "s").await.unwrap().unwrap();
        assert_eq!(&record.payload[..], b"good");
        assert_eq!(record.version, 1);
    }

    #[tokio::test]
    async fn test_state_concurrent_savers_one_wins() {
        let store = std::sync::Arc::new(MemoryStateStore::new());
        let key = actor("a");
        store
            .save(&key, "s", Bytes::from_static(b"base"), 0)
            .await
            .unwrap();

        let mut tasks = Vec::new();
        for i in 0..8u32 {
            let store = std::sync::Arc::clone(&store);
            let key = key.clone();
            tasks.push(tokio::spawn(async move {
                store
                    .save(&key, "s", Bytes::from(format!("w{i}")), 1)
                    .await
            }));
        }

        let mut wins = 0;
        for task in tasks {
            if task.await.unwrap().is_ok() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
        assert_eq!(store.load(&key, "s").await.unwrap().unwrap().version, 2);
    }

    #[tokio::test]
    async fn test_state_delete_with_version_check() {
        let store = MemoryStateStore::new();
        let key = actor("a");
        store
            .save(&key, "s", Bytes::from_static(b"x"), 0)
            .await
            .unwrap();

        let err = store.delete(&key, "s", 9).await.unwrap_err();
        assert!(err.is_concurrency());

        store.delete(&key, "s", 1).await.unwrap();
        assert!(store.load(&key, "s").await.unwrap().is_none());

        // Deleting an absent record with expected 0 is a no-op.
        store.delete(&key, "s", 0).await.unwrap();
    }

    #[tokio::test]
    async fn test_reminder_due_and_record_fired() {
        let store = MemoryReminderStore::new();
        let key = actor("o-1");
        let now = Utc::now();

        store
            .upsert(Reminder::periodic(
                key.clone(),
                "daily",
                now,
                std::time::Duration::from_secs(10),
            ))
            .await
            .unwrap();

        let due = store.due(now + chrono::Duration::seconds(1)).await.unwrap();
        assert_eq!(due.len(), 1);

        let next = now + chrono::Duration::seconds(10);
        let existed = store
            .record_fired(&key, "daily", now, Some(next))
            .await
            .unwrap();
        assert!(existed);

        let stored = store.get(&key, "daily").await.unwrap().unwrap();
        assert_eq!(stored.next_fire, next);
        assert_eq!(stored.last_fired, Some(now));

        // No longer due until the next period.
        assert!(store
            .due(now + chrono::Duration::seconds(1))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_reminder_one_shot_unregisters() {
        let store = MemoryReminderStore::new();
        let key = actor("o-1");
        let now = Utc::now();

        store
            .upsert(Reminder::one_shot(key.clone(), "once", now))
            .await
            .unwrap();
        store
            .record_fired(&key, "once", now, None)
            .await
            .unwrap();

        assert!(store.get(&key, "once").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_outbox_lifecycle() {
        let store = MemoryOutboxStore::new();
        let id = store.enqueue(Bytes::from_static(b"evt")).await.unwrap();

        let now = Utc::now();
        let pending = store.pending(now, 10).await.unwrap();
        assert_eq!(pending.len(), 1);

        store
            .mark_retry(&id, now + chrono::Duration::seconds(5))
            .await
            .unwrap();
        assert!(store.pending(now, 10).await.unwrap().is_empty());

        store.mark_sent(&id).await.unwrap();
        let row = store.get(&id).await.unwrap().unwrap();
        assert_eq!(row.status, OutboxStatus::Sent);
        assert_eq!(row.attempts, 1);
    }

    #[tokio::test]
    async fn test_inbox_dedup_and_purge() {
        let store = MemoryInboxStore::new();
        let key = actor("a");
        let id = MessageId::new();
        let now = Utc::now();

        assert!(store.observe(&key, &id, now).await.unwrap());
        assert!(!store.observe(&key, &id, now).await.unwrap());

        let purged = store
            .purge_older_than(now + chrono::Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(purged, 1);

        // After purge the id reads as fresh again.
        assert!(store.observe(&key, &id, now).await.unwrap());
    }
}
