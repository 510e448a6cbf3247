//! Inbound dedup facade over an [`InboxStore`].

// Layer 1: Standard library imports
use std::sync::Arc;
use std::time::Duration;

// Layer 2: Third-party crate imports
use chrono::Utc;
use tracing::debug;

// Layer 3: Internal module imports
use super::error::StorageError;
use super::traits::InboxStore;
use crate::util::{ActorKey, MessageId};

/// Deduplicates `(actor, message-id)` pairs within a retention window.
#[derive(Debug)]
pub struct Inbox {
    store: Arc<dyn InboxStore>,
    retention: Duration,
}

impl Inbox {
    /// Create an inbox with the given retention window.
    pub fn new(store: Arc<dyn InboxStore>, retention: Duration) -> Self {
        Self { store, retention }
    }

    /// Record a delivery; returns `true` if it is the first within retention.
    pub async fn observe(
        &self,
        actor: &ActorKey,
        message_id: &MessageId,
    ) -> Result<bool, StorageError> {
        self.store.observe(actor, message_id, Utc::now()).await
    }

    /// Drop entries older than the retention window.
    pub async fn purge(&self) -> Result<usize, StorageError> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.retention)
                .unwrap_or_else(|_| chrono::Duration::days(1));
        let purged = self.store.purge_older_than(cutoff).await?;
        if purged > 0 {
            debug!(purged, "inbox retention purge");
        }
        Ok(purged)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Tests are allowed to use unwrap for simplicity
mod tests {
    use super::*;
    use crate::storage::memory::MemoryInboxStore;

    #[tokio::test]
    async fn test_observe_dedups() {
        let inbox = Inbox::new(
            Arc::new(MemoryInboxStore::new()),
            Duration::from_secs(3600),
        );
        let actor = ActorKey::new("Order", "o-1");
        let id = MessageId::new();

        assert!(inbox.observe(&actor, &id).await.unwrap());
        assert!(!inbox.observe(&actor, &id).await.unwrap());

        // A different message id is fresh.
        assert!(inbox.observe(&actor, &MessageId::new()).await.unwrap());
    }

    #[tokio::test]
    async fn test_purge_forgets_old_entries() {
        let inbox = Inbox::new(Arc::new(MemoryInboxStore::new()), Duration::ZERO);
        let actor = ActorKey::new("Order", "o-1");
        let id = MessageId::new();

        inbox.observe(&actor, &id).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(inbox.purge().await.unwrap(), 1);
        assert!(inbox.observe(&actor, &id).await.unwrap());
    }
}
