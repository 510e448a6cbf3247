//! Typed facade over the versioned state-persistence contract.

// Layer 1: Standard library imports
use std::marker::PhantomData;
use std::sync::Arc;

// Layer 2: Third-party crate imports
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

// Layer 3: Internal module imports
use crate::codec::{self, Codec};
use crate::error::InvokeError;
use crate::monitoring::{names, Telemetry, TelemetryEvent};
use crate::storage::StateStore;
use crate::util::ActorKey;

/// A loaded payload together with its stored version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedState<T> {
    /// The decoded payload.
    pub value: T,
    /// Stored version (1 and up; 0 never appears on a loaded record).
    pub version: u64,
}

/// Per-activation handle to one named state record.
///
/// Tracks the version across loads and saves so actor code gets optimistic
/// concurrency without touching version numbers: the first save after an
/// absent load expects "absent", every later save expects the version the
/// cell last observed. On a conflict the cell is left unchanged; reload and
/// retry the actor-level logic.
pub struct StateCell<T> {
    actor: ActorKey,
    name: String,
    store: Arc<dyn StateStore>,
    codec: Arc<dyn Codec>,
    telemetry: Arc<dyn Telemetry>,
    value: Option<T>,
    version: u64,
    _marker: PhantomData<T>,
}

impl<T: Serialize + DeserializeOwned> StateCell<T> {
    /// Create a cell; nothing is loaded until [`StateCell::load`].
    pub fn new(
        actor: ActorKey,
        name: impl Into<String>,
        store: Arc<dyn StateStore>,
        codec: Arc<dyn Codec>,
        telemetry: Arc<dyn Telemetry>,
    ) -> Self {
        Self {
            actor,
            name: name.into(),
            store,
            codec,
            telemetry,
            value: None,
            version: 0,
            _marker: PhantomData,
        }
    }

    /// Refresh from the store; returns the loaded value, if any.
    pub async fn load(&mut self) -> Result<Option<&T>, InvokeError> {
        self.telemetry
            .record(TelemetryEvent::actor(names::STATE_LOAD, self.actor.clone()));

        match self.store.load(&self.actor, &self.name).await? {
            Some(record) => {
                let value: T = codec::decode(self.codec.as_ref(), &record.payload)?;
                self.version = record.version;
                self.value = Some(value);
            }
            None => {
                self.version = 0;
                self.value = None;
            }
        }
        Ok(self.value.as_ref())
    }

    /// Load and return the state with its version.
    pub async fn load_with_version(&mut self) -> Result<Option<PersistedState<T>>, InvokeError>
    where
        T: Clone,
    {
        self.load().await?;
        Ok(self.value.clone().map(|value| PersistedState {
            value,
            version: self.version,
        }))
    }

    /// Conditionally persist `value` against the last observed version.
    ///
    /// On success the new version is returned and cached; on a concurrency
    /// conflict the error carries the `concurrency-conflict` kind and the
    /// cell keeps its previous view.
    pub async fn save(&mut self, value: T) -> Result<u64, InvokeError> {
        let payload = codec::encode(self.codec.as_ref(), &value)?;
        let new_version = self
            .store
            .save(&self.actor, &self.name, payload, self.version)
            .await?;

        self.telemetry
            .record(TelemetryEvent::actor(names::STATE_SAVE, self.actor.clone()));
        debug!(actor = %self.actor, state = %self.name, version = new_version, "state saved");

        self.version = new_version;
        self.value = Some(value);
        Ok(new_version)
    }

    /// Conditionally delete the record and reset the cell.
    pub async fn clear(&mut self) -> Result<(), InvokeError> {
        self.store
            .delete(&self.actor, &self.name, self.version)
            .await?;
        self.version = 0;
        self.value = None;
        Ok(())
    }

    /// The cached value, if loaded or saved this activation.
    pub fn get(&self) -> Option<&T> {
        self.value.as_ref()
    }

    /// Last observed version; 0 means absent.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Whether a record was present at the last load/save.
    pub fn exists(&self) -> bool {
        self.version > 0
    }
}

impl<T> std::fmt::Debug for StateCell<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateCell")
            .field("actor", &self.actor)
            .field("name", &self.name)
            .field("version", &self.version)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Tests are allowed to use unwrap for simplicity
mod tests {
    use super::*;
    use crate::codec::JsonCodec;
    use crate::error::ErrorKind;
    use crate::monitoring::{InMemoryTelemetry, NoopTelemetry};
    use crate::storage::MemoryStateStore;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Balance {
        amount: i64,
    }

    fn cell(
        store: &Arc<MemoryStateStore>,
        telemetry: Arc<dyn Telemetry>,
    ) -> StateCell<Balance> {
        StateCell::new(
            ActorKey::new("Account", "a"),
            "balance",
            Arc::clone(store) as Arc<dyn StateStore>,
            Arc::new(JsonCodec),
            telemetry,
        )
    }

    #[tokio::test]
    async fn test_absent_then_first_save() {
        let store = Arc::new(MemoryStateStore::new());
        let mut cell = cell(&store, Arc::new(NoopTelemetry));

        assert!(cell.load().await.unwrap().is_none());
        assert_eq!(cell.version(), 0);

        let version = cell.save(Balance { amount: 100 }).await.unwrap();
        assert_eq!(version, 1);
        assert!(cell.exists());
        assert_eq!(cell.get().unwrap().amount, 100);
    }

    #[tokio::test]
    async fn test_conflict_surfaces_and_cell_recovers_by_reload() {
        let store = Arc::new(MemoryStateStore::new());

        let mut winner = cell(&store, Arc::new(NoopTelemetry));
        let mut loser = cell(&store, Arc::new(NoopTelemetry));

        winner.save(Balance { amount: 100 }).await.unwrap();
        winner.load().await.unwrap();
        loser.load().await.unwrap();

        // Both observed version 1; only one update can win.
        winner.save(Balance { amount: 150 }).await.unwrap();
        let err = loser.save(Balance { amount: 160 }).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConcurrencyConflict);

        // Loser reloads, recomputes, retries.
        loser.load().await.unwrap();
        assert_eq!(loser.get().unwrap().amount, 150);
        let version = loser.save(Balance { amount: 200 }).await.unwrap();
        assert_eq!(version, 3);
    }

    #[tokio::test]
    async fn test_clear_resets_version() {
        let store = Arc::new(MemoryStateStore::new());
        let mut cell = cell(&store, Arc::new(NoopTelemetry));

        cell.save(Balance { amount: 1 }).await.unwrap();
        cell.clear().await.unwrap();
        assert_eq!(cell.version(), 0);
        assert!(cell.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_load_save_emit_telemetry() {
        let store = Arc::new(MemoryStateStore::new());
        let telemetry = Arc::new(InMemoryTelemetry::default());
        let mut cell = cell(&store, Arc::clone(&telemetry) as Arc<dyn Telemetry>);

        cell.load().await.unwrap();
        cell.save(Balance { amount: 5 }).await.unwrap();

        assert_eq!(telemetry.count(names::STATE_LOAD), 1);
        assert_eq!(telemetry.count(names::STATE_SAVE), 1);
    }
}
