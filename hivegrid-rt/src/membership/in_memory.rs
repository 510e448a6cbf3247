//! In-process membership hub shared by the silos of one test cluster.
//!
//! Tracks heartbeats and declares silos dead after `dead_after` without a
//! beat. The sweep runs piggybacked on `beat` and `list` calls, so liveness
//! detection works as long as at least one live silo keeps beating; no
//! background task is required.

// Layer 1: Standard library imports
use std::sync::Arc;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::{debug, warn};

// Layer 3: Internal module imports
use super::traits::{Membership, MembershipError};
use super::types::{MembershipEvent, SiloInfo, SiloStatus};
use crate::util::SiloId;

/// Default interval silos are expected to beat at.
pub const DEFAULT_HEARTBEAT_INTERVAL: std::time::Duration = std::time::Duration::from_millis(500);

/// Default grace before a silent silo is declared dead.
pub const DEFAULT_DEAD_AFTER: std::time::Duration = std::time::Duration::from_millis(1500);

/// Tuning for the in-memory hub.
#[derive(Debug, Clone)]
pub struct MembershipConfig {
    /// Expected heartbeat interval (informational; silos drive the clock).
    pub heartbeat_interval: std::time::Duration,
    /// A silo with no beat for this long is marked dead.
    pub dead_after: std::time::Duration,
}

impl Default for MembershipConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            dead_after: DEFAULT_DEAD_AFTER,
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    info: SiloInfo,
    last_beat: DateTime<Utc>,
}

/// In-memory membership provider.
#[derive(Debug)]
pub struct InMemoryMembership {
    entries: DashMap<SiloId, Entry>,
    events: broadcast::Sender<MembershipEvent>,
    config: MembershipConfig,
}

impl InMemoryMembership {
    /// Create a hub with the given tuning.
    pub fn new(config: MembershipConfig) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        Arc::new(Self {
            entries: DashMap::new(),
            events,
            config,
        })
    }

    /// Create a hub with default tuning.
    pub fn with_defaults() -> Arc<Self> {
        Self::new(MembershipConfig::default())
    }

    fn emit(&self, event: MembershipEvent) {
        // No subscribers yet is fine; the send result is intentionally ignored.
        let _ = self.events.send(event);
    }

    /// Declare silos dead when their last beat is too old.
    fn sweep(&self, now: DateTime<Utc>) {
        let cutoff = match ChronoDuration::from_std(self.config.dead_after) {
            Ok(d) => now - d,
            Err(_) => return,
        };

        let mut newly_dead = Vec::new();
        for mut entry in self.entries.iter_mut() {
            if entry.info.status == SiloStatus::Active && entry.last_beat < cutoff {
                entry.info.status = SiloStatus::Dead;
                newly_dead.push(entry.info.clone());
            }
        }

        for info in newly_dead {
            warn!(silo = %info.id, "silo missed heartbeats, marking dead");
            self.emit(MembershipEvent::StatusChanged(info));
        }
    }

    /// Mark a silo draining (graceful shutdown in progress).
    pub fn set_draining(&self, id: &SiloId) {
        if let Some(mut entry) = self.entries.get_mut(id) {
            entry.info.status = SiloStatus::Draining;
            let info = entry.info.clone();
            drop(entry);
            self.emit(MembershipEvent::StatusChanged(info));
        }
    }
}

#[async_trait]
impl Membership for InMemoryMembership {
    async fn join(&self, info: SiloInfo) -> Result<(), MembershipError> {
        debug!(silo = %info.id, endpoint = %info.endpoint, "silo joining");
        self.entries.insert(
            info.id.clone(),
            Entry {
                info: info.clone(),
                last_beat: Utc::now(),
            },
        );
        self.emit(MembershipEvent::Joined(info));
        Ok(())
    }

    async fn leave(&self, id: &SiloId) -> Result<(), MembershipError> {
        match self.entries.remove(id) {
            Some(_) => {
                debug!(silo = %id, "silo left");
                self.emit(MembershipEvent::Left(id.clone()));
                Ok(())
            }
            None => Err(MembershipError::UnknownSilo(id.clone())),
        }
    }

    async fn beat(&self, id: &SiloId) -> Result<(), MembershipError> {
        let now = Utc::now();
        {
            let mut entry = self
                .entries
                .get_mut(id)
                .ok_or_else(|| MembershipError::UnknownSilo(id.clone()))?;
            entry.last_beat = now;
        }
        self.sweep(now);
        Ok(())
    }

    async fn list(&self) -> Vec<SiloInfo> {
        self.sweep(Utc::now());
        let mut infos: Vec<SiloInfo> = self
            .entries
            .iter()
            .map(|entry| entry.info.clone())
            .collect();
        infos.sort_by(|a, b| a.id.cmp(&b.id));
        infos
    }

    fn subscribe(&self) -> broadcast::Receiver<MembershipEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)] // Tests are allowed to use unwrap for simplicity
mod tests {
    use super::*;
    use crate::membership::traits::active_silos;

    fn info(name: &str) -> SiloInfo {
        SiloInfo::active(SiloId::new(name), format!("local:{name}"))
    }

    #[tokio::test]
    async fn test_join_list_leave() {
        let hub = InMemoryMembership::with_defaults();

        hub.join(info("s1")).await.unwrap();
        hub.join(info("s2")).await.unwrap();
        assert_eq!(hub.list().await.len(), 2);

        hub.leave(&SiloId::new("s1")).await.unwrap();
        let remaining = hub.list().await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id.as_str(), "s2");
    }

    #[tokio::test]
    async fn test_leave_unknown_fails() {
        let hub = InMemoryMembership::with_defaults();
        let err = hub.leave(&SiloId::new("ghost")).await.unwrap_err();
        assert!(matches!(err, MembershipError::UnknownSilo(_)));
    }

    #[tokio::test]
    async fn test_events_on_join_and_leave() {
        let hub = InMemoryMembership::with_defaults();
        let mut events = hub.subscribe();

        hub.join(info("s1")).await.unwrap();
        hub.leave(&SiloId::new("s1")).await.unwrap();

        assert!(matches!(
            events.recv().await.unwrap(),
            MembershipEvent::Joined(_)
        ));
        assert!(matches!(
            events.recv().await.unwrap(),
            MembershipEvent::Left(_)
        ));
    }

    #[tokio::test]
    async fn test_silent_silo_is_marked_dead() {
        let hub = InMemoryMembership::new(MembershipConfig {
            heartbeat_interval: std::time::Duration::from_millis(20),
            dead_after: std::time::Duration::from_millis(60),
        });

        hub.join(info("s1")).await.unwrap();
        hub.join(info("s2")).await.unwrap();

        // Only s1 keeps beating.
        for _ in 0..8 {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            hub.beat(&SiloId::new("s1")).await.unwrap();
        }

        let active = active_silos(hub.as_ref()).await;
        assert_eq!(active, vec![SiloId::new("s1")]);
    }

    #[tokio::test]
    async fn test_dead_silo_emits_status_event() {
        let hub = InMemoryMembership::new(MembershipConfig {
            heartbeat_interval: std::time::Duration::from_millis(10),
            dead_after: std::time::Duration::from_millis(30),
        });

        hub.join(info("s1")).await.unwrap();
        let mut events = hub.subscribe();

        tokio::time::sleep(std::time::Duration::from_millis(60)).await;
        let _ = hub.list().await;

        let event = events.recv().await.unwrap();
        match event {
            MembershipEvent::StatusChanged(changed) => {
                assert_eq!(changed.status, SiloStatus::Dead);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
