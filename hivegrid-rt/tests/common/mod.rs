//! In-process cluster harness shared by the integration suites.

#![allow(dead_code)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use hivegrid_rt::{
    ActorTypeRegistry, InMemoryMembership, Membership, MembershipConfig, MemoryReminderStore,
    MemoryStateStore, ReminderStore, Silo, SiloConfig, SiloId, StateStore, Telemetry,
};
use hivegrid_rt::{LoopbackNetwork, LoopbackTransport};

/// Heartbeat interval the test clusters run at.
pub const HEARTBEAT: Duration = Duration::from_millis(50);
/// Grace before a silent test silo is declared dead.
pub const DEAD_AFTER: Duration = Duration::from_millis(250);

/// Fast-paced silo configuration for tests.
pub fn test_config() -> SiloConfig {
    SiloConfig::builder()
        .with_heartbeat_interval(HEARTBEAT)
        .with_collection_interval(Duration::from_millis(100))
        .with_reminder_interval(Duration::from_millis(50))
        .with_call_timeout(Duration::from_secs(5))
        .build()
        .expect("test config is valid")
}

/// A cluster of silos over one loopback hub and shared stores.
pub struct TestCluster {
    pub membership: Arc<InMemoryMembership>,
    pub network: Arc<LoopbackNetwork>,
    pub state_store: Arc<MemoryStateStore>,
    pub reminder_store: Arc<MemoryReminderStore>,
    pub silos: Vec<Silo>,
}

impl TestCluster {
    /// Start one silo per name, all sharing membership, transport and stores.
    pub async fn start(names: &[&str], registry: Arc<ActorTypeRegistry>, config: SiloConfig) -> Self {
        Self::start_with_telemetry(names, registry, config, None).await
    }

    /// Same as [`TestCluster::start`] with a telemetry sink on every silo.
    pub async fn start_with_telemetry(
        names: &[&str],
        registry: Arc<ActorTypeRegistry>,
        config: SiloConfig,
        telemetry: Option<Arc<dyn Telemetry>>,
    ) -> Self {
        let membership = InMemoryMembership::new(MembershipConfig {
            heartbeat_interval: HEARTBEAT,
            dead_after: DEAD_AFTER,
        });
        let network = LoopbackNetwork::new();
        let state_store = Arc::new(MemoryStateStore::new());
        let reminder_store = Arc::new(MemoryReminderStore::new());

        let mut silos = Vec::new();
        for name in names {
            let id = SiloId::new(*name);
            let mut builder = Silo::builder()
                .with_id(id.clone())
                .with_config(config.clone())
                .with_registry(Arc::clone(&registry))
                .with_membership(Arc::clone(&membership) as Arc<dyn Membership>)
                .with_transport(Arc::new(LoopbackTransport::new(Arc::clone(&network), id)))
                .with_state_store(Arc::clone(&state_store) as Arc<dyn StateStore>)
                .with_reminder_store(Arc::clone(&reminder_store) as Arc<dyn ReminderStore>);
            if let Some(telemetry) = &telemetry {
                builder = builder.with_telemetry(Arc::clone(telemetry));
            }
            let silo = builder.build().expect("silo builds");
            silo.start().await.expect("silo starts");
            silos.push(silo);
        }

        // Let the membership events propagate so every ring sees every silo.
        tokio::time::sleep(Duration::from_millis(150)).await;

        Self {
            membership,
            network,
            state_store,
            reminder_store,
            silos,
        }
    }

    /// Client bound to the first silo's placement view.
    pub fn client(&self) -> hivegrid_rt::ClusterClient {
        self.silos[0].client()
    }

    /// The silo with the given name.
    pub fn silo(&self, name: &str) -> &Silo {
        let id = SiloId::new(name);
        self.silos
            .iter()
            .find(|silo| silo.id() == &id)
            .expect("silo exists")
    }

    /// Stop every silo gracefully.
    pub async fn stop(&self) {
        for silo in &self.silos {
            let _ = silo.stop(true).await;
        }
    }
}
