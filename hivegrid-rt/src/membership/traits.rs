// Layer 1: Standard library imports
use std::fmt::Debug;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

// Layer 3: Internal module imports
use super::types::{MembershipEvent, SiloInfo};
use crate::util::SiloId;

/// Membership provider errors.
#[derive(Debug, Error)]
pub enum MembershipError {
    /// Operation referenced a silo the provider does not know.
    #[error("Unknown silo: {0}")]
    UnknownSilo(SiloId),

    /// The provider is shut down.
    #[error("Membership provider is closed")]
    Closed,
}

/// Cluster-membership seam.
///
/// The runtime consumes an eventually-consistent view: two silos may briefly
/// disagree about the active set, and the activation manager tolerates the
/// resulting short windows of duplicate ownership (resolved by the next
/// versioned state write).
#[async_trait]
pub trait Membership: Send + Sync + Debug {
    /// Announce a silo (idempotent; a re-join supersedes the old epoch).
    async fn join(&self, info: SiloInfo) -> Result<(), MembershipError>;

    /// Remove a silo gracefully.
    async fn leave(&self, id: &SiloId) -> Result<(), MembershipError>;

    /// Record a heartbeat for a silo.
    async fn beat(&self, id: &SiloId) -> Result<(), MembershipError>;

    /// Snapshot of all known silos, any status.
    async fn list(&self) -> Vec<SiloInfo>;

    /// Subscribe to change events.
    fn subscribe(&self) -> broadcast::Receiver<MembershipEvent>;
}

/// The ids of all silos currently safe to place on.
pub async fn active_silos(membership: &dyn Membership) -> Vec<SiloId> {
    membership
        .list()
        .await
        .into_iter()
        .filter(|info| info.status == super::types::SiloStatus::Active)
        .map(|info| info.id)
        .collect()
}
