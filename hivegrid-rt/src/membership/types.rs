// Layer 1: Standard library imports
use std::fmt::{self, Display};

// Layer 2: Third-party crate imports
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Layer 3: Internal module imports
use crate::util::SiloId;

/// Lifecycle status of one silo as seen by membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SiloStatus {
    /// Announced but not yet serving placements.
    Joining,
    /// Serving; participates in the placement snapshot.
    Active,
    /// Shutting down gracefully; new placements avoid it.
    Draining,
    /// Declared dead after missed heartbeats.
    Dead,
}

impl Display for SiloStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Joining => "joining",
            Self::Active => "active",
            Self::Draining => "draining",
            Self::Dead => "dead",
        };
        write!(f, "{name}")
    }
}

/// Descriptor of one silo in the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiloInfo {
    /// Stable silo identifier.
    pub id: SiloId,
    /// Transport endpoint (opaque to the core).
    pub endpoint: String,
    /// Current lifecycle status.
    pub status: SiloStatus,
    /// Join epoch; later joins of the same id supersede earlier ones.
    pub joined_at: DateTime<Utc>,
}

impl SiloInfo {
    /// Create an active silo descriptor joining now.
    pub fn active(id: SiloId, endpoint: impl Into<String>) -> Self {
        Self {
            id,
            endpoint: endpoint.into(),
            status: SiloStatus::Active,
            joined_at: Utc::now(),
        }
    }
}

/// Change notification delivered to membership subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipEvent {
    /// A silo joined (or re-joined with a newer epoch).
    Joined(SiloInfo),
    /// A silo left gracefully.
    Left(SiloId),
    /// A silo changed status (draining, or declared dead by the sweeper).
    StatusChanged(SiloInfo),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display() {
        assert_eq!(SiloStatus::Active.to_string(), "active");
        assert_eq!(SiloStatus::Dead.to_string(), "dead");
    }

    #[test]
    fn test_active_constructor() {
        let info = SiloInfo::active(SiloId::new("s1"), "local:s1");
        assert_eq!(info.status, SiloStatus::Active);
        assert_eq!(info.endpoint, "local:s1");
    }
}
