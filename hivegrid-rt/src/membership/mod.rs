//! Cluster membership seam and the in-memory reference provider.

pub mod in_memory;
pub mod traits;
pub mod types;

pub use in_memory::{InMemoryMembership, MembershipConfig};
pub use traits::{Membership, MembershipError};
pub use types::{MembershipEvent, SiloInfo, SiloStatus};
