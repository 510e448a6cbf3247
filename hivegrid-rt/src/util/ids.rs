// Layer 1: Standard library imports
use std::fmt::{self, Display};

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Layer 3: Internal module imports
// (none)

/// Cluster-wide logical address of an actor: `(type-name, id)`.
///
/// The key is immutable and identifies the actor independently of where (or
/// whether) it is currently activated. Placement hashes the canonical
/// `"{type}:{id}"` form produced by [`ActorKey::ring_key`].
///
/// # Example
/// ```rust
/// use hivegrid_rt::util::ActorKey;
///
/// let key = ActorKey::new("Counter", "k-1");
/// assert_eq!(key.ring_key(), "Counter:k-1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorKey {
    type_name: String,
    id: String,
}

impl ActorKey {
    /// Create a key from an actor type name and instance id.
    pub fn new(type_name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            id: id.into(),
        }
    }

    /// The registered actor type name.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// The instance id within the type.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Canonical string fed to the placement ring.
    pub fn ring_key(&self) -> String {
        format!("{}:{}", self.type_name, self.id)
    }
}

impl Display for ActorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.type_name, self.id)
    }
}

/// Identifier of one silo (one process hosting activations).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SiloId(String);

impl SiloId {
    /// Create a silo id from a stable name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Generate a random silo id.
    pub fn random() -> Self {
        Self(format!("silo-{}", Uuid::new_v4().simple()))
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for SiloId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for messages in the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Generate a new random MessageId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a MessageId from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 16-byte correlation id matching a response to its request across the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Generate a fresh correlation id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The raw 16-byte form used in wire headers.
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// Rebuild a correlation id from its 16-byte wire form.
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
