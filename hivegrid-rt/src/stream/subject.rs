// Layer 1: Standard library imports
use std::fmt::{self, Display};

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};

// Layer 3: Internal module imports
// (none)

/// A named fan-out channel: `(namespace, key)`.
///
/// The namespace groups related subjects (and is what implicit consumer
/// bindings match on); the key identifies one channel within it. For implicit
/// consumption the key doubles as the consumer's actor id, so those subjects
/// must carry a non-empty key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamSubject {
    namespace: String,
    key: String,
}

impl StreamSubject {
    /// Create a subject.
    pub fn new(namespace: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            key: key.into(),
        }
    }

    /// The namespace component.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The key component.
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Display for StreamSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.key)
    }
}
