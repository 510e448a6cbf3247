// Layer 1: Standard library imports
use std::fmt::{self, Display};

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};

// Layer 3: Internal module imports
use crate::util::ActorKey;

/// The set of actor keys already on the logical call stack of one invocation.
///
/// Every outgoing call from inside a handler carries the incoming chain plus
/// the calling actor's own key. Enqueueing to a non-re-entrant actor whose
/// key is already in the chain fails with a reentrancy error instead of
/// deadlocking the single-writer dispatcher.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallChain(Vec<ActorKey>);

impl CallChain {
    /// An empty chain (external caller).
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Rebuild a chain from its serialized keys.
    pub fn from_keys(keys: Vec<ActorKey>) -> Self {
        Self(keys)
    }

    /// Whether `key` is already on the stack.
    pub fn contains(&self, key: &ActorKey) -> bool {
        self.0.iter().any(|k| k == key)
    }

    /// A new chain with `key` appended (the chain itself is immutable).
    pub fn extended(&self, key: ActorKey) -> Self {
        let mut keys = self.0.clone();
        keys.push(key);
        Self(keys)
    }

    /// Number of frames on the stack.
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// The keys in call order, oldest first.
    pub fn keys(&self) -> &[ActorKey] {
        &self.0
    }

    /// Render the cycle produced by re-entering `offender`, for error text.
    pub fn describe_cycle(&self, offender: &ActorKey) -> String {
        let mut out = String::new();
        for key in &self.0 {
            out.push_str(&key.to_string());
            out.push_str(" -> ");
        }
        out.push_str(&offender.to_string());
        out
    }
}

impl Display for CallChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for key in &self.0 {
            if !first {
                write!(f, " -> ")?;
            }
            write!(f, "{key}")?;
            first = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_chain() {
        let chain = CallChain::new();
        assert_eq!(chain.depth(), 0);
        assert!(!chain.contains(&ActorKey::new("A", "1")));
    }

    #[test]
    fn test_extended_is_immutable() {
        let a = ActorKey::new("A", "1");
        let b = ActorKey::new("B", "1");

        let base = CallChain::new().extended(a.clone());
        let deeper = base.extended(b.clone());

        assert_eq!(base.depth(), 1);
        assert_eq!(deeper.depth(), 2);
        assert!(deeper.contains(&a));
        assert!(deeper.contains(&b));
        assert!(!base.contains(&b));
    }

    #[test]
    fn test_describe_cycle() {
        let a = ActorKey::new("A", "1");
        let b = ActorKey::new("B", "1");
        let chain = CallChain::new().extended(a.clone()).extended(b);

        let text = chain.describe_cycle(&a);
        assert_eq!(text, "A:1 -> B:1 -> A:1");
    }
}
